use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use clap::Parser;
use std::path::PathBuf;

use patchnet::bundle;
use patchnet::data::{Raster, Region};
use patchnet::inference::predict;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fully convolutional inference over a raster")]
struct Args {
    /// Model bundle directory
    #[arg(short, long)]
    model_dir: PathBuf,

    /// Input raster (TIFF)
    #[arg(short, long)]
    input: PathBuf,

    /// Region of interest x:y:width:height
    #[arg(long)]
    roi: Option<Region>,

    /// Output raster (TIFF)
    #[arg(short, long)]
    output: PathBuf,

    /// Write class probabilities as float bands instead of the class map
    #[arg(long)]
    probabilities: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    println!("Patch model inference (CPU)");
    println!("Model: {}", args.model_dir.display());
    println!("Input: {}", args.input.display());
    if let Some(roi) = &args.roi {
        println!("ROI: {}:{}:{}:{}", roi.x, roi.y, roi.width, roi.height);
    }
    println!();

    type MyBackend = NdArray;
    let device = NdArrayDevice::default();

    let (model, config) = bundle::load::<MyBackend>(&args.model_dir, &device)?;

    let mut raster = Raster::read(&args.input)?;
    if let Some(roi) = args.roi {
        raster = raster.crop(roi)?;
    }
    if raster.bands != config.input_channels {
        return Err(format!(
            "{} has {} bands, the model expects {}",
            args.input.display(),
            raster.bands,
            config.input_channels
        )
        .into());
    }

    println!("Running inference on {}x{}x{}...", raster.width, raster.height, raster.bands);
    let prediction = predict(&model, &raster, &device)?;

    if args.probabilities {
        prediction.probabilities.write_f32(&args.output)?;
    } else {
        prediction.classes.write_u8(&args.output)?;
    }

    println!("Inference completed");
    println!(
        "Output: {} ({}x{}, {} px margin)",
        args.output.display(),
        prediction.classes.width,
        prediction.classes.height,
        prediction.offset
    );
    Ok(())
}
