use burn::backend::{Autodiff, NdArray};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use patchnet::data::PatchesImagesDataset;
use patchnet::model::{format_summary, Architecture, ClassifierConfig, FcnnConfig};
use patchnet::training::{Trainer, TrainingConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ArchitectureKind {
    Fcnn,
    Classifier,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a patch model from patches-images")]
struct Args {
    /// Input patches-images for training
    #[arg(long, required = true, num_args = 1..)]
    train_xs: Vec<PathBuf>,

    /// Label patches-images for training
    #[arg(long, required = true, num_args = 1..)]
    train_labels: Vec<PathBuf>,

    /// Input patches-images for validation
    #[arg(long, required = true, num_args = 1..)]
    valid_xs: Vec<PathBuf>,

    /// Label patches-images for validation
    #[arg(long, required = true, num_args = 1..)]
    valid_labels: Vec<PathBuf>,

    /// Input patches-images for the final evaluation
    #[arg(long, num_args = 1..)]
    test_xs: Vec<PathBuf>,

    /// Label patches-images for the final evaluation
    #[arg(long, num_args = 1..)]
    test_labels: Vec<PathBuf>,

    /// Output model bundle directory
    #[arg(long)]
    model_dir: String,

    /// YAML training config; flags below override it
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    nb_epochs: Option<usize>,

    /// Validate every N epochs
    #[arg(long)]
    validation_step: Option<usize>,

    #[arg(long, value_enum)]
    architecture: Option<ArchitectureKind>,

    #[arg(long)]
    n_classes: Option<usize>,

    /// Start from the weights of an existing bundle
    #[arg(long)]
    restore_from: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<TrainingConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading config from {}", path);
            TrainingConfig::from_yaml(path)?
        }
        None => TrainingConfig::default(),
    };

    if let Some(kind) = args.architecture {
        config.model = match kind {
            ArchitectureKind::Fcnn => Architecture::Fcnn(FcnnConfig::default()),
            ArchitectureKind::Classifier => Architecture::Classifier(ClassifierConfig::default()),
        };
    }
    if let Some(n) = args.n_classes {
        match &mut config.model {
            Architecture::Fcnn(c) => c.n_classes = n,
            Architecture::Classifier(c) => c.n_classes = n,
        }
    }
    if let Some(v) = args.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = args.learning_rate {
        config.learning_rate = v;
    }
    if let Some(v) = args.nb_epochs {
        config.nb_epochs = v;
    }
    if let Some(v) = args.validation_step {
        config.validation_step = v;
    }
    config.model_dir = args.model_dir.clone();
    config.model.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    println!("Patch model training (CPU)");
    println!("==========================\n");

    type MyBackend = NdArray;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let device = Default::default();
    let config = build_config(&args)?;

    let train = PatchesImagesDataset::from_files(args.train_xs.clone(), args.train_labels.clone())?;
    let valid = PatchesImagesDataset::from_files(args.valid_xs.clone(), args.valid_labels.clone())?;
    let test = if args.test_xs.is_empty() && args.test_labels.is_empty() {
        None
    } else {
        Some(PatchesImagesDataset::from_files(args.test_xs.clone(), args.test_labels.clone())?)
    };

    let mut trainer = match &args.restore_from {
        Some(dir) => {
            println!("Restoring model from {}", dir.display());
            Trainer::<MyAutodiffBackend>::restore_from(config, dir, device)?
        }
        None => Trainer::<MyAutodiffBackend>::new(config, device)?,
    };
    let config = trainer.config().clone();

    println!("Training Configuration:");
    println!("  Architecture: {}", config.model.name());
    println!("  Classes: {}", config.model.n_classes());
    println!("  Epochs: {}", config.nb_epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Validation step: {}", config.validation_step);
    println!("  Model dir: {}", config.model_dir);
    println!();
    println!("{}", format_summary(&config.model.summary(train.input_patch_size())));
    println!();

    println!("Starting training...\n");
    if let Err(e) = trainer.fit(&train, &valid) {
        eprintln!("\nTraining failed: {}", e);
        return Err(e.into());
    }

    if let Some(test) = &test {
        let metrics = trainer.test(test)?;
        println!(
            "\nTest: loss={:.4} precision={:.4} recall={:.4} kappa={:.4} OA={:.4}",
            metrics.loss,
            metrics.precision,
            metrics.recall,
            metrics.report.kappa,
            metrics.report.overall_accuracy
        );
    }

    trainer.save()?;
    println!("\nTraining completed!");
    println!("Model saved in: {}", config.model_dir);
    Ok(())
}
