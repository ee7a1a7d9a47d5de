use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};

/// Pixel window `x:y:width:height`, in pixels from the upper left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            bail!("region must look like x:y:width:height, got '{s}'");
        }
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|e| anyhow!("invalid region component '{v}': {e}"))
        };
        Ok(Self {
            x: parse(parts[0])?,
            y: parse(parts[1])?,
            width: parse(parts[2])?,
            height: parse(parts[3])?,
        })
    }
}

/// Multi-band image held in memory as pixel-interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(width: usize, height: usize, bands: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height * bands {
            bail!(
                "{} samples do not fill a {}x{}x{} raster",
                data.len(),
                width,
                height,
                bands
            );
        }
        Ok(Self {
            width,
            height,
            bands,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, bands: usize, value: f32) -> Self {
        Self {
            width,
            height,
            bands,
            data: vec![value; width * height * bands],
        }
    }

    /// Read a TIFF with any integer or float sample type, chunky layout.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("cannot open raster {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("{} is not a readable TIFF", path.display()))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        #[allow(unreachable_patterns)]
        let data: Vec<f32> = match decoder.read_image()? {
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            _ => bail!("unsupported sample format in {}", path.display()),
        };

        let pixels = width * height;
        if pixels == 0 || data.len() % pixels != 0 {
            bail!(
                "{}: {} samples for {}x{} pixels",
                path.display(),
                data.len(),
                width,
                height
            );
        }
        let bands = data.len() / pixels;

        log::debug!("Read {} ({}x{}x{})", path.display(), width, height, bands);
        Self::new(width, height, bands, data)
    }

    /// Write as 8-bit unsigned samples, rounding and saturating. 1, 3 or 4 bands.
    pub fn write_u8(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes: Vec<u8> = self
            .data
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        let mut encoder = self.encoder(path.as_ref())?;
        let (w, h) = (self.width as u32, self.height as u32);
        match self.bands {
            1 => encoder.write_image::<colortype::Gray8>(w, h, &bytes)?,
            3 => encoder.write_image::<colortype::RGB8>(w, h, &bytes)?,
            4 => encoder.write_image::<colortype::RGBA8>(w, h, &bytes)?,
            n => bail!("cannot write a {n}-band raster as TIFF"),
        }
        Ok(())
    }

    /// Write as 32-bit float samples. 1, 3 or 4 bands.
    pub fn write_f32(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut encoder = self.encoder(path.as_ref())?;
        let (w, h) = (self.width as u32, self.height as u32);
        match self.bands {
            1 => encoder.write_image::<colortype::Gray32Float>(w, h, &self.data)?,
            3 => encoder.write_image::<colortype::RGB32Float>(w, h, &self.data)?,
            4 => encoder.write_image::<colortype::RGBA32Float>(w, h, &self.data)?,
            n => bail!("cannot write a {n}-band raster as TIFF"),
        }
        Ok(())
    }

    fn encoder(&self, path: &Path) -> Result<TiffEncoder<BufWriter<File>>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        Ok(TiffEncoder::new(BufWriter::new(file))?)
    }

    pub fn get(&self, x: usize, y: usize, band: usize) -> f32 {
        self.data[(y * self.width + x) * self.bands + band]
    }

    pub fn crop(&self, region: Region) -> Result<Raster> {
        if region.width == 0
            || region.height == 0
            || region.x + region.width > self.width
            || region.y + region.height > self.height
        {
            bail!(
                "region {:?} is outside the {}x{} raster",
                region,
                self.width,
                self.height
            );
        }
        let row_len = region.width * self.bands;
        let mut data = Vec::with_capacity(row_len * region.height);
        for y in region.y..region.y + region.height {
            let start = (y * self.width + region.x) * self.bands;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Raster::new(region.width, region.height, self.bands, data)
    }

    /// Mean absolute difference over every sample, `None` when the shapes differ.
    pub fn mean_absolute_error(&self, other: &Raster) -> Option<f64> {
        if self.width != other.width || self.height != other.height || self.bands != other.bands {
            return None;
        }
        if self.data.is_empty() {
            return Some(0.0);
        }
        let sum: f64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (f64::from(*a) - f64::from(*b)).abs())
            .sum();
        Some(sum / self.data.len() as f64)
    }
}
