//! Raw radiometric buffers and the calibrated rasters built
//! from them.
//!
//! The decoder writes a flat file of native-endian `i16`
//! samples (tenths of a degree) without any shape
//! information. The shape is recovered from the sample
//! count and the visible image's declared size with
//! [`recover_dimensions`].
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use byteordered::ByteOrdered;
use image::{codecs::jpeg::JpegDecoder, ImageDecoder};
use ndarray::Array2;
use tiff::encoder::{colortype, TiffEncoder};

use crate::Error;

/// Raw samples are fixed point with this many steps per
/// unit.
pub const SAMPLE_SCALE: f32 = 10.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

impl Dimensions {
    pub fn new(width: usize, height: usize) -> Self {
        Dimensions { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where recovered dimensions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// The declared size matches the sample count.
    Declared(Dimensions),
    /// Nothing was found and the folder's previous recovery
    /// matches the sample count.
    Hint(Dimensions),
    /// Found by the divisor search.
    Searched(Dimensions),
}

impl Recovered {
    pub fn dimensions(&self) -> Dimensions {
        match *self {
            Recovered::Declared(d) | Recovered::Hint(d) | Recovered::Searched(d) => d,
        }
    }

    /// Dimensions worth remembering for the next image.
    pub fn as_hint(&self) -> Option<Dimensions> {
        match *self {
            Recovered::Declared(_) => None,
            Recovered::Hint(d) | Recovered::Searched(d) => Some(d),
        }
    }
}

/// Recover `(width, height)` of a buffer of `len` samples.
///
/// 1. `declared` is used when its area is `len`.
/// 2. Otherwise the height starts at
///    `floor(sqrt(len / ratio))` (`ratio` is the declared
///    width over height) and shrinks until
///    `floor(len / height) * height == len`, so the result
///    is the exact factorization closest to the declared
///    aspect ratio from below.
/// 3. `hint` is only a fallback for when the search finds
///    nothing, and only when its area is `len`. It never
///    replaces a factorization the search found.
///
/// Errors on an empty buffer or a zero declared side.
pub fn recover_dimensions(
    len: usize,
    declared: Dimensions,
    hint: Option<Dimensions>,
) -> Result<Recovered, Error> {
    if len == 0 {
        return Err(Error::EmptyBuffer);
    }
    if declared.width == 0 || declared.height == 0 {
        return Err(Error::InvalidDimensions {
            width: declared.width,
            height: declared.height,
        });
    }

    if declared.area() == len {
        return Ok(Recovered::Declared(declared));
    }
    if let Some(dims) = search_factorization(len, declared) {
        return Ok(Recovered::Searched(dims));
    }
    match hint.filter(|h| h.area() == len) {
        Some(hint) => Ok(Recovered::Hint(hint)),
        None => Err(Error::Unfactorable(len)),
    }
}

fn search_factorization(len: usize, declared: Dimensions) -> Option<Dimensions> {
    let ratio = declared.width as f64 / declared.height as f64;
    let seed = (len as f64 / ratio).sqrt().floor() as usize;
    (1..=seed.clamp(1, len))
        .rev()
        .find(|&height| (len / height) * height == len)
        .map(|height| Dimensions::new(len / height, height))
}

/// Read a raw sample file.
pub fn read_raw_samples(path: &Path) -> Result<Vec<i16>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let len = file.metadata()?.len();
    if len % 2 != 0 {
        return Err(Error::OddBufferLength(len).into());
    }

    let count = (len / 2) as usize;
    let mut rdr = ByteOrdered::native(BufReader::new(file));
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        samples.push(rdr.read_i16()?);
    }
    Ok(samples)
}

/// Pixel size declared by a JPEG.
pub fn jpeg_dimensions(path: &Path) -> Result<Dimensions> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let decoder = JpegDecoder::new(BufReader::new(file))
        .with_context(|| format!("decoding {}", path.display()))?;
    let (width, height) = decoder.dimensions();
    Ok(Dimensions::new(width as usize, height as usize))
}

/// A calibrated temperature raster.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalRaster {
    pub values: Array2<f32>,
}

impl ThermalRaster {
    /// Reshape samples row-major into `dims` and scale them
    /// by [`SAMPLE_SCALE`].
    pub fn from_samples(samples: &[i16], dims: Dimensions) -> Result<Self> {
        let values = samples.iter().map(|&s| s as f32 / SAMPLE_SCALE).collect();
        let values = Array2::from_shape_vec((dims.height, dims.width), values)?;
        Ok(ThermalRaster { values })
    }

    pub fn dimensions(&self) -> Dimensions {
        let (height, width) = self.values.dim();
        Dimensions::new(width, height)
    }

    /// Write as a single-channel 32-bit float TIFF.
    pub fn save_tiff(&self, path: &Path) -> Result<()> {
        let Dimensions { width, height } = self.dimensions();
        let data = self
            .values
            .as_slice()
            .ok_or_else(|| anyhow!("raster is not in standard layout"))?;

        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        TiffEncoder::new(writer)?.write_image::<colortype::Gray32Float>(
            width as u32,
            height as u32,
            data,
        )?;
        Ok(())
    }
}
