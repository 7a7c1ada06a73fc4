//! Batch conversion of DJI radiometric JPEGs into
//! calibrated temperature rasters.
//!
//! A drone flight is a folder of photos. Processing runs in
//! three stages that only communicate through the folder
//! (see [`layout`]):
//!
//! 1. **Extract** ([`extract`]): thermal photos (names
//!    ending in `T.JPG` or `INFRA.JPG`) are moved to
//!    `input_dir/`, everything else to `other/`, and the
//!    camera, GPS and thermal tags of each thermal photo are
//!    written to `metadata.txt` (see [`metadata`]).
//!
//! 2. **Decode** ([`decoder`]): each thermal photo is run
//!    through the DJI Thermal SDK's `dji_irp` utility. Its
//!    raw output carries no shape, which is recovered from
//!    the sample count and the photo's pixel size (see
//!    [`recover_dimensions`][raster::recover_dimensions]).
//!    The result is written to `out_dir/<stem>.tiff` as a
//!    32-bit float raster in degrees.
//!
//! 3. **Reattach** ([`reattach`]): the metadata of each
//!    photo is copied onto its raster with [ExifTool].
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn test_compile() -> anyhow::Result<()> {
//! use dji_thermal::{config::Config, Pipeline};
//!
//! let config = Config::default();
//! let summary = Pipeline::from_config(&config).run(&config.root, &config.stages)?;
//! for outcome in summary.failed() {
//!     eprintln!("{}: {:?}", outcome.folder.display(), outcome.result);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The external tools are reached through the
//! [`MetadataTool`] and [`RadiometricDecoder`] traits, so
//! stages can also be driven directly, one folder at a
//! time.
//!
//! [ExifTool]: //exiftool.org

mod error;

pub mod cli;
pub mod config;
pub mod decoder;
pub mod exiftool;
pub mod extract;
pub mod layout;
pub mod metadata;
pub mod pipeline;
pub mod raster;
pub mod reattach;
pub mod router;

pub use crate::decoder::{DjiIrp, RadiometricDecoder};
pub use crate::error::Error;
pub use crate::exiftool::{ExifTool, MetadataTool};
pub use crate::metadata::{MetadataRecord, MetadataStore};
pub use crate::pipeline::{Pipeline, Stage, StageReport};
pub use crate::raster::{Dimensions, ThermalRaster};
