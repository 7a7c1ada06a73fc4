//! Directory layout of a processed folder.
//!
//! The three stages only talk to each other through this
//! layout, so each stage validates the part it consumes
//! before touching anything:
//!
//! - `input_dir/`: thermal sources (written by extraction)
//! - `other/`: non-thermal sources, never processed
//! - `out_dir/`: derived rasters, recreated by decoding
//! - `temp_dir/`: scratch, removed after decoding
//! - `metadata.txt`: written by extraction, read by
//!   reattachment
use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use log::warn;

use crate::Error;

pub const INPUT_DIR: &str = "input_dir";
pub const OTHER_DIR: &str = "other";
pub const OUTPUT_DIR: &str = "out_dir";
pub const TEMP_DIR: &str = "temp_dir";
pub const METADATA_FILE: &str = "metadata.txt";

pub const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
pub const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub other_dir: PathBuf,
    pub out_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub metadata_file: PathBuf,
}

impl FolderLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        FolderLayout {
            input_dir: root.join(INPUT_DIR),
            other_dir: root.join(OTHER_DIR),
            out_dir: root.join(OUTPUT_DIR),
            temp_dir: root.join(TEMP_DIR),
            metadata_file: root.join(METADATA_FILE),
            root,
        }
    }

    /// Folder name for reports.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// Inputs of the decode stage.
    pub fn require_sources(&self) -> Result<()> {
        require_dir(&self.input_dir, "input directory")
    }

    /// Inputs of the reattach stage.
    pub fn require_reattach_inputs(&self) -> Result<()> {
        if !self.metadata_file.is_file() {
            return Err(Error::MissingInput {
                what: "metadata file",
                path: self.metadata_file.clone(),
            }
            .into());
        }
        require_dir(&self.input_dir, "input directory")?;
        require_dir(&self.out_dir, "output directory")
    }

    pub fn sources(&self) -> Result<Vec<PathBuf>> {
        files_with_extensions(&self.input_dir, SOURCE_EXTENSIONS)
    }

    pub fn rasters(&self) -> Result<Vec<PathBuf>> {
        files_with_extensions(&self.out_dir, RASTER_EXTENSIONS)
    }

    pub fn raster_path_for(&self, source: &Path) -> Result<PathBuf> {
        Ok(self.out_dir.join(format!("{}.tiff", file_stem(source)?)))
    }

    pub fn raw_path_for(&self, source: &Path) -> Result<PathBuf> {
        Ok(self.temp_dir.join(format!("{}.raw", file_stem(source)?)))
    }
}

fn require_dir(path: &Path, what: &'static str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::MissingInput {
            what,
            path: path.to_path_buf(),
        }
        .into())
    }
}

/// Regular files directly inside `dir` whose extension is
/// one of `extensions` (case-insensitive), sorted by path.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut opts = MatchOptions::new();
    opts.case_sensitive = false;

    let base = Pattern::escape(&dir.to_string_lossy());
    let mut files = vec![];
    for ext in extensions {
        let pattern = format!("{base}/*.{ext}");
        for entry in glob_with(&pattern, opts)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable entry: {e}"),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Immediate subdirectories of `dir`, sorted by path.
pub fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = vec![];
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("no file name in {}", path.display()))
}

pub fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("no file stem in {}", path.display()))
}
