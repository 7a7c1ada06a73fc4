//! Sorting a folder's photos into `input_dir/` (thermal)
//! and `other/` (everything else).
use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::layout::{file_name, files_with_extensions, FolderLayout, SOURCE_EXTENSIONS};

lazy_static! {
    static ref THERMAL_SUFFIX: Regex = Regex::new(r"(?i)(T|INFRA)\.JPG$").expect("suffix regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Thermal,
    NonThermal,
}

/// Classify by file name alone: names ending in `T.JPG` or
/// `INFRA.JPG` (any case) are thermal.
pub fn classify(file_name: &str) -> Classification {
    if THERMAL_SUFFIX.is_match(file_name) {
        Classification::Thermal
    } else {
        Classification::NonThermal
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// `input_dir` was already populated; nothing was
    /// classified.
    pub resumed: bool,
    pub moved_thermal: usize,
    pub moved_other: usize,
    /// Files left in place because the destination exists.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl RouteReport {
    pub fn moved(&self) -> usize {
        self.moved_thermal + self.moved_other
    }
}

/// Move the top-level photos of a folder into their
/// classification directories.
///
/// Files are never overwritten: a file whose destination
/// already exists is left in place and reported. When
/// `input_dir` already holds photos the folder is taken as
/// sorted and nothing is moved.
pub fn route_folder(layout: &FolderLayout) -> Result<RouteReport> {
    let mut report = RouteReport::default();

    if layout.input_dir.is_dir() && !layout.sources()?.is_empty() {
        report.resumed = true;
        return Ok(report);
    }

    for dir in [&layout.input_dir, &layout.other_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let photos = files_with_extensions(&layout.root, SOURCE_EXTENSIONS)?;
    if photos.is_empty() {
        warn!("{}: no JPG files found", layout.name());
        return Ok(report);
    }

    for photo in photos {
        let name = file_name(&photo)?;
        let (target_dir, counter) = match classify(&name) {
            Classification::Thermal => (&layout.input_dir, &mut report.moved_thermal),
            Classification::NonThermal => (&layout.other_dir, &mut report.moved_other),
        };
        match move_if_absent(&photo, &target_dir.join(&name)) {
            Ok(true) => *counter += 1,
            Ok(false) => {
                info!("skipping existing file: {name}");
                report.skipped.push(photo);
            }
            Err(e) => {
                warn!("failed to move {name}: {e:#}");
                report.failed.push(photo);
            }
        }
    }

    info!(
        "{}: moved {} thermal and {} other photos",
        layout.name(),
        report.moved_thermal,
        report.moved_other
    );
    Ok(report)
}

/// Returns `false` without touching anything when `target`
/// exists.
fn move_if_absent(source: &Path, target: &Path) -> Result<bool> {
    if target.exists() {
        return Ok(false);
    }
    if fs::rename(source, target).is_err() {
        fs::copy(source, target)
            .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;
        fs::remove_file(source)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, read, write};

    #[test]
    fn classification_by_suffix() {
        assert_eq!(classify("DJI_0001_T.JPG"), Classification::Thermal);
        assert_eq!(classify("dji_0001_t.jpg"), Classification::Thermal);
        assert_eq!(classify("IMG_0002_INFRA.JPG"), Classification::Thermal);
        assert_eq!(classify("DJI_0003_W.JPG"), Classification::NonThermal);
        assert_eq!(classify("DJI_0004_T.JPEG"), Classification::NonThermal);
        assert_eq!(classify("DJI_0005_Z.JPG"), Classification::NonThermal);
    }

    #[test]
    fn routes_then_resumes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = FolderLayout::new(dir.path());
        for name in ["X_T.JPG", "Y_T.JPG", "Z.JPG", "notes.txt"] {
            write(dir.path().join(name), name)?;
        }

        let first = route_folder(&layout)?;
        assert!(!first.resumed);
        assert_eq!((first.moved_thermal, first.moved_other), (2, 1));
        assert!(layout.input_dir.join("X_T.JPG").is_file());
        assert!(layout.other_dir.join("Z.JPG").is_file());
        assert!(dir.path().join("notes.txt").is_file());

        let second = route_folder(&layout)?;
        assert!(second.resumed);
        assert_eq!(second.moved(), 0);
        assert_eq!(layout.sources()?.len(), 2);
        Ok(())
    }

    #[test]
    fn never_overwrites_existing_destination() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = FolderLayout::new(dir.path());
        create_dir_all(&layout.other_dir)?;
        write(layout.other_dir.join("Z.JPG"), "already sorted")?;
        write(dir.path().join("Z.JPG"), "new copy")?;

        let report = route_folder(&layout)?;
        assert_eq!(report.moved(), 0);
        assert_eq!(report.skipped, vec![dir.path().join("Z.JPG")]);
        assert_eq!(read(layout.other_dir.join("Z.JPG"))?, b"already sorted");
        assert!(dir.path().join("Z.JPG").is_file());

        let again = route_folder(&layout)?;
        assert_eq!(again.moved(), 0);
        Ok(())
    }
}
