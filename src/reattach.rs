//! Metadata reattachment: the third stage.
//!
//! Every source in `input_dir/` with a raster of the same
//! stem in `out_dir/` gets its metadata back in two passes:
//! a bulk copy of all tags from the source file, then the
//! XMP tags recorded in `metadata.txt` written one by one,
//! since the bulk copy drops custom XMP tags when going
//! from JPEG to TIFF.
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{info, warn};
use tempfile::NamedTempFile;

use crate::{
    cli::progress_bar,
    exiftool::MetadataTool,
    layout::{file_name, file_stem, FolderLayout},
    metadata::{MetadataRecord, MetadataStore},
    pipeline::StageReport,
};

/// Tag group written in the second pass.
pub const XMP_GROUP: &str = "XMP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub source: PathBuf,
    pub raster: PathBuf,
}

/// Join sources and rasters on their file stem. Files
/// without a counterpart are left out. Sorted by stem.
pub fn pair_by_stem(sources: &[PathBuf], rasters: &[PathBuf]) -> Result<Vec<Pair>> {
    let mut by_stem = BTreeMap::new();
    for raster in rasters {
        by_stem.insert(file_stem(raster)?, raster);
    }

    let mut pairs = BTreeMap::new();
    for source in sources {
        let stem = file_stem(source)?;
        if let Some(raster) = by_stem.get(&stem) {
            pairs.insert(
                stem,
                Pair {
                    source: source.clone(),
                    raster: (*raster).clone(),
                },
            );
        }
    }
    Ok(pairs.into_values().collect())
}

/// Argument file lines for the XMP pass.
///
/// Each line of the argument file is one tool argument, so
/// values spanning several lines are left out.
pub fn xmp_assignments(record: &MetadataRecord) -> Vec<String> {
    record
        .group_tags(XMP_GROUP)
        .filter_map(|(name, value)| {
            if value.contains(|c: char| c == '\n' || c == '\r') {
                warn!(
                    "{}: not writing {XMP_GROUP}:{name}, value spans several lines",
                    record.image_name
                );
                return None;
            }
            Some(format!("-{XMP_GROUP}:{name}={value}"))
        })
        .collect()
}

/// Run both passes for one pair.
///
/// A failing bulk copy fails the pair; a failing XMP pass is
/// only reported. The argument file is removed either way.
pub fn reattach_pair<M: MetadataTool + ?Sized>(
    tool: &M,
    pair: &Pair,
    record: &MetadataRecord,
) -> Result<()> {
    tool.copy_all_tags(&pair.source, &pair.raster)?;

    let assignments = xmp_assignments(record);
    if assignments.is_empty() {
        return Ok(());
    }

    let mut args_file = NamedTempFile::new().context("creating argument file")?;
    for line in &assignments {
        writeln!(args_file, "{line}")?;
    }
    args_file.flush()?;

    if let Err(e) = tool.apply_args_file(args_file.path(), &pair.raster) {
        warn!("failed to add XMP tags to {}: {e:#}", pair.raster.display());
    }
    Ok(())
}

/// Reattach the metadata of every pair of a folder.
///
/// With `tool` set to `None` (no metadata tool available)
/// pairs are reported but nothing is copied.
pub fn reattach_folder<M: MetadataTool + ?Sized>(
    tool: Option<&M>,
    layout: &FolderLayout,
    show_progress: bool,
) -> Result<StageReport> {
    layout.require_reattach_inputs()?;
    let store = MetadataStore::load(&layout.metadata_file)?;

    let pairs = pair_by_stem(&layout.sources()?, &layout.rasters()?)?;
    if pairs.is_empty() {
        warn!("{}: no matching images found", layout.name());
        return Ok(StageReport::default());
    }
    info!("{}: found {} matching pairs", layout.name(), pairs.len());

    let bar = progress_bar(pairs.len(), "copying metadata", show_progress);
    let mut report = StageReport {
        succeeded: 0,
        total: pairs.len(),
    };
    for pair in &pairs {
        bar.inc(1);
        let name = file_name(&pair.source)?;
        let record = match store.get(&name) {
            Some(record) => record,
            None => {
                warn!("no metadata recorded for {name}, skipping");
                continue;
            }
        };
        let tool = match tool {
            Some(tool) => tool,
            None => {
                warn!("metadata tool unavailable, not copying metadata to {}", raster_name(pair));
                continue;
            }
        };
        match reattach_pair(tool, pair, record) {
            Ok(()) => report.succeeded += 1,
            Err(e) => warn!("could not copy metadata to {}: {e:#}", raster_name(pair)),
        }
    }
    bar.finish_and_clear();

    info!(
        "{}: copied metadata to {}/{} rasters",
        layout.name(),
        report.succeeded,
        report.total
    );
    Ok(report)
}

fn raster_name(pair: &Pair) -> String {
    file_name(&pair.raster).unwrap_or_else(|_| pair.raster.display().to_string())
}
