//! Tag extraction: the first stage.
//!
//! Only camera metadata worth carrying over to the derived
//! raster is kept: tags whose name mentions one of
//! [`KEYWORDS`], minus the file-system tags in [`DENYLIST`].
use std::path::Path;

use anyhow::Result;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde_json::Value;

use crate::{
    cli::progress_bar,
    exiftool::{MetadataTool, RawTags},
    layout::{file_name, FolderLayout},
    metadata::{MetadataRecord, MetadataStore},
    pipeline::StageReport,
    router::route_folder,
};

/// Tags are kept when their lowercased name contains one
/// of these.
pub const KEYWORDS: &[&str] = &["dji", "gps", "image", "rtk", "thermal"];

/// File-system tags that are never kept.
pub const DENYLIST: &[&str] = &[
    "SourceFile",
    "Directory",
    "FileSize",
    "FileModifyDate",
    "FileAccessDate",
    "FileInodeChangeDate",
];

lazy_static! {
    static ref KEYWORD_RE: Regex =
        Regex::new(&format!("(?i){}", KEYWORDS.join("|"))).expect("keyword regex");
}

/// Whether a tag name (without group) is kept.
pub fn is_wanted_tag(name: &str) -> bool {
    !DENYLIST.contains(&name) && KEYWORD_RE.is_match(name)
}

/// Render a tool value as stored in the metadata table.
/// Leading `+` signs are removed so signed coordinates and
/// altitudes read back as plain numbers.
pub fn stringify_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    text.trim_start_matches('+').to_string()
}

/// Filter raw `<group>:<name>` tags into a record keyed by
/// `<group>.<name>`. Returns `None` when nothing is left.
pub fn filter_tags(image_name: &str, raw: &RawTags) -> Option<MetadataRecord> {
    let mut record = MetadataRecord::new(image_name);
    for (full_name, value) in raw {
        let (group, name) = match full_name.split_once(':') {
            Some(parts) => parts,
            None => continue,
        };
        if is_wanted_tag(name) {
            record
                .tags
                .insert(format!("{group}.{name}"), stringify_value(value));
        }
    }
    (!record.tags.is_empty()).then(|| record)
}

/// Read and filter the tags of one image.
pub fn extract_record<M: MetadataTool + ?Sized>(
    tool: &M,
    path: &Path,
) -> Result<Option<MetadataRecord>> {
    let image_name = file_name(path)?;
    let raw = tool.read_tags(path)?;
    if raw.is_empty() {
        warn!("no metadata found in {image_name}");
        return Ok(None);
    }
    let record = filter_tags(&image_name, &raw);
    if record.is_none() {
        warn!("no matching metadata found in {image_name}");
    }
    Ok(record)
}

/// Sort the folder's images and extract the metadata of the
/// thermal ones into `metadata.txt`.
pub fn extract_folder<M: MetadataTool + ?Sized>(
    tool: &M,
    layout: &FolderLayout,
    show_progress: bool,
) -> Result<StageReport> {
    let routed = route_folder(layout)?;
    if routed.resumed {
        info!(
            "{}: input directory already populated, continuing with those files",
            layout.name()
        );
    }

    let sources = layout.sources()?;
    if sources.is_empty() {
        warn!(
            "{}: no thermal photos found (names ending with `T.JPG` or `INFRA.JPG`)",
            layout.name()
        );
        return Ok(StageReport::default());
    }
    info!("{}: extracting metadata of {} thermal photos", layout.name(), sources.len());

    let bar = progress_bar(sources.len(), "extracting metadata", show_progress);
    let mut store = MetadataStore::new();
    for path in &sources {
        match extract_record(tool, path) {
            Ok(Some(record)) => store.insert(record),
            Ok(None) => {}
            Err(e) => warn!("skipping {}: {e:#}", path.display()),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let report = StageReport {
        succeeded: store.len(),
        total: sources.len(),
    };
    if store.is_empty() {
        warn!("{}: could not extract metadata from any image", layout.name());
        return Ok(report);
    }

    store.save(&layout.metadata_file)?;
    info!(
        "{}: wrote {} columns for {}/{} images to {}",
        layout.name(),
        store.vocabulary().len() + 1,
        report.succeeded,
        report.total,
        layout.metadata_file.display()
    );
    Ok(report)
}
