//! Wrapper around the external [ExifTool] executable.
//!
//! The pipeline only needs a handful of operations from a
//! metadata tool; they are collected in [`MetadataTool`] so
//! stages can be exercised without the real executable.
//!
//! [ExifTool]: //exiftool.org
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use anyhow::{bail, Context, Result};
use log::debug;
use serde_derive::*;
use serde_json::Value;

use crate::Error;

/// Group-qualified tags (`<group>:<name>`) of one file, as
/// reported by the tool.
pub type RawTags = BTreeMap<String, Value>;

pub trait MetadataTool {
    /// Check the tool runs; returns its version.
    fn version(&self) -> Result<String>;

    /// All group-qualified tags of `path`. Empty when the
    /// tool reports nothing.
    fn read_tags(&self, path: &Path) -> Result<RawTags>;

    /// Copy every tag of `source` into `target`, including
    /// tags that are normally protected.
    fn copy_all_tags(&self, source: &Path, target: &Path) -> Result<()>;

    /// Apply the assignments listed in `args_file` (one
    /// `-<Tag>=<value>` per line) to `target`.
    fn apply_args_file(&self, args_file: &Path, target: &Path) -> Result<()>;

    /// Copy only the GPS group and the thumbnail of
    /// `source` into `target`.
    fn copy_gps_and_thumbnail(&self, source: &Path, target: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ExifTool {
    exe: PathBuf,
}

/// One entry of `exiftool -j` output.
#[derive(Deserialize)]
struct JsonFormat {
    #[serde(rename = "SourceFile")]
    #[allow(dead_code)]
    pub filename: Option<String>,

    #[serde(flatten)]
    pub tags: RawTags,
}

impl ExifTool {
    pub fn new<P: Into<PathBuf>>(exe: P) -> Self {
        ExifTool { exe: exe.into() }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output> {
        debug!("running {} {:?}", self.exe.display(), args);
        Command::new(&self.exe)
            .args(args)
            .output()
            .with_context(|| format!("could not run {}", self.exe.display()))
    }

    fn run_checked(&self, args: &[&OsStr], what: &str) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            bail!(
                "exiftool failed to {what} ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

/// Parse `exiftool -j` output, keeping the first entry.
pub fn parse_json_output(stdout: &[u8]) -> Result<RawTags> {
    let mut entries: Vec<JsonFormat> =
        serde_json::from_slice(stdout).context("unexpected exiftool json output")?;
    if entries.is_empty() {
        return Ok(RawTags::new());
    }
    Ok(entries.swap_remove(0).tags)
}

impl MetadataTool for ExifTool {
    fn version(&self) -> Result<String> {
        let output = self.run(&[OsStr::new("-ver")]).map_err(|e| Error::ToolUnavailable {
            tool: "exiftool",
            reason: format!("{e:#}"),
        })?;
        if !output.status.success() {
            return Err(Error::ToolUnavailable {
                tool: "exiftool",
                reason: format!("`-ver` exited with {}", output.status),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn read_tags(&self, path: &Path) -> Result<RawTags> {
        let output = self.run_checked(
            &[OsStr::new("-j"), OsStr::new("-G"), OsStr::new("-a"), path.as_os_str()],
            "read tags",
        )?;
        parse_json_output(&output.stdout)
    }

    fn copy_all_tags(&self, source: &Path, target: &Path) -> Result<()> {
        self.run_checked(
            &[
                OsStr::new("-overwrite_original"),
                OsStr::new("-TagsFromFile"),
                source.as_os_str(),
                OsStr::new("-all:all"),
                OsStr::new("-unsafe"),
                target.as_os_str(),
            ],
            "copy metadata",
        )?;
        Ok(())
    }

    fn apply_args_file(&self, args_file: &Path, target: &Path) -> Result<()> {
        self.run_checked(
            &[
                OsStr::new("-overwrite_original"),
                OsStr::new("-@"),
                args_file.as_os_str(),
                target.as_os_str(),
            ],
            "apply tags",
        )?;
        Ok(())
    }

    fn copy_gps_and_thumbnail(&self, source: &Path, target: &Path) -> Result<()> {
        self.run_checked(
            &[
                OsStr::new("-overwrite_original"),
                OsStr::new("-TagsFromFile"),
                source.as_os_str(),
                OsStr::new("-GPS:all"),
                OsStr::new("-ThumbnailImage"),
                target.as_os_str(),
            ],
            "copy gps",
        )?;
        Ok(())
    }
}
