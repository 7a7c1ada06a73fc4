//! Running the three stages over a directory tree.
//!
//! Stages run one after the other over every folder below
//! the root (extract all folders, then decode all folders,
//! then reattach). A failing folder is logged and recorded;
//! the remaining folders and stages still run. Only a
//! missing root or a missing prerequisite tool stops the
//! run.
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Result};
use log::{error, info, warn};

use crate::{
    config::Config,
    decoder::{decode_folder, DjiIrp, RadiometricDecoder},
    exiftool::{ExifTool, MetadataTool},
    extract::extract_folder,
    layout::{subdirectories, FolderLayout, INPUT_DIR},
    reattach::reattach_folder,
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Decode,
    Reattach,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Extract, Stage::Decode, Stage::Reattach];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Decode => "decode",
            Stage::Reattach => "reattach",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "extract" => Ok(Stage::Extract),
            "decode" => Ok(Stage::Decode),
            "reattach" => Ok(Stage::Reattach),
            _ => bail!("unknown stage `{s}` (expected extract, decode or reattach)"),
        }
    }
}

/// `success/total` of one stage over one folder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub succeeded: usize,
    pub total: usize,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.total)
    }
}

#[derive(Debug)]
pub struct FolderOutcome {
    pub folder: PathBuf,
    pub stage: Stage,
    /// The error message when the folder failed.
    pub result: std::result::Result<StageReport, String>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<FolderOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &FolderOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn report(&self, stage: Stage, folder: &Path) -> Option<&StageReport> {
        self.outcomes
            .iter()
            .find(|o| o.stage == stage && o.folder == folder)
            .and_then(|o| o.result.as_ref().ok())
    }
}

/// Folders processed under `root`: its subdirectories, or
/// the root itself when it has none or already is a working
/// set.
pub fn folders_under(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::RootNotFound(root.to_path_buf()).into());
    }
    if root.join(INPUT_DIR).is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }
    let folders = subdirectories(root)?;
    if folders.is_empty() {
        info!("no subfolders found, processing {}", root.display());
        return Ok(vec![root.to_path_buf()]);
    }
    Ok(folders)
}

pub struct Pipeline<M, D> {
    tool: M,
    decoder: D,
    show_progress: bool,
}

impl Pipeline<ExifTool, DjiIrp> {
    pub fn from_config(config: &Config) -> Self {
        Pipeline::new(
            ExifTool::new(&config.tools.exiftool),
            DjiIrp::from_tool_paths(&config.tools, &config.measurement_mode),
        )
        .with_progress(config.show_progress)
    }
}

impl<M: MetadataTool, D: RadiometricDecoder> Pipeline<M, D> {
    pub fn new(tool: M, decoder: D) -> Self {
        Pipeline {
            tool,
            decoder,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The metadata tool, if it runs.
    fn available_tool(&self) -> Option<&M> {
        match self.tool.version() {
            Ok(version) => {
                info!("metadata tool detected (version {version})");
                Some(&self.tool)
            }
            Err(e) => {
                warn!("{e:#}");
                None
            }
        }
    }

    /// Run `stages`, in order, over every folder below
    /// `root`.
    pub fn run(&self, root: &Path, stages: &[Stage]) -> Result<RunSummary> {
        let folders = folders_under(root)?;
        info!("found {} folders under {}", folders.len(), root.display());

        let mut summary = RunSummary::default();
        for &stage in stages {
            info!("===== {stage} =====");
            let tool = match stage {
                Stage::Extract => {
                    self.tool.version()?;
                    Some(&self.tool)
                }
                Stage::Decode => {
                    self.decoder.ensure_available()?;
                    self.available_tool()
                }
                Stage::Reattach => {
                    let tool = self.available_tool();
                    if tool.is_none() {
                        warn!("metadata will not be copied");
                    }
                    tool
                }
            };

            for folder in &folders {
                let layout = FolderLayout::new(folder);
                let result = self.run_stage(stage, tool, &layout);
                match &result {
                    Ok(report) => info!("{stage} {}: success {report}", layout.name()),
                    Err(e) => error!("{stage} {}: {e:#}", layout.name()),
                }
                summary.outcomes.push(FolderOutcome {
                    folder: folder.clone(),
                    stage,
                    result: result.map_err(|e| format!("{e:#}")),
                });
            }
        }
        Ok(summary)
    }

    fn run_stage(&self, stage: Stage, tool: Option<&M>, layout: &FolderLayout) -> Result<StageReport> {
        match stage {
            Stage::Extract => extract_folder(&self.tool, layout, self.show_progress),
            Stage::Decode => decode_folder(&self.decoder, tool, layout, self.show_progress),
            Stage::Reattach => reattach_folder(tool, layout, self.show_progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::tests::{write_jpeg, FakeDecoder},
        layout::METADATA_FILE,
        metadata::MetadataStore,
        reattach::tests::FakeTool,
    };
    use serde_json::json;
    use std::fs;

    fn fake_tool() -> FakeTool {
        FakeTool {
            tags: serde_json::from_value(json!({
                "SourceFile": "ignored",
                "File:FileSize": "12 kB",
                "EXIF:GPSLatitude": "+22.5",
                "EXIF:Make": "DJI",
                "XMP:RtkFlag": 50,
                "XMP:ImageSource": "InfraredCamera",
            }))
            .unwrap(),
            ..FakeTool::default()
        }
    }

    #[test]
    fn stage_names_parse() -> Result<()> {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>()?, stage);
        }
        assert_eq!("Decode".parse::<Stage>()?, Stage::Decode);
        assert!("convert".parse::<Stage>().is_err());
        Ok(())
    }

    #[test]
    fn missing_root_is_structural() {
        let pipeline = Pipeline::new(fake_tool(), FakeDecoder::new(4));
        let err = pipeline
            .run(Path::new("/nonexistent/main"), &Stage::ALL)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::RootNotFound(_))));
    }

    #[test]
    fn folder_discovery() -> Result<()> {
        let root = tempfile::tempdir()?;
        assert_eq!(folders_under(root.path())?, vec![root.path().to_path_buf()]);

        fs::create_dir(root.path().join("b"))?;
        fs::create_dir(root.path().join("a"))?;
        fs::write(root.path().join("notes.txt"), "")?;
        assert_eq!(
            folders_under(root.path())?,
            vec![root.path().join("a"), root.path().join("b")]
        );

        fs::create_dir(root.path().join(INPUT_DIR))?;
        assert_eq!(folders_under(root.path())?, vec![root.path().to_path_buf()]);
        Ok(())
    }

    #[test]
    fn three_images_end_to_end() -> Result<()> {
        let root = tempfile::tempdir()?;
        let folder = root.path().join("flight1");
        fs::create_dir(&folder)?;
        for name in ["X_T.JPG", "Y_T.JPG", "Z.JPG"] {
            write_jpeg(&folder.join(name), 16, 8)?;
        }

        let pipeline = Pipeline::new(fake_tool(), FakeDecoder::new(8 * 4));
        let summary = pipeline.run(root.path(), &Stage::ALL)?;
        assert_eq!(summary.failed().count(), 0);

        let layout = FolderLayout::new(&folder);
        let other: Vec<_> = fs::read_dir(&layout.other_dir)?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(other, vec!["Z.JPG"]);
        assert!(layout.input_dir.join("X_T.JPG").is_file());
        assert!(layout.input_dir.join("Y_T.JPG").is_file());

        let text = fs::read_to_string(folder.join(METADATA_FILE))?;
        let mut lines = text.lines();
        assert!(lines.next().unwrap_or_default().starts_with("ImageName"));
        assert_eq!(lines.count(), 2);

        let store = MetadataStore::load(&layout.metadata_file)?;
        let record = store.get("X_T.JPG").expect("record");
        assert_eq!(record.get("EXIF.GPSLatitude"), Some("22.5"));
        assert_eq!(record.get("EXIF.Make"), None);

        assert!(layout.out_dir.join("X_T.tiff").is_file());
        assert!(!layout.temp_dir.exists());

        let report = |stage| summary.report(stage, &folder).copied();
        assert_eq!(report(Stage::Extract), Some(StageReport { succeeded: 2, total: 2 }));
        assert_eq!(report(Stage::Decode), Some(StageReport { succeeded: 2, total: 2 }));
        assert_eq!(report(Stage::Reattach), Some(StageReport { succeeded: 2, total: 2 }));

        let args: Vec<String> = pipeline
            .tool
            .args_files
            .borrow()
            .iter()
            .map(|(_, contents)| contents.clone())
            .collect();
        assert_eq!(args, vec!["-XMP:ImageSource=InfraredCamera\n-XMP:RtkFlag=50\n"; 2]);
        Ok(())
    }

    #[test]
    fn failing_folder_does_not_stop_siblings() -> Result<()> {
        let root = tempfile::tempdir()?;
        let good = root.path().join("good");
        let empty = root.path().join("empty");
        fs::create_dir(&good)?;
        fs::create_dir(&empty)?;
        write_jpeg(&good.join("A_T.JPG"), 4, 4)?;

        let pipeline = Pipeline::new(fake_tool(), FakeDecoder::new(16));
        let summary = pipeline.run(root.path(), &Stage::ALL)?;

        let failed: Vec<_> = summary.failed().map(|o| (o.folder.clone(), o.stage)).collect();
        assert_eq!(failed, vec![(empty.clone(), Stage::Reattach)]);
        assert_eq!(
            summary.report(Stage::Reattach, &good),
            Some(&StageReport { succeeded: 1, total: 1 })
        );
        Ok(())
    }

    #[test]
    fn missing_decoder_stops_the_run() -> Result<()> {
        let root = tempfile::tempdir()?;
        let pipeline = Pipeline::new(fake_tool(), DjiIrp::new("/nonexistent/dji_irp"));
        let err = pipeline.run(root.path(), &[Stage::Decode]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ToolUnavailable { tool: "dji_irp", .. })
        ));
        Ok(())
    }
}
