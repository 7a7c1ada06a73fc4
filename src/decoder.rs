//! Radiometric decoding: the second stage.
//!
//! Each thermal source in `input_dir/` is run through the
//! vendor decoder (DJI Thermal SDK's `dji_irp`), the raw
//! output is reshaped into a [`ThermalRaster`] and saved to
//! `out_dir/<stem>.tiff`, carrying only the GPS tags and
//! thumbnail of the source until reattachment runs.
use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use img_parts::{jpeg::Jpeg, ImageEXIF};
use log::{debug, info, warn};

use crate::{
    cli::progress_bar,
    config::{ToolPaths, DEFAULT_MEASUREMENT_MODE},
    exiftool::MetadataTool,
    layout::FolderLayout,
    pipeline::StageReport,
    raster::{jpeg_dimensions, read_raw_samples, recover_dimensions, Dimensions, Recovered, ThermalRaster},
    Error,
};

pub trait RadiometricDecoder {
    /// Fail with [`Error::ToolUnavailable`] when the decoder
    /// cannot run at all.
    fn ensure_available(&self) -> Result<()>;

    /// Decode `source` into a flat raw sample file at
    /// `raw_out`.
    fn decode(&self, source: &Path, raw_out: &Path) -> Result<()>;
}

/// The `dji_irp` command line utility of the DJI Thermal
/// SDK.
#[derive(Debug, Clone)]
pub struct DjiIrp {
    exe: PathBuf,
    library_dirs: Vec<PathBuf>,
    mode: String,
}

impl DjiIrp {
    pub fn new<P: Into<PathBuf>>(exe: P) -> Self {
        DjiIrp {
            exe: exe.into(),
            library_dirs: vec![],
            mode: DEFAULT_MEASUREMENT_MODE.into(),
        }
    }

    pub fn from_tool_paths(paths: &ToolPaths, mode: &str) -> Self {
        DjiIrp {
            exe: paths.dji_irp.clone(),
            library_dirs: paths.library_dirs.clone(),
            mode: mode.into(),
        }
    }

    /// The executable path, searched on `PATH` when given
    /// as a bare name. Files that cannot be executed are
    /// not considered.
    pub fn resolve(&self) -> Option<PathBuf> {
        match which::which(&self.exe) {
            Ok(exe) => Some(exe),
            Err(e) => {
                debug!("{}: {e}", self.exe.display());
                None
            }
        }
    }

    /// Shared library search path: the decoder's directory,
    /// the configured directories, then the inherited
    /// value of `var`.
    fn library_path(&self, exe: &Path, var: &str) -> Result<OsString> {
        let mut dirs: Vec<PathBuf> = exe.parent().map(Path::to_path_buf).into_iter().collect();
        dirs.extend(self.library_dirs.iter().filter(|d| d.is_dir()).cloned());
        if let Some(existing) = env::var_os(var) {
            dirs.extend(env::split_paths(&existing));
        }
        Ok(env::join_paths(dirs)?)
    }
}

impl RadiometricDecoder for DjiIrp {
    fn ensure_available(&self) -> Result<()> {
        match self.resolve() {
            Some(exe) => {
                debug!("using decoder {}", exe.display());
                Ok(())
            }
            None => Err(Error::ToolUnavailable {
                tool: "dji_irp",
                reason: format!("{} not found", self.exe.display()),
            }
            .into()),
        }
    }

    fn decode(&self, source: &Path, raw_out: &Path) -> Result<()> {
        let exe = self.resolve().ok_or_else(|| Error::ToolUnavailable {
            tool: "dji_irp",
            reason: format!("{} not found", self.exe.display()),
        })?;
        let exe = fs::canonicalize(&exe).unwrap_or(exe);
        let source = fs::canonicalize(source)?;
        let raw_out = env::current_dir()?.join(raw_out);

        let lib_var = if cfg!(windows) { "PATH" } else { "LD_LIBRARY_PATH" };
        let status = Command::new(&exe)
            .arg("-s")
            .arg(&source)
            .arg("-a")
            .arg(&self.mode)
            .arg("-o")
            .arg(&raw_out)
            .env(lib_var, self.library_path(&exe, lib_var)?)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("could not run {}", exe.display()))?;

        anyhow::ensure!(
            status.success(),
            "dji_irp failed on {} ({status})",
            source.display()
        );
        anyhow::ensure!(
            raw_out.is_file(),
            "dji_irp produced no output for {}",
            source.display()
        );
        Ok(())
    }
}

/// Convert one source image, returning the recovered
/// dimensions.
///
/// `hint` is the folder's last non-declared recovery, see
/// [`recover_dimensions`].
pub fn convert_image<D: RadiometricDecoder + ?Sized>(
    decoder: &D,
    layout: &FolderLayout,
    source: &Path,
    hint: Option<Dimensions>,
) -> Result<Recovered> {
    let raw_path = layout.raw_path_for(source)?;
    let output = layout.raster_path_for(source)?;

    decoder.decode(source, &raw_path)?;
    let samples = read_raw_samples(&raw_path);
    if let Err(e) = fs::remove_file(&raw_path) {
        debug!("failed to remove {}: {e}", raw_path.display());
    }
    let samples = samples?;

    let declared = jpeg_dimensions(source)?;
    let recovered = recover_dimensions(samples.len(), declared, hint)
        .with_context(|| format!("recovering dimensions of {}", source.display()))?;
    if let Recovered::Searched(dims) = recovered {
        info!("thermal data size ({dims}) differs from visible image size ({declared})");
    }

    ThermalRaster::from_samples(&samples, recovered.dimensions())?.save_tiff(&output)?;
    Ok(recovered)
}

/// Copy GPS tags and thumbnail of `source` into `raster`,
/// when the source has EXIF data at all.
pub fn transplant_exif<M: MetadataTool + ?Sized>(tool: &M, source: &Path, raster: &Path) -> Result<()> {
    let jpeg = Jpeg::from_bytes(fs::read(source)?.into())?;
    if jpeg.exif().is_none() {
        debug!("{} has no EXIF segment", source.display());
        return Ok(());
    }
    tool.copy_gps_and_thumbnail(source, raster)
}

/// Scratch directory removed when dropped.
struct ScratchDir<'a>(&'a Path);

impl<'a> ScratchDir<'a> {
    fn create(path: &'a Path) -> Result<Self> {
        recreate_dir(path)?;
        Ok(ScratchDir(path))
    }
}

impl Drop for ScratchDir<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(self.0) {
            warn!("failed to remove {}: {e}", self.0.display());
        }
    }
}

fn recreate_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("removing {}", path.display()))?;
    }
    fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}

/// Decode every source of a folder. `out_dir` is recreated
/// empty; `temp_dir` exists only while this runs.
///
/// `exif_tool` is used for the GPS/thumbnail transplant and
/// may be `None` when no metadata tool is available.
pub fn decode_folder<D, M>(
    decoder: &D,
    exif_tool: Option<&M>,
    layout: &FolderLayout,
    show_progress: bool,
) -> Result<StageReport>
where
    D: RadiometricDecoder + ?Sized,
    M: MetadataTool + ?Sized,
{
    layout.require_sources()?;
    let sources = layout.sources()?;
    if sources.is_empty() {
        warn!("{}: no images found in {}", layout.name(), layout.input_dir.display());
        return Ok(StageReport::default());
    }

    recreate_dir(&layout.out_dir)?;
    let _scratch = ScratchDir::create(&layout.temp_dir)?;

    let bar = progress_bar(sources.len(), "converting", show_progress);
    let mut report = StageReport {
        succeeded: 0,
        total: sources.len(),
    };
    let mut hint = None;
    for source in &sources {
        match convert_image(decoder, layout, source, hint) {
            Ok(recovered) => {
                hint = recovered.as_hint().or(hint);
                report.succeeded += 1;
                if let Some(tool) = exif_tool {
                    let raster = layout.raster_path_for(source)?;
                    if let Err(e) = transplant_exif(tool, source, &raster) {
                        warn!("could not copy GPS data to {}: {e:#}", raster.display());
                    }
                }
            }
            Err(e) => warn!("skipping {}: {e:#}", source.display()),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "{}: converted {}/{} images",
        layout.name(),
        report.succeeded,
        report.total
    );
    Ok(report)
}
