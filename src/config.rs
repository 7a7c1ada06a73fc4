//! Run configuration shared by the library and the
//! `thermal-pipeline` binary.
use std::{env, ffi::OsString, path::PathBuf};

use crate::pipeline::Stage;

/// Root directory processed when none is given.
pub const DEFAULT_ROOT: &str = "main";

/// Decoder mode producing raw temperature samples.
pub const DEFAULT_MEASUREMENT_MODE: &str = "measure";

pub const EXIFTOOL_ENV: &str = "EXIFTOOL_PATH";
pub const DJI_IRP_ENV: &str = "DJI_IRP_PATH";
pub const DJI_LIB_DIR_ENV: &str = "DJI_TSDK_LIB_DIR";

/// Locations of the external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub exiftool: PathBuf,
    pub dji_irp: PathBuf,
    /// Extra directories holding the decoder's shared
    /// libraries.
    pub library_dirs: Vec<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            exiftool: PathBuf::from(if cfg!(windows) { "exiftool.exe" } else { "exiftool" }),
            dji_irp: PathBuf::from(if cfg!(windows) { "dji_irp.exe" } else { "dji_irp" }),
            library_dirs: vec![],
        }
    }
}

impl ToolPaths {
    /// Defaults overridden by `EXIFTOOL_PATH`,
    /// `DJI_IRP_PATH` and `DJI_TSDK_LIB_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key))
    }

    fn from_lookup<F: Fn(&str) -> Option<OsString>>(lookup: F) -> Self {
        let mut paths = ToolPaths::default();
        if let Some(exiftool) = lookup(EXIFTOOL_ENV) {
            paths.exiftool = exiftool.into();
        }
        if let Some(dji_irp) = lookup(DJI_IRP_ENV) {
            paths.dji_irp = dji_irp.into();
        }
        if let Some(dirs) = lookup(DJI_LIB_DIR_ENV) {
            paths.library_dirs = env::split_paths(&dirs).collect();
        }
        paths
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    /// Stages to run, in order.
    pub stages: Vec<Stage>,
    pub tools: ToolPaths,
    pub measurement_mode: String,
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from(DEFAULT_ROOT),
            stages: Stage::ALL.to_vec(),
            tools: ToolPaths::default(),
            measurement_mode: DEFAULT_MEASUREMENT_MODE.into(),
            show_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let paths = ToolPaths::from_lookup(|key| match key {
            EXIFTOOL_ENV => Some("/opt/exiftool/exiftool".into()),
            DJI_LIB_DIR_ENV => Some(env::join_paths(["/a", "/b"]).unwrap()),
            _ => None,
        });
        assert_eq!(paths.exiftool, PathBuf::from("/opt/exiftool/exiftool"));
        assert_eq!(paths.dji_irp, ToolPaths::default().dji_irp);
        assert_eq!(paths.library_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn default_runs_every_stage() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::from("main"));
        assert_eq!(config.stages, vec![Stage::Extract, Stage::Decode, Stage::Reattach]);
    }
}
