use anyhow::Result;
use dji_thermal::{
    config::{Config, ToolPaths, DEFAULT_ROOT},
    args_parser, opt, Stage,
};
use std::path::PathBuf;

pub struct Args {
    pub directory: PathBuf,
    pub stages: Vec<Stage>,
    pub exiftool: Option<PathBuf>,
    pub dji_irp: Option<PathBuf>,
    pub quiet: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-pipeline")
            .about("Convert DJI thermal photos to temperature TIFFs, keeping their metadata.")
            .arg(
                opt!("directory")
                    .short("d")
                    .default_value(DEFAULT_ROOT)
                    .help("Root directory; each subfolder is processed separately"),
            )
            .arg(
                opt!("stage")
                    .short("s")
                    .multiple(true)
                    .number_of_values(1)
                    .possible_values(&["extract", "decode", "reattach"])
                    .help("Stage(s) to run, in order (default: all)"),
            )
            .arg(opt!("exiftool").help("ExifTool executable (default: $EXIFTOOL_PATH or `exiftool`)"))
            .arg(opt!("dji irp").help("DJI Thermal SDK `dji_irp` executable (default: $DJI_IRP_PATH or `dji_irp`)"))
            .arg(
                opt!("quiet")
                    .short("q")
                    .takes_value(false)
                    .help("Only report warnings and errors"),
            )
            .get_matches();

        let directory = matches
            .value_of("directory")
            .unwrap_or(DEFAULT_ROOT)
            .into();
        let stages: Vec<Stage> = match matches.values_of("stage") {
            Some(values) => values.map(str::parse).collect::<Result<_>>()?,
            None => Stage::ALL.to_vec(),
        };

        Ok(Args {
            directory,
            stages,
            exiftool: matches.value_of("exiftool").map(PathBuf::from),
            dji_irp: matches.value_of("dji irp").map(PathBuf::from),
            quiet: matches.is_present("quiet"),
        })
    }

    pub fn config(&self) -> Config {
        let mut tools = ToolPaths::from_env();
        if let Some(exiftool) = &self.exiftool {
            tools.exiftool = exiftool.clone();
        }
        if let Some(dji_irp) = &self.dji_irp {
            tools.dji_irp = dji_irp.clone();
        }

        Config {
            root: self.directory.clone(),
            stages: self.stages.clone(),
            tools,
            show_progress: !self.quiet,
            ..Config::default()
        }
    }
}
