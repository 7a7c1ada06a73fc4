mod args;

use anyhow::Result;
use dji_thermal::Pipeline;

use crate::args::Args;

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.quiet { "warn" } else { "info" }),
    )
    .init();

    let config = args.config();
    let summary = Pipeline::from_config(&config).run(&config.root, &config.stages)?;

    for outcome in &summary.outcomes {
        let name = outcome.folder.display();
        match &outcome.result {
            Ok(report) => eprintln!("{} {name}: success {report}", outcome.stage),
            Err(e) => eprintln!("{} {name}: failed ({e})", outcome.stage),
        }
    }
    eprintln!(
        "Processed {} folders, {} stage failures",
        summary
            .outcomes
            .iter()
            .map(|o| &o.folder)
            .collect::<std::collections::BTreeSet<_>>()
            .len(),
        summary.failed().count()
    );
    Ok(())
}
