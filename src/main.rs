use inflammation::{config::Config, controller::Controller};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Input CSV or JSON files containing inflammation series for each patient
    #[arg(required = true)]
    infiles: Vec<PathBuf>,

    /// Also compute the standard deviation by day across all data sets next to the first file
    #[arg(long)]
    full_data_analysis: bool,

    /// Also show each patient's series normalised by its maximum
    #[arg(long)]
    normalise: bool,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    plot_dir: Option<PathBuf>,

    #[arg(long)]
    precision: Option<usize>,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::debug!("{args:#?}");

    let mut cfg = match &args.config {
        Some(file) => Config::from_file(file).context("failed to construct cfg")?,
        None => Config::default(),
    };
    if let Some(plot_dir) = args.plot_dir {
        cfg.output.plot_dir = Some(plot_dir);
    }
    if let Some(precision) = args.precision {
        cfg.output.precision = precision;
    }
    cfg.validate().context("invalid command line options")?;
    log::debug!("{cfg:#?}");

    let mut ctl = Controller::new(&cfg, args.normalise).context("failed to construct ctl")?;

    if args.full_data_analysis
        && let Some(file) = args.infiles.first()
    {
        ctl.analyse_directory(file)
            .context("failed to run full data analysis")?;
    }

    for file in &args.infiles {
        ctl.analyse_file(file)
            .with_context(|| format!("failed to analyse {file:?}"))?;
    }

    Ok(())
}
