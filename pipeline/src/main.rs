use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use pipeline::core::location::LocationKey;
use pipeline::error::PipelineError;
use pipeline::exit_codes;
use pipeline::io::acquisition::CommandDataPreparer;
use pipeline::io::config::{PipelineConfig, load_config, write_config};
use pipeline::io::env::{self, EnvSnapshot, validate_preconditions};
use pipeline::io::simulation::CommandSimulator;
use pipeline::logging;
use pipeline::pipeline::execute;

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Grassland simulation pipeline: data acquisition, config materialization and replicated runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for one location and year range.
    Run {
        #[arg(long, default_value = "pipeline.toml")]
        config: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        /// Number of simulation replicates (overrides `simulation.replicates`).
        #[arg(long)]
        replicates: Option<u32>,
        /// Concurrent replicates (overrides `simulation.workers`).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Validate parameters and credentials and print the location key.
    Check {
        #[arg(long, default_value = "pipeline.toml")]
        config: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Print the location key for a coordinate pair.
    Key {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Write the default `pipeline.toml`.
    Init {
        #[arg(long, default_value = "pipeline.toml")]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Run parameters; each one overrides the environment variable of the same
/// meaning.
#[derive(Args, Debug)]
struct ParamArgs {
    /// Latitude in decimal degrees (LAT).
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<String>,
    /// Longitude in decimal degrees (LON).
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<String>,
    /// First simulated year (START_YEAR).
    #[arg(long)]
    start_year: Option<String>,
    /// Last simulated year (END_YEAR).
    #[arg(long)]
    end_year: Option<String>,
    /// Site identifier (DEIMS_ID).
    #[arg(long)]
    site_id: Option<String>,
    #[arg(long)]
    skip_grass_check: bool,
    #[arg(long)]
    skip_weather: bool,
    #[arg(long)]
    skip_soil: bool,
    #[arg(long)]
    skip_management: bool,
}

impl ParamArgs {
    fn apply(self, mut snapshot: EnvSnapshot) -> EnvSnapshot {
        let values = [
            (env::LAT, self.lat),
            (env::LON, self.lon),
            (env::START_YEAR, self.start_year),
            (env::END_YEAR, self.end_year),
            (env::SITE_ID, self.site_id),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                snapshot = snapshot.with(name, value);
            }
        }
        let flags = [
            (env::SKIP_GRASS_CHECK, self.skip_grass_check),
            (env::SKIP_WEATHER, self.skip_weather),
            (env::SKIP_SOIL, self.skip_soil),
            (env::SKIP_MANAGEMENT, self.skip_management),
        ];
        for (name, set) in flags {
            if set {
                snapshot = snapshot.with(name, "true");
            }
        }
        snapshot
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            std::process::exit(code);
        }
    };
    logging::init();

    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        let code = err
            .downcast_ref::<PipelineError>()
            .map(PipelineError::exit_code)
            .unwrap_or(exit_codes::INVALID);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            params,
            replicates,
            workers,
        } => cmd_run(&config, params, replicates, workers),
        Command::Check { config, params } => cmd_check(&config, params),
        Command::Key { lat, lon } => cmd_key(lat, lon),
        Command::Init { config, force } => cmd_init(&config, force),
    }
}

fn cmd_run(
    config_path: &Path,
    params: ParamArgs,
    replicates: Option<u32>,
    workers: Option<usize>,
) -> Result<()> {
    let mut cfg = load_config(config_path).context("load config")?;
    if let Some(replicates) = replicates {
        cfg.simulation.replicates = replicates;
    }
    if workers.is_some() {
        cfg.simulation.workers = workers;
    }
    cfg.validate().context("invalid run options")?;
    debug!(
        replicates = cfg.simulation.replicates,
        workers = ?cfg.simulation.workers,
        "config loaded"
    );

    let snapshot = params.apply(EnvSnapshot::from_process());
    let base_dir = std::env::current_dir().context("resolve working directory")?;
    let preparer = CommandDataPreparer::new(cfg.data_preparation.command.clone());
    let simulator = CommandSimulator::new(&cfg.simulation);

    let report = execute(&snapshot, &cfg, &base_dir, &preparer, &simulator)?;
    if let Some(summary) = &report.simulation {
        println!(
            "run: key={} verdict={:?} replicates={}/{}",
            report.location_key, summary.verdict, summary.succeeded, summary.total
        );
    }
    for outcome in report.replicates.iter().filter(|o| !o.succeeded()) {
        eprintln!("warning: replicate {} failed: {}", outcome.id, outcome.message);
    }
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn cmd_check(config_path: &Path, params: ParamArgs) -> Result<()> {
    let cfg = load_config(config_path).context("load config")?;
    let snapshot = params.apply(EnvSnapshot::from_process());
    let input = validate_preconditions(&snapshot, &cfg.credentials)?;
    let key = LocationKey::derive(&input.params)?;
    println!("{key}");
    Ok(())
}

fn cmd_key(lat: f64, lon: f64) -> Result<()> {
    let key = LocationKey::from_coordinates(lat, lon)?;
    println!("{key}");
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &PipelineConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(())
}
