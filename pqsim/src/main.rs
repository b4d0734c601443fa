//! Parallel queueing network simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use eyre::WrapErr;
use indicatif::ProgressBar;

use pqsim::routing::PolicyKind;
use pqsim::{ParallelQueueSystem, SimulationConfig};

/// Runs a parallel queueing network simulation and prints the report as JSON.
#[derive(Parser)]
#[clap(version, author)]
struct Opt {
    /// Path to a JSON file with the simulation configuration. Missing fields take default values.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Routing policy, overriding the configuration.
    #[clap(long)]
    policy: Option<PolicyKind>,

    /// Number of sampled replicas for `power_of_d` and `redundancy`.
    #[clap(short)]
    d: Option<usize>,

    /// Redundancy threshold.
    #[clap(long)]
    threshold: Option<usize>,

    /// Number of replicas.
    #[clap(short, long)]
    replicas: Option<usize>,

    /// Random seed.
    #[clap(long)]
    seed: Option<u64>,

    /// Simulation time cap.
    #[clap(long)]
    max_time: Option<f64>,

    /// Job cap.
    #[clap(long)]
    max_jobs: Option<usize>,

    /// Verbosity. Use once to trace every job event.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,

    /// Store the logs this file.
    #[clap(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[clap(long)]
    no_stderr: bool,

    /// Pretty-print the report.
    #[clap(long)]
    pretty: bool,
}

fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let log_level = match opt.verbose {
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Warn,
    };
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(log_level);
    let dispatch = if let Some(path) = &opt.log_output {
        dispatch.chain(
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        )
    } else {
        dispatch
    };
    let dispatch = if opt.no_stderr {
        dispatch
    } else {
        dispatch.chain(std::io::stderr())
    };
    dispatch.apply()?;
    Ok(())
}

fn load_config(opt: &Opt) -> eyre::Result<SimulationConfig> {
    let mut config = match &opt.config {
        Some(path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("unable to read config {}", path.display()))?;
            serde_json::from_reader(file).wrap_err("unable to parse config")?
        }
        None => SimulationConfig::default(),
    };
    if let Some(policy) = opt.policy {
        config.routing.policy = policy;
    }
    if opt.d.is_some() {
        config.routing.d = opt.d;
    }
    if opt.threshold.is_some() {
        config.routing.threshold = opt.threshold;
    }
    if let Some(replicas) = opt.replicas {
        config.replicas = replicas;
    }
    if opt.seed.is_some() {
        config.seed = opt.seed;
    }
    if opt.max_time.is_some() {
        config.max_time = opt.max_time;
    }
    if opt.max_jobs.is_some() {
        config.max_jobs = opt.max_jobs;
    }
    if opt.verbose > 0 {
        config.verbose = true;
    }
    Ok(config)
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    set_up_logger(&opt)?;
    let config = load_config(&opt)?;
    let system = ParallelQueueSystem::new(config)?;
    log::info!("Running with seed {}", system.seed());
    let report = system.run(&ProgressBar::new(0))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if opt.pretty {
        serde_json::to_writer_pretty(&mut out, &report)?;
    } else {
        serde_json::to_writer(&mut out, &report)?;
    }
    writeln!(out)?;
    Ok(())
}
