use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use qnet_abstract::{
    ClassicalChannelSpec, EncodingKind, PhotonSourceSpec, QuantumChannelSpec, Scenario,
    SimConfigOverride,
};
use qnet_simulator::scenario_runner;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless quantum-network experiment runner")]
struct Args {
    /// Run a scenario from disk instead of the built-in default.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override the scenario's RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of emitted photons.
    #[arg(long)]
    photons: Option<u64>,

    /// Write a JSON trace of the finished experiment.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut scenario = match &args.scenario {
        Some(path) => scenario_runner::load_scenario(path)?,
        None => default_scenario(),
    };
    if let Some(seed) = args.seed {
        scenario.sim.seed = Some(seed);
    }
    if let Some(photons) = args.photons {
        scenario.source.photons = photons;
    }

    info!("running scenario `{}`", scenario.name);
    let report = scenario_runner::run_scenario(&scenario)?;
    println!(
        "{}: {}/{} photons delivered ({:.4}) over {} ps, {} events executed",
        report.scenario,
        report.photons_delivered,
        report.photons_sent,
        report.delivered_fraction,
        report.duration_ps,
        report.events_executed
    );

    if let Some(path) = &args.trace_out {
        let data = serde_json::to_vec_pretty(&report).context("failed to serialize trace")?;
        fs::write(path, &data)
            .with_context(|| format!("failed to write trace file {}", path.display()))?;
        info!("trace written to {}", path.display());
    }
    Ok(())
}

fn default_scenario() -> Scenario {
    Scenario {
        name: "default".to_string(),
        description: "1 km polarization link with a fixed seed".to_string(),
        sim: SimConfigOverride {
            seed: Some(42),
            runtime_ps: None,
        },
        quantum: QuantumChannelSpec::default(),
        classical: ClassicalChannelSpec::default(),
        source: PhotonSourceSpec {
            photons: 1_000,
            encoding: EncodingKind::Polarization,
        },
        assertions: Vec::new(),
    }
}
