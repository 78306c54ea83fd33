use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use qnet_abstract::{Scenario, ScenarioAssertion, SimConfig};

use crate::channel::{ClassicalChannel, QuantumChannel};
use crate::event::{Event, Op, Process};
use crate::node::Node;
use crate::photon::Photon;
use crate::timeline::Timeline;
use crate::trace::SimulationReport;

/// Read and parse a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("failed to parse scenario file")
}

/// Build the two-node topology, emit the photon schedule, run to completion
/// and check the scenario's assertions against the report.
pub fn run_scenario(scenario: &Scenario) -> Result<SimulationReport> {
    scenario.validate()?;
    let mut config = SimConfig::default();
    scenario.sim.apply_to(&mut config);

    let mut timeline = Timeline::with_config(&config);
    let alice = timeline.add(Node::new("alice", 0));
    let bob = timeline.add(Node::new("bob", 0));
    let qc = timeline.add(QuantumChannel::new("qc.alice.bob", &scenario.quantum));
    let cc = timeline.add(ClassicalChannel::new("cc.alice.bob", &scenario.classical));
    QuantumChannel::set_ends(&mut timeline, qc, alice, bob);
    ClassicalChannel::set_ends(&mut timeline, cc, alice, bob);

    timeline.init();

    // One emission event per photon, each in its own reserved time bin.
    for _ in 0..scenario.source.photons {
        let time = timeline.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
            channel.schedule_transmit(0, ctx.now())
        });
        timeline.schedule(Event::new(
            time,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(scenario.source.encoding),
                },
            ),
        ));
    }

    info!(
        "scenario `{}`: emitting {} photons",
        scenario.name, scenario.source.photons
    );
    timeline.run();

    let delivered = timeline.get::<Node>(bob).received_qubits().len() as u64;
    let channel = timeline.get::<QuantumChannel>(qc);
    let report = SimulationReport {
        scenario: scenario.name.clone(),
        duration_ps: timeline.now(),
        events_executed: timeline.events_executed(),
        photons_sent: scenario.source.photons,
        photons_delivered: delivered,
        delivered_fraction: delivered as f64 / scenario.source.photons as f64,
        channel_delay_ps: channel.delay(),
        channel_loss: channel.loss(),
    };
    check_assertions(scenario, &report)?;
    Ok(report)
}

fn check_assertions(scenario: &Scenario, report: &SimulationReport) -> Result<()> {
    for assertion in &scenario.assertions {
        match assertion {
            ScenarioAssertion::DeliveredFraction { min, max } => {
                if report.delivered_fraction < *min || report.delivered_fraction > *max {
                    bail!(
                        "scenario `{}`: delivered fraction {:.4} outside [{min}, {max}]",
                        scenario.name,
                        report.delivered_fraction
                    );
                }
            }
            ScenarioAssertion::MaxDuration { ps } => {
                if report.duration_ps > *ps {
                    bail!(
                        "scenario `{}`: finished at {} ps, past the {ps} ps deadline",
                        scenario.name,
                        report.duration_ps
                    );
                }
            }
            ScenarioAssertion::MinEventsExecuted { count } => {
                if report.events_executed < *count {
                    bail!(
                        "scenario `{}`: only {} events executed, expected at least {count}",
                        scenario.name,
                        report.events_executed
                    );
                }
            }
        }
    }
    Ok(())
}
