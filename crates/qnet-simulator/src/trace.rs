use serde::Serialize;

/// Serializable snapshot of a finished experiment.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub duration_ps: u64,
    pub events_executed: u64,
    pub photons_sent: u64,
    pub photons_delivered: u64,
    pub delivered_fraction: f64,
    pub channel_delay_ps: u64,
    pub channel_loss: f64,
}
