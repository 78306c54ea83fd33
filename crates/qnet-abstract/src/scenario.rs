use serde::Deserialize;
use thiserror::Error;

use crate::config::{ClassicalChannelSpec, EncodingKind, QuantumChannelSpec, SimConfig};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario `{name}`: {field} must be {requirement}")]
    InvalidField {
        name: String,
        field: &'static str,
        requirement: &'static str,
    },
}

/// A headless experiment: one quantum link, one classical link, a photon
/// source schedule, and the assertions to check after the run.
#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sim: SimConfigOverride,
    pub quantum: QuantumChannelSpec,
    pub classical: ClassicalChannelSpec,
    pub source: PhotonSourceSpec,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub seed: Option<u64>,
    pub runtime_ps: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.runtime_ps {
            config.runtime_ps = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PhotonSourceSpec {
    pub photons: u64,
    #[serde(default)]
    pub encoding: EncodingKind,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Fraction of emitted photons that must survive the channel.
    DeliveredFraction { min: f64, max: f64 },
    /// Simulated completion deadline.
    MaxDuration { ps: u64 },
    /// Lower bound on executed events.
    MinEventsExecuted { count: u64 },
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |field, requirement| ScenarioError::InvalidField {
            name: self.name.clone(),
            field,
            requirement,
        };
        if self.quantum.attenuation < 0.0 {
            return Err(invalid("quantum.attenuation", "non-negative"));
        }
        if self.quantum.distance_m == 0 {
            return Err(invalid("quantum.distance_m", "positive"));
        }
        if self.quantum.frequency_hz <= 0.0 {
            return Err(invalid("quantum.frequency_hz", "positive"));
        }
        if !(0.0..=1.0).contains(&self.quantum.polarization_fidelity) {
            return Err(invalid("quantum.polarization_fidelity", "within [0, 1]"));
        }
        if self.classical.distance_m == 0 && self.classical.delay_ps.is_none() {
            return Err(invalid("classical.distance_m", "positive unless delay_ps is set"));
        }
        if self.source.photons == 0 {
            return Err(invalid("source.photons", "positive"));
        }
        Ok(())
    }
}
