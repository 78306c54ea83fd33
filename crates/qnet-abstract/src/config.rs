use serde::{Deserialize, Serialize};

/// Photon encoding tag carried by qubits and scenario files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    #[default]
    Polarization,
    TimeBin,
}

/// Simulation-wide knobs: the RNG seed and the stop horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_runtime")]
    pub runtime_ps: u64,
}

fn default_runtime() -> u64 {
    u64::MAX
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            runtime_ps: u64::MAX,
        }
    }
}

/// Constructor parameters of a quantum channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantumChannelSpec {
    /// dB per meter.
    pub attenuation: f64,
    pub distance_m: u64,
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    #[serde(default = "default_polarization_fidelity")]
    pub polarization_fidelity: f64,
    #[serde(default = "default_light_speed")]
    pub light_speed_m_per_ps: f64,
}

impl Default for QuantumChannelSpec {
    fn default() -> Self {
        Self {
            attenuation: 0.0002,
            distance_m: 1_000,
            frequency_hz: default_frequency(),
            polarization_fidelity: default_polarization_fidelity(),
            light_speed_m_per_ps: default_light_speed(),
        }
    }
}

/// Constructor parameters of a classical channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassicalChannelSpec {
    pub distance_m: u64,
    /// Overrides the distance-derived propagation delay.
    #[serde(default)]
    pub delay_ps: Option<u64>,
    #[serde(default = "default_light_speed")]
    pub light_speed_m_per_ps: f64,
}

impl Default for ClassicalChannelSpec {
    fn default() -> Self {
        Self {
            distance_m: 1_000,
            delay_ps: None,
            light_speed_m_per_ps: default_light_speed(),
        }
    }
}

fn default_frequency() -> f64 {
    8e7
}

fn default_polarization_fidelity() -> f64 {
    1.0
}

/// Meters per picosecond in fiber.
fn default_light_speed() -> f64 {
    2e-4
}
