use rand::Rng;
use rand::rngs::StdRng;

use qnet_abstract::EncodingKind;

/// A single qubit in flight. `is_null` marks a vacuum-state placeholder that
/// channels deliver regardless of loss.
#[derive(Debug, Clone)]
pub struct Photon {
    pub encoding: EncodingKind,
    pub is_null: bool,
    /// Degrees; rewritten by channel polarization noise.
    pub polarization_angle: f64,
}

impl Photon {
    pub fn new(encoding: EncodingKind) -> Self {
        Self {
            encoding,
            is_null: false,
            polarization_angle: 0.0,
        }
    }

    pub fn null(encoding: EncodingKind) -> Self {
        Self {
            encoding,
            is_null: true,
            polarization_angle: 0.0,
        }
    }

    pub fn random_noise(&mut self, rng: &mut StdRng) {
        self.polarization_angle = rng.random::<f64>() * 360.0;
    }
}
