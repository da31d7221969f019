use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Confidence deficit of a judgment, always within `[0, 1]`.
///
/// Higher means less confident. Deserialization goes through
/// [`Uncertainty::new`], so an out-of-range value coming from an external
/// judgment is rejected rather than clamped.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Uncertainty(f64);

impl Uncertainty {
    pub const ZERO: Self = Self(0.0);
    pub const MAX: Self = Self(1.0);

    /// Validate a raw value. NaN and anything outside `[0, 1]` is rejected.
    pub fn new(value: f64) -> Result<Self, ContractError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(ContractError::UncertaintyOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Clamp a raw value into range. NaN is treated as total uncertainty.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self::MAX
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Uncertainty {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<f64> for Uncertainty {
    type Error = ContractError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Uncertainty> for f64 {
    fn from(u: Uncertainty) -> Self {
        u.0
    }
}

impl std::fmt::Display for Uncertainty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
