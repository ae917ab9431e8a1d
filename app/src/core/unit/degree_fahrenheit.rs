use std::fmt::Display;

use derive_more::derive::AsRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, AsRef, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DegreeFahrenheit(pub f64);

impl DegreeFahrenheit {
    /// Rounds to the nearest multiple of `step`. Non-positive steps leave the value untouched.
    pub fn round_to(self, step: DegreeFahrenheit) -> Self {
        if step.0 > 0.0 {
            Self((self.0 / step.0).round() * step.0)
        } else {
            self
        }
    }
}

impl From<f64> for DegreeFahrenheit {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<DegreeFahrenheit> for f64 {
    fn from(value: DegreeFahrenheit) -> Self {
        value.0
    }
}

impl Display for DegreeFahrenheit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} °F", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_whole_degrees() {
        assert_eq!(DegreeFahrenheit(69.8).round_to(DegreeFahrenheit(1.0)), DegreeFahrenheit(70.0));
        assert_eq!(DegreeFahrenheit(71.4).round_to(DegreeFahrenheit(1.0)), DegreeFahrenheit(71.0));
    }

    #[test]
    fn rounds_to_half_degrees() {
        assert_eq!(DegreeFahrenheit(71.6).round_to(DegreeFahrenheit(0.5)), DegreeFahrenheit(71.5));
    }

    #[test]
    fn zero_step_keeps_value() {
        assert_eq!(DegreeFahrenheit(69.8).round_to(DegreeFahrenheit(0.0)), DegreeFahrenheit(69.8));
    }
}
