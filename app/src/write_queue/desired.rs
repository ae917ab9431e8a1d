use serde::Serialize;

use crate::{
    core::{
        time::DateTime,
        unit::{DegreeCelsius, DegreeFahrenheit},
    },
    device::{DeviceMode, DeviceStatus, Write},
    gateway::remote_target,
};

const TARGET_TEMPERATURE_TOLERANCE: f64 = 0.1;

/// What a consumer last asked the device to be, regardless of whether the remote call went through yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredState {
    pub target_temperature: Option<DegreeCelsius>,
    pub mode: Option<DeviceMode>,
    pub last_modified: DateTime,
    pub verification_due: Option<DateTime>,
    pub reconciliation_attempts: u32,
}

impl DesiredState {
    pub fn new() -> Self {
        Self {
            target_temperature: None,
            mode: None,
            last_modified: DateTime::now(),
            verification_due: None,
            reconciliation_attempts: 0,
        }
    }

    pub fn apply(&mut self, write: Write) {
        match write {
            Write::TargetTemperature(value) => self.target_temperature = Some(value),
            Write::Mode(mode) => self.mode = Some(mode),
        }
        self.last_modified = DateTime::now();
    }

    /// Writes needed to bring `actual` to this state. Unset fields never mismatch.
    ///
    /// The desired target is compared as the remote stores it, i.e. rounded to `resolution`.
    pub fn mismatches(&self, actual: &DeviceStatus, resolution: Option<DegreeFahrenheit>) -> Vec<Write> {
        let mut writes = vec![];

        if let Some(desired) = self.target_temperature {
            let expected = DegreeCelsius::from(remote_target(desired, resolution));
            let matches = actual
                .target_temperature
                .is_some_and(|actual| actual.abs_diff(&expected) <= TARGET_TEMPERATURE_TOLERANCE);

            if !matches {
                writes.push(Write::TargetTemperature(desired));
            }
        }

        if let Some(desired) = self.mode {
            if actual.mode != desired {
                writes.push(Write::Mode(desired));
            }
        }

        writes
    }
}

impl Default for DesiredState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actual(target: Option<f64>, mode: DeviceMode) -> DeviceStatus {
        DeviceStatus {
            connected: true,
            running: true,
            current_temperature: Some(DegreeCelsius(20.0)),
            target_temperature: target.map(DegreeCelsius),
            mode,
        }
    }

    fn desired(target: Option<f64>, mode: Option<DeviceMode>) -> DesiredState {
        let mut state = DesiredState::new();
        if let Some(target) = target {
            state.apply(Write::TargetTemperature(DegreeCelsius(target)));
        }
        if let Some(mode) = mode {
            state.apply(Write::Mode(mode));
        }
        state
    }

    #[test]
    fn unset_desired_state_never_mismatches() {
        let state = desired(None, None);

        assert!(state.mismatches(&actual(Some(30.0), DeviceMode::Cool), None).is_empty());
    }

    #[test]
    fn target_within_tolerance_matches() {
        let state = desired(Some(21.0), None);

        assert!(state.mismatches(&actual(Some(21.05), DeviceMode::Heat), None).is_empty());
        assert!(state.mismatches(&actual(Some(20.95), DeviceMode::Heat), None).is_empty());
    }

    #[test]
    fn target_outside_tolerance_mismatches() {
        let state = desired(Some(21.0), None);

        assert_eq!(
            state.mismatches(&actual(Some(21.2), DeviceMode::Heat), None),
            vec![Write::TargetTemperature(DegreeCelsius(21.0))]
        );
    }

    #[test]
    fn missing_actual_target_mismatches() {
        let state = desired(Some(21.0), None);

        assert_eq!(state.mismatches(&actual(None, DeviceMode::Heat), None).len(), 1);
    }

    #[test]
    fn mode_must_match_exactly() {
        let state = desired(Some(21.0), Some(DeviceMode::Heat));

        assert_eq!(
            state.mismatches(&actual(Some(21.0), DeviceMode::Standby), None),
            vec![Write::Mode(DeviceMode::Heat)]
        );
    }

    #[test]
    fn target_is_compared_at_remote_resolution() {
        let state = desired(Some(21.0), None);
        //21 °C is stored as 70 °F, which reads back as 21.11 °C
        let stored = actual(Some(21.111), DeviceMode::Heat);

        assert!(state.mismatches(&stored, Some(DegreeFahrenheit(1.0))).is_empty());
        assert_eq!(state.mismatches(&stored, None).len(), 1);
    }

    #[test]
    fn later_write_overrides_earlier_one() {
        let mut state = desired(None, Some(DeviceMode::Heat));
        state.apply(Write::Mode(DeviceMode::Cool));

        assert_eq!(state.mode, Some(DeviceMode::Cool));
    }
}
