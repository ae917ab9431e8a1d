use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::unit::DegreeCelsius;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    #[display("off")]
    Off,
    #[display("standby")]
    Standby,
    #[display("heat")]
    Heat,
    #[display("cool")]
    Cool,
    #[display("auto")]
    Auto,
}

/// Snapshot of a device as reported by the remote API. Temperatures are normalized to Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub running: bool,
    pub current_temperature: Option<DegreeCelsius>,
    pub target_temperature: Option<DegreeCelsius>,
    pub mode: DeviceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum WriteField {
    #[display("target_temperature")]
    TargetTemperature,
    #[display("mode")]
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Write {
    #[display("target_temperature={_0}")]
    TargetTemperature(DegreeCelsius),
    #[display("mode={_0}")]
    Mode(DeviceMode),
}

impl Write {
    pub fn field(&self) -> WriteField {
        match self {
            Write::TargetTemperature(_) => WriteField::TargetTemperature,
            Write::Mode(_) => WriteField::Mode,
        }
    }
}
