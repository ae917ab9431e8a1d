mod http;
#[cfg(test)]
pub mod mock;

use derive_more::derive::{Display, Error};

use crate::{
    core::unit::{DegreeCelsius, DegreeFahrenheit},
    device::{DeviceId, DeviceMode, DeviceStatus},
};

pub use http::{HttpDeviceGateway, HttpGatewayConfig};

/// Port to the remote device API. Every call is idempotent on its own, so callers may retry freely.
pub trait DeviceGateway: Send + Sync + 'static {
    fn fetch_status(&self, device_id: &DeviceId) -> impl Future<Output = Result<DeviceStatus, GatewayError>> + Send;

    fn set_target(
        &self,
        device_id: &DeviceId,
        value: DegreeFahrenheit,
    ) -> impl Future<Output = Result<Ack, GatewayError>> + Send;

    fn set_mode(&self, device_id: &DeviceId, mode: DeviceMode)
    -> impl Future<Output = Result<Ack, GatewayError>> + Send;

    /// Step the remote stores target temperatures with. `None` when it keeps the value as sent.
    fn target_resolution(&self) -> Option<DegreeFahrenheit> {
        None
    }
}

/// Target temperature as the remote will store it.
pub fn remote_target(value: DegreeCelsius, resolution: Option<DegreeFahrenheit>) -> DegreeFahrenheit {
    let fahrenheit = DegreeFahrenheit::from(value);

    match resolution {
        Some(step) => fahrenheit.round_to(step),
        None => fahrenheit,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum GatewayError {
    #[display("Transport error: {_0}")]
    Transport(#[error(not(source))] String),

    #[display("Rate limited by remote API")]
    RateLimited,

    #[display("Remote API responded with {code}: {message}")]
    Status { code: u16, message: String },

    #[display("Error decoding response: {_0}")]
    Decode(#[error(not(source))] String),
}

pub const RATE_LIMITED: u16 = 429;

impl GatewayError {
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        if code == RATE_LIMITED {
            GatewayError::RateLimited
        } else {
            GatewayError::Status {
                code,
                message: message.into(),
            }
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            GatewayError::RateLimited => Some(RATE_LIMITED),
            GatewayError::Status { code, .. } => Some(*code),
            GatewayError::Transport(_) | GatewayError::Decode(_) => None,
        }
    }
}
