use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::{
    core::unit::{DegreeCelsius, DegreeFahrenheit},
    device::{DeviceId, DeviceMode, DeviceStatus},
    gateway::{Ack, DeviceGateway, GatewayError},
};

#[derive(Debug, Clone, Deserialize)]
pub struct HttpGatewayConfig {
    pub url: String,
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Step the remote stores target temperatures with, e.g. `1.0` for whole degrees.
    #[serde(default)]
    pub target_resolution_f: Option<DegreeFahrenheit>,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone)]
pub struct HttpDeviceGateway {
    client: ClientWithMiddleware,
    base_url: String,
    target_resolution: Option<DegreeFahrenheit>,
}

//example
// {"connected": true, "running": true, "current_temperature_f": 68.5, "target_temperature_f": 70.0, "mode": "heat"}
#[derive(Debug, Deserialize)]
struct RemoteStatusPayload {
    connected: bool,
    #[serde(default)]
    running: bool,
    current_temperature_f: Option<f64>,
    target_temperature_f: Option<f64>,
    mode: DeviceMode,
}

#[derive(Debug, Serialize)]
struct SetTargetPayload {
    value: f64,
}

#[derive(Debug, Serialize)]
struct SetModePayload {
    mode: DeviceMode,
}

impl From<RemoteStatusPayload> for DeviceStatus {
    fn from(payload: RemoteStatusPayload) -> Self {
        let to_celsius = |f: f64| DegreeCelsius::from(DegreeFahrenheit(f));

        DeviceStatus {
            connected: payload.connected,
            running: payload.running,
            current_temperature: payload.current_temperature_f.map(to_celsius),
            target_temperature: payload.target_temperature_f.map(to_celsius),
            mode: payload.mode,
        }
    }
}

impl HttpDeviceGateway {
    pub fn new(config: &HttpGatewayConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(config.token.clone())
            .with_timeout(std::time::Duration::from_secs(config.timeout_secs))
            .new_tracing_client()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            target_resolution: config.target_resolution_f,
        })
    }

    fn device_url(&self, device_id: &DeviceId, path: &str) -> String {
        format!("{}/devices/{}/{}", self.base_url, device_id, path)
    }

    async fn put_json<T: Serialize>(&self, url: String, payload: &T) -> Result<Ack, GatewayError> {
        let response = self
            .client
            .put(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, body));
        }

        Ok(Ack { status })
    }
}

impl DeviceGateway for HttpDeviceGateway {
    #[tracing::instrument(skip(self), fields(%device_id))]
    async fn fetch_status(&self, device_id: &DeviceId) -> Result<DeviceStatus, GatewayError> {
        let response = self
            .client
            .get(self.device_url(device_id, "status"))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        parse_status(&body)
    }

    #[tracing::instrument(skip(self), fields(%device_id, %value))]
    async fn set_target(&self, device_id: &DeviceId, value: DegreeFahrenheit) -> Result<Ack, GatewayError> {
        tracing::info!("Setting target temperature of {} to {}", device_id, value);
        self.put_json(
            self.device_url(device_id, "target_temperature"),
            &SetTargetPayload { value: value.0 },
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(%device_id, %mode))]
    async fn set_mode(&self, device_id: &DeviceId, mode: DeviceMode) -> Result<Ack, GatewayError> {
        tracing::info!("Setting mode of {} to {}", device_id, mode);
        self.put_json(self.device_url(device_id, "mode"), &SetModePayload { mode })
            .await
    }

    fn target_resolution(&self) -> Option<DegreeFahrenheit> {
        self.target_resolution
    }
}

fn parse_status(body: &str) -> Result<DeviceStatus, GatewayError> {
    serde_json::from_str::<RemoteStatusPayload>(body)
        .map(DeviceStatus::from)
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;

    use super::*;

    #[test]
    fn status_payload_is_converted_to_celsius() {
        let status = parse_status(
            r#"{"connected": true, "running": true, "current_temperature_f": 68.0, "target_temperature_f": 50.0, "mode": "heat"}"#,
        )
        .unwrap();

        assert!(status.connected);
        assert!(status.running);
        assert_eq!(status.current_temperature, Some(DegreeCelsius(20.0)));
        assert_eq!(status.target_temperature, Some(DegreeCelsius(10.0)));
        assert_eq!(status.mode, DeviceMode::Heat);
    }

    #[test]
    fn missing_temperatures_are_absent() {
        let status = parse_status(r#"{"connected": false, "mode": "off"}"#).unwrap();

        assert!(!status.running);
        assert_eq!(status.current_temperature, None);
        assert_eq!(status.target_temperature, None);
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let error = parse_status(r#"{"connected": "yes"}"#).unwrap_err();

        assert!(matches!(error, GatewayError::Decode(_)));
    }

    #[test]
    fn set_payloads_match_remote_format() {
        assert_json_eq!(
            serde_json::to_value(SetTargetPayload { value: 50.0 }).unwrap(),
            serde_json::json!({ "value": 50.0 })
        );
        assert_json_eq!(
            serde_json::to_value(SetModePayload { mode: DeviceMode::Standby }).unwrap(),
            serde_json::json!({ "mode": "standby" })
        );
    }

    #[test]
    fn device_url_strips_trailing_slash() {
        let gateway = HttpDeviceGateway::new(&HttpGatewayConfig {
            url: "http://remote.local/api/".to_string(),
            token: Some("secret".to_string()),
            timeout_secs: 5,
            target_resolution_f: None,
        })
        .unwrap();

        assert_eq!(
            gateway.device_url(&DeviceId::new("hp-1"), "status"),
            "http://remote.local/api/devices/hp-1/status"
        );
    }

    #[test]
    fn target_resolution_is_read_from_config() {
        let config: HttpGatewayConfig = serde_json::from_value(serde_json::json!({
            "url": "http://remote.local/api",
            "target_resolution_f": 1.0
        }))
        .unwrap();
        let gateway = HttpDeviceGateway::new(&config).unwrap();

        assert_eq!(config.timeout_secs, 10);
        assert_eq!(gateway.target_resolution(), Some(DegreeFahrenheit(1.0)));
    }
}
