use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig};
use serde::Deserialize;

use crate::{
    device::DeviceId, gateway::HttpGatewayConfig, status_cache::StatusCacheConfig, write_queue::WriteQueueConfig,
};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub http_server: HttpServerConfig,
    pub gateway: HttpGatewayConfig,
    #[serde(default)]
    pub cache: StatusCacheConfig,
    #[serde(default)]
    pub write_queue: WriteQueueConfig,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSettings {
    pub id: DeviceId,
    pub name: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }

    #[cfg(test)]
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::t;

    const MINIMAL: &str = r#"
        [monitoring]
        service_name = "device-sync"
        app_name = "device-sync"
        logs = { default_level = "info" }
        traces = { default_level = "info" }

        [http_server]
        port = 8080

        [gateway]
        url = "http://localhost:9000"
    "#;

    #[test]
    fn engine_sections_fall_back_to_defaults() {
        let settings = Settings::from_toml(MINIMAL).unwrap();

        assert_eq!(settings.cache.ttl, t!(1 seconds));
        assert_eq!(settings.cache.backoff_ceiling, t!(5 minutes));
        assert_eq!(settings.write_queue.interval, t!(2000 millis));
        assert_eq!(settings.write_queue.max_retries, 3);
        assert_eq!(settings.write_queue.verification_delay, t!(30 seconds));
        assert_eq!(settings.write_queue.max_reconciliation_attempts, 5);
        assert_eq!(settings.gateway.timeout_secs, 10);
        assert!(settings.devices.is_empty());
    }

    #[test]
    fn durations_are_read_as_iso8601() {
        let content = format!(
            r#"{}
            [write_queue]
            interval = "PT5S"
            verification_delay = "PT1M"

            [cache]
            ttl = "PT3S"

            [[devices]]
            id = "hp-1"
            name = "Living room"
            "#,
            MINIMAL
        );

        let settings = Settings::from_toml(&content).unwrap();

        assert_eq!(settings.write_queue.interval, t!(5 seconds));
        assert_eq!(settings.write_queue.verification_delay, t!(1 minutes));
        assert_eq!(settings.write_queue.retry_max_delay, t!(10 seconds));
        assert_eq!(settings.cache.ttl, t!(3 seconds));
        assert_eq!(settings.devices.len(), 1);
        assert_eq!(settings.devices[0].id, DeviceId::new("hp-1"));
    }
}
