use std::sync::Arc;

use anyhow::Context as _;
use settings::Settings;

use crate::{
    api::DeviceApi,
    gateway::HttpDeviceGateway,
    status_cache::StatusCache,
    write_queue::WriteQueue,
};

mod api;
mod core;
mod device;
mod gateway;
mod settings;
mod status_cache;
mod write_queue;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() -> anyhow::Result<()> {
    let settings = Settings::new().context("Error reading configuration")?;

    settings
        .monitoring
        .init()
        .map_err(|e| anyhow::anyhow!("Error initializing monitoring: {}", e))?;

    let gateway = Arc::new(HttpDeviceGateway::new(&settings.gateway).context("Error initializing device gateway")?);

    let cache = StatusCache::new(gateway.clone(), settings.cache.clone());
    let (queue, queue_runner) = WriteQueue::new(gateway, settings.write_queue.clone());

    for device in &settings.devices {
        tracing::info!("Synchronizing device {} ({})", device.name, device.id);
        queue.register_cache(&device.id, cache.clone());
    }

    if settings.devices.is_empty() {
        tracing::warn!("No devices configured");
    }

    let device_api = Arc::new(DeviceApi::new(
        settings.devices.iter().map(|d| (d.id.clone(), d.name.clone())),
        cache,
        queue,
    ));

    let http_server_exec = {
        let http_server = settings.http_server.clone();

        async move {
            http_server
                .run_server(move || vec![api::new_routes(device_api.clone())])
                .await
        }
    };

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = queue_runner.run() => {
            anyhow::bail!("Write queue stopped unexpectedly");
        },
        result = http_server_exec => {
            result.context("HTTP server execution failed")?;
        },
    );

    Ok(())
}
