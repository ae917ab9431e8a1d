use infrastructure::{TraceContext, meter};
use tokio::time::Instant;

use crate::{
    core::resilience::ExponentialBackoff,
    device::Write,
    gateway::{Ack, DeviceGateway, GatewayError, remote_target},
};

use super::{WriteQueue, pending::QueueItem};

/// Single consumer of the pending writes. Every remote call goes through here, which is what keeps the
/// aggregate call rate at or below one per interval.
pub(super) struct Dispatcher<G> {
    queue: WriteQueue<G>,
    last_call: Option<Instant>,
}

impl<G: DeviceGateway> Dispatcher<G> {
    pub fn new(queue: WriteQueue<G>) -> Self {
        Self { queue, last_call: None }
    }

    pub async fn run(mut self) {
        loop {
            self.wait_for_work().await;
            self.wait_for_interval().await;

            //popped only after the interval passed, so writes arriving meanwhile still coalesce
            let (item, remaining) = {
                let mut pending = self.queue.state.pending();
                (pending.pop_oldest(), pending.len())
            };

            let Some(item) = item else {
                continue;
            };

            meter::set("device_write_pending", remaining as f64, &[]);
            self.dispatch(item).await;
        }
    }

    async fn wait_for_work(&self) {
        loop {
            let notified = self.queue.state.dispatch_wakeup.notified();
            if !self.queue.state.pending().is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn wait_for_interval(&self) {
        if let Some(last_call) = self.last_call {
            tokio::time::sleep_until(last_call + std::time::Duration::from(self.queue.state.config.interval)).await;
        }
    }

    #[tracing::instrument(
        name = "dispatch_device_write",
        skip_all,
        fields(device_id = %item.device_id, write = %item.write, attempt = tracing::field::Empty)
    )]
    async fn dispatch(&mut self, item: QueueItem) {
        TraceContext::continue_from(&item.correlation_id);

        let config = &self.queue.state.config;
        let mut backoff = ExponentialBackoff::new(config.retry_base_delay, config.retry_max_delay);
        let max_retries = config.max_retries;

        loop {
            self.wait_for_interval().await;

            let attempt = backoff.attempts() + 1;
            TraceContext::record("attempt", &attempt);
            self.last_call = Some(Instant::now());

            let error = match self.send(&item).await {
                Ok(ack) => {
                    tracing::info!("Write {} to {} accepted with status {}", item.write, item.device_id, ack.status);
                    meter::increment("device_write_dispatched", &[("device_id", item.device_id.as_str())]);
                    return;
                }
                Err(error) => error,
            };

            if backoff.attempts() >= max_retries {
                tracing::error!(
                    "Giving up on write {} to {} after {} attempts: {}",
                    item.write,
                    item.device_id,
                    attempt,
                    error
                );
                meter::increment("device_write_failed", &[("device_id", item.device_id.as_str())]);
                return;
            }

            let delay = backoff.next_delay();
            backoff.bump();
            tracing::warn!(
                "Write {} to {} failed (attempt {}), retrying in {}: {}",
                item.write,
                item.device_id,
                attempt,
                delay,
                error
            );
            tokio::time::sleep(delay.into()).await;

            if self.queue.state.pending().contains(&item.device_id, item.write.field()) {
                tracing::debug!(
                    "Write {} to {} superseded while waiting for retry, dropping it",
                    item.write,
                    item.device_id
                );
                return;
            }
        }
    }

    async fn send(&self, item: &QueueItem) -> Result<Ack, GatewayError> {
        let gateway = &self.queue.state.gateway;

        match item.write {
            Write::TargetTemperature(value) => {
                let target = remote_target(value, gateway.target_resolution());
                gateway.set_target(&item.device_id, target).await
            }
            Write::Mode(mode) => gateway.set_mode(&item.device_id, mode).await,
        }
    }
}
