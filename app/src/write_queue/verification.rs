use std::collections::HashMap;

use futures::StreamExt as _;
use infrastructure::meter;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::time::{DelayQueue, delay_queue};

use crate::{
    device::{DeviceId, Write},
    gateway::DeviceGateway,
};

use super::{WriteOrigin, WriteQueue};

#[derive(Debug)]
pub(super) struct VerificationRequest {
    pub device_id: DeviceId,
    pub due: Instant,
}

/// One verification timer per device. A new request for a device with a pending timer moves that timer,
/// so a burst of writes is verified once, after the last of them.
pub(super) struct VerificationScheduler<G> {
    queue: WriteQueue<G>,
    requests: mpsc::UnboundedReceiver<VerificationRequest>,
    timers: DelayQueue<DeviceId>,
    keys: HashMap<DeviceId, delay_queue::Key>,
}

impl<G: DeviceGateway> VerificationScheduler<G> {
    pub fn new(queue: WriteQueue<G>, requests: mpsc::UnboundedReceiver<VerificationRequest>) -> Self {
        Self {
            queue,
            requests,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        tracing::error!("Verification request channel closed; stopping scheduler");
                        break;
                    };
                    self.schedule(request);
                }
                Some(expired) = self.timers.next() => {
                    let device_id = expired.into_inner();
                    self.keys.remove(&device_id);

                    let queue = self.queue.clone();
                    tokio::spawn(async move { queue.verify(device_id).await });
                }
            }
        }
    }

    fn schedule(&mut self, request: VerificationRequest) {
        match self.keys.get(&request.device_id) {
            Some(key) => {
                tracing::trace!("Postponing verification of {}", request.device_id);
                self.timers.reset_at(key, request.due);
            }
            None => {
                let key = self.timers.insert_at(request.device_id.clone(), request.due);
                self.keys.insert(request.device_id, key);
            }
        }
    }
}

impl<G: DeviceGateway> WriteQueue<G> {
    /// Reads the device back and re-issues writes for every field that does not match the desired state.
    #[tracing::instrument(name = "verify_device_state", skip(self), fields(%device_id))]
    async fn verify(&self, device_id: DeviceId) {
        if let Some(state) = self.state.desired().get_mut(&device_id) {
            state.verification_due = None;
        }

        let cache = self.state.caches().get(&device_id).cloned();
        let Some(cache) = cache else {
            tracing::warn!("No status cache registered for {}, skipping verification", device_id);
            return;
        };

        let Some(actual) = cache.refresh(&device_id).await else {
            tracing::warn!("Status of {} unavailable, skipping verification", device_id);
            return;
        };

        let Some(desired) = self.desired_state(&device_id) else {
            return;
        };

        let (in_flight, mismatches): (Vec<Write>, Vec<Write>) = desired
            .mismatches(&actual, self.state.gateway.target_resolution())
            .into_iter()
            .partition(|write| self.state.pending().contains(&device_id, write.field()));

        if !in_flight.is_empty() {
            tracing::debug!(
                "Writes to {} still pending, checking again later: {:?}",
                device_id,
                in_flight
            );
            self.schedule_verification(&device_id);
        }

        if mismatches.is_empty() {
            if in_flight.is_empty() {
                tracing::debug!("State of {} confirmed", device_id);
                if let Some(state) = self.state.desired().get_mut(&device_id) {
                    state.reconciliation_attempts = 0;
                }
            }
            return;
        }

        let attempts = {
            let mut desired = self.state.desired();
            let Some(state) = desired.get_mut(&device_id) else {
                return;
            };
            state.reconciliation_attempts = state.reconciliation_attempts.saturating_add(1);
            state.reconciliation_attempts
        };

        if attempts > self.state.config.max_reconciliation_attempts {
            tracing::error!(
                "State of {} still differs after {} reconciliation attempts, giving up: {:?}",
                device_id,
                self.state.config.max_reconciliation_attempts,
                mismatches
            );
            meter::increment("device_write_reconciliation_exhausted", &[("device_id", device_id.as_str())]);
            return;
        }

        for write in mismatches {
            tracing::warn!(
                "Device {} does not reflect write {} (reported {:?}), re-issuing",
                device_id,
                write,
                actual
            );
            meter::increment("device_write_reconciled", &[("device_id", device_id.as_str())]);
            self.insert(&device_id, write, WriteOrigin::Reconciliation);
        }
    }
}
