mod config;
mod desired;
mod dispatcher;
mod pending;
mod verification;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use infrastructure::{TraceContext, meter};
use tokio::sync::{Notify, mpsc};

use crate::{
    core::time::DateTime,
    device::{DeviceId, Write},
    gateway::DeviceGateway,
    status_cache::StatusCache,
};

pub use config::WriteQueueConfig;
pub use desired::DesiredState;

use dispatcher::Dispatcher;
use pending::{PendingWrites, QueueItem};
use verification::{VerificationRequest, VerificationScheduler};

/// Fire-and-forget write path to the remote API.
///
/// Writes are coalesced per device and field, sent one at a time with a global minimum interval, retried on
/// failure and verified against a fresh status read some time after the last write to a device.
pub struct WriteQueue<G> {
    state: Arc<QueueState<G>>,
}

impl<G> Clone for WriteQueue<G> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Drives dispatch and verification of a [`WriteQueue`]. Nothing is sent before `run` is polled.
pub struct WriteQueueRunner<G> {
    queue: WriteQueue<G>,
    verification_rx: mpsc::UnboundedReceiver<VerificationRequest>,
}

struct QueueState<G> {
    gateway: Arc<G>,
    config: WriteQueueConfig,
    pending: Mutex<PendingWrites>,
    desired: Mutex<HashMap<DeviceId, DesiredState>>,
    caches: Mutex<HashMap<DeviceId, StatusCache<G>>>,
    dispatch_wakeup: Notify,
    verification_tx: mpsc::UnboundedSender<VerificationRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOrigin {
    Consumer,
    Reconciliation,
}

impl<G: DeviceGateway> WriteQueue<G> {
    pub fn new(gateway: Arc<G>, config: WriteQueueConfig) -> (Self, WriteQueueRunner<G>) {
        let (verification_tx, verification_rx) = mpsc::unbounded_channel();

        let queue = Self {
            state: Arc::new(QueueState {
                gateway,
                config,
                pending: Mutex::new(PendingWrites::default()),
                desired: Mutex::new(HashMap::new()),
                caches: Mutex::new(HashMap::new()),
                dispatch_wakeup: Notify::new(),
                verification_tx,
            }),
        };

        let runner = WriteQueueRunner {
            queue: queue.clone(),
            verification_rx,
        };

        (queue, runner)
    }

    pub fn enqueue(&self, device_id: &DeviceId, write: Write) {
        self.insert(device_id, write, WriteOrigin::Consumer);
    }

    /// Binds the cache used to read back the device state during verification.
    pub fn register_cache(&self, device_id: &DeviceId, cache: StatusCache<G>) {
        tracing::debug!("Registering status cache for {}", device_id);
        self.state.caches().insert(device_id.clone(), cache);
    }

    pub fn desired_state(&self, device_id: &DeviceId) -> Option<DesiredState> {
        self.state.desired().get(device_id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending().len()
    }

    fn insert(&self, device_id: &DeviceId, write: Write, origin: WriteOrigin) {
        let item = QueueItem::new(device_id.clone(), write, TraceContext::current_correlation_id());

        let pending_count = {
            let mut pending = self.state.pending();
            if let Some(replaced) = pending.insert(item) {
                tracing::debug!(
                    "Pending write {} of {} superseded by {} before dispatch",
                    replaced.write,
                    device_id,
                    write
                );
            }
            pending.len()
        };

        {
            let mut desired = self.state.desired();
            let state = desired.entry(device_id.clone()).or_default();
            state.apply(write);
            if origin == WriteOrigin::Consumer {
                state.reconciliation_attempts = 0;
            }
        }

        tracing::info!(?origin, "Enqueued write {} for {}", write, device_id);
        meter::set("device_write_pending", pending_count as f64, &[]);

        self.schedule_verification(device_id);
        self.state.dispatch_wakeup.notify_one();
    }

    /// (Re)arms the verification of the device at `now + verification_delay`.
    fn schedule_verification(&self, device_id: &DeviceId) {
        let delay = self.state.config.verification_delay;

        if let Some(state) = self.state.desired().get_mut(device_id) {
            state.verification_due = Some(DateTime::now() + delay);
        }

        let request = VerificationRequest {
            device_id: device_id.clone(),
            due: tokio::time::Instant::now() + std::time::Duration::from(delay),
        };

        if self.state.verification_tx.send(request).is_err() {
            tracing::warn!(
                "Verification scheduler is not running, state of {} will not be verified",
                device_id
            );
        }
    }
}

impl<G> QueueState<G> {
    fn pending(&self) -> MutexGuard<'_, PendingWrites> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn desired(&self) -> MutexGuard<'_, HashMap<DeviceId, DesiredState>> {
        self.desired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn caches(&self) -> MutexGuard<'_, HashMap<DeviceId, StatusCache<G>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<G: DeviceGateway> WriteQueueRunner<G> {
    pub async fn run(self) {
        tracing::info!(
            interval = %self.queue.state.config.interval,
            max_retries = self.queue.state.config.max_retries,
            verification_delay = %self.queue.state.config.verification_delay,
            "Starting write queue"
        );

        let dispatcher = Dispatcher::new(self.queue.clone());
        let scheduler = VerificationScheduler::new(self.queue, self.verification_rx);

        tokio::join!(dispatcher.run(), scheduler.run());
    }
}
