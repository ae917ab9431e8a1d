mod config;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    FutureExt as _,
    future::{BoxFuture, Shared},
};
use infrastructure::meter;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    core::{resilience::ExponentialBackoff, time::DateTime},
    device::{DeviceId, DeviceStatus},
    gateway::{DeviceGateway, GatewayError},
};

pub use config::StatusCacheConfig;

type InFlightFetch = Shared<BoxFuture<'static, Option<DeviceStatus>>>;

/// Read-through cache of the latest device status, one entry per device.
///
/// Concurrent readers of the same device share a single outstanding fetch. Failed fetches keep serving the
/// last good value and push its expiry out with exponential backoff, so a failing remote is not hammered.
pub struct StatusCache<G> {
    inner: Arc<CacheInner<G>>,
}

impl<G> Clone for StatusCache<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct CacheInner<G> {
    gateway: Arc<G>,
    config: StatusCacheConfig,
    entries: Mutex<HashMap<DeviceId, CacheEntry>>,
}

#[derive(Default)]
struct CacheEntry {
    value: Option<DeviceStatus>,
    fetched_at: Option<Instant>,
    expires_at: Option<Instant>,
    consecutive_errors: u32,
    last_error: Option<FetchFailure>,
    in_flight: Option<InFlightFetch>,
}

#[derive(Debug, Clone)]
struct FetchFailure {
    code: Option<u16>,
    message: String,
    at: DateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorState {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub consecutive_count: u32,
    pub last_failure: Option<DateTime>,
}

impl CacheEntry {
    fn fresh_value(&self, now: Instant) -> Option<&DeviceStatus> {
        match (&self.value, self.expires_at) {
            (Some(value), Some(expires_at)) if now < expires_at => Some(value),
            _ => None,
        }
    }
}

impl<G: DeviceGateway> StatusCache<G> {
    pub fn new(gateway: Arc<G>, config: StatusCacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                gateway,
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Latest status of the device, fetched from the remote API when the cached one expired.
    /// `None` only when nothing was ever fetched successfully.
    pub async fn get(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        let fetch = {
            let mut entries = self.inner.entries();
            let entry = entries.entry(device_id.clone()).or_default();

            if let Some(value) = entry.fresh_value(Instant::now()) {
                tracing::trace!("Serving cached status of {}", device_id);
                return Some(value.clone());
            }

            self.join_or_start_fetch(entry, device_id)
        };

        fetch.await
    }

    /// Bypasses the TTL and reads through to the remote API. Still joins a fetch that is already running.
    pub async fn refresh(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        let fetch = {
            let mut entries = self.inner.entries();
            let entry = entries.entry(device_id.clone()).or_default();
            entry.expires_at = None;

            self.join_or_start_fetch(entry, device_id)
        };

        fetch.await
    }

    /// Last stored value, without fetching and regardless of expiry.
    pub fn cached(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        self.inner.entries().get(device_id).and_then(|e| e.value.clone())
    }

    pub fn error_state(&self, device_id: &DeviceId) -> ErrorState {
        let entries = self.inner.entries();
        let Some(entry) = entries.get(device_id) else {
            return ErrorState::default();
        };

        ErrorState {
            code: entry.last_error.as_ref().and_then(|e| e.code),
            message: entry.last_error.as_ref().map(|e| e.message.clone()),
            consecutive_count: entry.consecutive_errors,
            last_failure: entry.last_error.as_ref().map(|e| e.at),
        }
    }

    fn join_or_start_fetch(&self, entry: &mut CacheEntry, device_id: &DeviceId) -> InFlightFetch {
        if let Some(in_flight) = &entry.in_flight {
            tracing::trace!("Joining in-flight status fetch of {}", device_id);
            return in_flight.clone();
        }

        let inner = self.inner.clone();
        let id = device_id.clone();
        let fetch = async move { inner.fetch(id).await }.boxed().shared();

        entry.in_flight = Some(fetch.clone());
        fetch
    }
}

impl<G: DeviceGateway> CacheInner<G> {
    fn entries(&self) -> MutexGuard<'_, HashMap<DeviceId, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[tracing::instrument(name = "fetch_device_status", skip(self), fields(%device_id))]
    async fn fetch(self: Arc<Self>, device_id: DeviceId) -> Option<DeviceStatus> {
        let result = self.gateway.fetch_status(&device_id).await;
        let now = Instant::now();

        let mut entries = self.entries();
        let entry = entries.entry(device_id.clone()).or_default();
        entry.in_flight = None;

        match result {
            Ok(status) => {
                if entry.consecutive_errors > 0 {
                    tracing::info!(
                        "Status fetch of {} recovered after {} failed attempts",
                        device_id,
                        entry.consecutive_errors
                    );
                    meter::set("device_status_consecutive_errors", 0.0, &[("device_id", device_id.as_str())]);
                }

                entry.value = Some(status.clone());
                entry.fetched_at = Some(now);
                entry.expires_at = Some(now + std::time::Duration::from(self.config.ttl));
                entry.consecutive_errors = 0;
                entry.last_error = None;

                Some(status)
            }
            Err(error) => {
                entry.consecutive_errors = entry.consecutive_errors.saturating_add(1);
                self.record_failure(&device_id, entry, &error);

                let value = entry.value.clone()?;

                let backoff = ExponentialBackoff::bounded(
                    self.config.ttl,
                    self.config.backoff_floor,
                    self.config.backoff_ceiling,
                )
                .with_attempts(entry.consecutive_errors);
                let stale_for = backoff.next_delay();
                entry.expires_at = Some(now + std::time::Duration::from(stale_for));

                tracing::debug!(
                    "Serving stale status of {} fetched {:?} ago for another {}",
                    device_id,
                    entry.fetched_at.map(|at| now - at),
                    stale_for
                );

                Some(value)
            }
        }
    }

    fn record_failure(&self, device_id: &DeviceId, entry: &mut CacheEntry, error: &GatewayError) {
        tracing::warn!(
            code = ?error.code(),
            consecutive_errors = entry.consecutive_errors,
            "Error fetching status of {}: {}",
            device_id,
            error
        );

        entry.last_error = Some(FetchFailure {
            code: error.code(),
            message: error.to_string(),
            at: DateTime::now(),
        });

        meter::increment("device_status_fetch_errors", &[("device_id", device_id.as_str())]);
        meter::set(
            "device_status_consecutive_errors",
            entry.consecutive_errors as f64,
            &[("device_id", device_id.as_str())],
        );
    }
}
