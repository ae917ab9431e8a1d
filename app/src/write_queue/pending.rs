use std::collections::HashMap;

use tokio::time::Instant;

use crate::device::{DeviceId, Write, WriteField};

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub device_id: DeviceId,
    pub write: Write,
    pub enqueued_at: Instant,
    pub correlation_id: Option<String>,
    seq: u64,
}

impl QueueItem {
    pub fn new(device_id: DeviceId, write: Write, correlation_id: Option<String>) -> Self {
        Self {
            device_id,
            write,
            enqueued_at: Instant::now(),
            correlation_id,
            seq: 0,
        }
    }

    fn order_key(&self) -> (Instant, u64) {
        (self.enqueued_at, self.seq)
    }
}

/// Writes waiting for dispatch, at most one per device and field. A newer write for the same key replaces
/// the older one.
#[derive(Debug, Default)]
pub struct PendingWrites {
    items: HashMap<(DeviceId, WriteField), QueueItem>,
    next_seq: u64,
}

impl PendingWrites {
    /// Returns the write that was superseded, if any.
    pub fn insert(&mut self, mut item: QueueItem) -> Option<QueueItem> {
        item.seq = self.next_seq;
        self.next_seq += 1;

        let key = (item.device_id.clone(), item.write.field());
        self.items.insert(key, item)
    }

    /// Removes and returns the write enqueued first.
    pub fn pop_oldest(&mut self) -> Option<QueueItem> {
        let key = self
            .items
            .iter()
            .min_by_key(|(_, item)| item.order_key())
            .map(|(key, _)| key.clone())?;

        self.items.remove(&key)
    }

    pub fn contains(&self, device_id: &DeviceId, field: WriteField) -> bool {
        self.items.contains_key(&(device_id.clone(), field))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
