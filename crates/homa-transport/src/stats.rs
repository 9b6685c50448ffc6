//! Lock-free counters for the outgoing-message engine, exposed as a
//! serializable snapshot the way the rest of this codebase reports link
//! statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters for one [`crate::HomaContext`].
#[derive(Debug, Default)]
pub struct Stats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    data_xmit_errors: AtomicU64,
    control_xmit_errors: AtomicU64,
    retransmissions_sent: AtomicU64,
    packets_throttled: AtomicU64,
    packets_skipped_shared: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_data_sent(&self, payload_len: u32) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn record_data_xmit_error(&self) {
        self.data_xmit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_xmit_error(&self) {
        self.control_xmit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retransmission(&self) {
        self.retransmissions_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.packets_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_shared(&self) {
        self.packets_skipped_shared.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot. `pacer_queue_depth` is supplied by the
    /// caller since it lives on the queue, not on this struct.
    pub fn snapshot(&self, pacer_queue_depth: usize) -> StatsSnapshot {
        StatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            data_xmit_errors: self.data_xmit_errors.load(Ordering::Relaxed),
            control_xmit_errors: self.control_xmit_errors.load(Ordering::Relaxed),
            retransmissions_sent: self.retransmissions_sent.load(Ordering::Relaxed),
            messages_throttled: self.packets_throttled.load(Ordering::Relaxed),
            packets_skipped_shared: self.packets_skipped_shared.load(Ordering::Relaxed),
            pacer_queue_depth,
        }
    }
}

/// A serializable point-in-time view of [`Stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub data_xmit_errors: u64,
    pub control_xmit_errors: u64,
    pub retransmissions_sent: u64,
    pub messages_throttled: u64,
    pub packets_skipped_shared: u64,
    pub pacer_queue_depth: usize,
}
