//! Process-wide state shared by every message this engine sends: the single
//! link-idle estimate, configuration, counters, and the throttled queue.
//!
//! Deliberately excludes anything per-message or per-peer (destination
//! routing, the network sink) — those live on [`crate::message::Message`]
//! itself, since the pacer worker drains arbitrary queued messages and needs
//! to reach each one's own destination, not a single global one.

use std::sync::Arc;

use crate::config::Config;
use crate::link::{CycleClock, LinkIdleTime, QuantaClock};
use crate::message::Message;
use crate::pacer::{PacerWaker, ThrottledQueue};
use crate::stats::{Stats, StatsSnapshot};

/// Shared state handed to the transmit path and the pacer worker.
pub struct HomaContext {
    pub config: Config,
    pub link_idle: LinkIdleTime,
    pub clock: Box<dyn CycleClock>,
    pub stats: Stats,
    pub pacer_queue: ThrottledQueue,
    pub(crate) pacer_wake: PacerWaker,
}

impl HomaContext {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(HomaContext {
            config,
            link_idle: LinkIdleTime::new(),
            clock: Box::new(QuantaClock::new()),
            stats: Stats::new(),
            pacer_queue: ThrottledQueue::new(),
            pacer_wake: PacerWaker::new(),
        })
    }

    /// Build a context around an explicit clock, for deterministic tests.
    pub fn with_clock(config: Config, clock: Box<dyn CycleClock>) -> Arc<Self> {
        Arc::new(HomaContext {
            config,
            link_idle: LinkIdleTime::new(),
            clock,
            stats: Stats::new(),
            pacer_queue: ThrottledQueue::new(),
            pacer_wake: PacerWaker::new(),
        })
    }

    /// The subsystem's `enqueue_throttled` surface: link `message` into the
    /// pacer queue (a no-op if already linked) and wake the pacer worker, if
    /// one is running, so it doesn't sit parked on an empty channel while
    /// throttled work is waiting.
    pub fn enqueue_throttled(&self, message: Arc<Message>) {
        if self.pacer_queue.enqueue(message) {
            self.pacer_wake.notify();
        }
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.pacer_queue.len())
    }
}

impl Default for HomaContext {
    fn default() -> Self {
        HomaContext {
            config: Config::default(),
            link_idle: LinkIdleTime::new(),
            clock: Box::new(QuantaClock::new()),
            stats: Stats::new(),
            pacer_queue: ThrottledQueue::new(),
            pacer_wake: PacerWaker::new(),
        }
    }
}
