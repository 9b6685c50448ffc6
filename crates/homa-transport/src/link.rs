//! Link-idle-time tracking: a single lock-free integer estimating how far in
//! the future the NIC will have drained everything submitted to it so far.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{DerivedRates, ETH_OVERHEAD, IPV4_HEADER, VLAN_HEADER};

/// Monotonic high-resolution cycle source. Abstracted so tests can drive the
/// pacer and transmit path with a deterministic clock.
pub trait CycleClock: Send + Sync {
    fn now_cycles(&self) -> u64;
}

/// Real clock backed by `quanta`'s raw TSC-derived counter.
pub struct QuantaClock {
    clock: quanta::Clock,
}

impl QuantaClock {
    pub fn new() -> Self {
        QuantaClock {
            clock: quanta::Clock::new(),
        }
    }
}

impl Default for QuantaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock for QuantaClock {
    fn now_cycles(&self) -> u64 {
        self.clock.raw()
    }
}

/// A clock whose value is set directly. Used in tests to reproduce the
/// concrete pacing scenarios.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(initial: u64) -> Self {
        ManualClock {
            now: AtomicU64::new(initial),
        }
    }

    pub fn set(&self, value: u64) {
        self.now.store(value, Ordering::Relaxed);
    }
}

impl CycleClock for ManualClock {
    fn now_cycles(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Estimate, in CPU cycles, of when the NIC will next be idle. Readers and
/// writers never block each other — updates are a compare-and-swap loop.
#[derive(Default)]
pub struct LinkIdleTime {
    value: AtomicU64,
}

impl LinkIdleTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Called after every successful submission. Advances `link_idle_time` by
    /// the wire-time cost of this packet, folding in whatever concurrent
    /// writers already queued up.
    pub fn update(&self, bytes_payload: u32, clock: &dyn CycleClock, rates: DerivedRates) {
        let bytes_on_wire = bytes_payload + IPV4_HEADER + VLAN_HEADER + ETH_OVERHEAD;
        let packet_cycles = (bytes_on_wire as u64 * rates.cycles_per_kbyte) / 1000;

        loop {
            let now = clock.now_cycles();
            let old = self.value.load(Ordering::Acquire);
            let new = if old < now {
                now + packet_cycles
            } else {
                old + packet_cycles
            };
            if self
                .value
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_advances_from_clock_when_idle_already_past() {
        let link_idle = LinkIdleTime::new();
        link_idle.value.store(10_000, Ordering::Relaxed);
        let clock = ManualClock::new(5_000);
        let rates = DerivedRates {
            cycles_per_kbyte: 1000,
            max_nic_queue_cycles: 0,
        };
        // bytes_on_wire = 1000 + 20 + 4 + 24 = 1048; packet_cycles = 1048
        link_idle.update(1000, &clock, rates);
        assert_eq!(link_idle.get(), 10_000 + 1048);
    }

    #[test]
    fn update_jumps_to_clock_when_idle_time_already_passed() {
        let link_idle = LinkIdleTime::new();
        link_idle.value.store(1_000, Ordering::Relaxed);
        let clock = ManualClock::new(5_000);
        let rates = DerivedRates {
            cycles_per_kbyte: 1000,
            max_nic_queue_cycles: 0,
        };
        link_idle.update(1000, &clock, rates);
        assert_eq!(link_idle.get(), 5_000 + 1048);
    }

    #[test]
    fn link_idle_time_is_monotone_non_decreasing_under_repeated_updates() {
        let link_idle = LinkIdleTime::new();
        let clock = ManualClock::new(0);
        let rates = DerivedRates {
            cycles_per_kbyte: 500,
            max_nic_queue_cycles: 0,
        };
        let mut last = link_idle.get();
        for i in 0..20 {
            clock.set(i * 10);
            link_idle.update(100, &clock, rates);
            let now = link_idle.get();
            assert!(now >= last);
            last = now;
        }
    }
}
