//! Tunables and the rate constants derived from them.
//!
//! Tunables are read at configuration-change time, never per packet; the two
//! derived constants ([`DerivedRates`]) are recomputed together by
//! [`Config::on_configuration_changed`] so readers never observe a torn pair.

use std::sync::Mutex;

/// Largest payload carried by a single data packet.
pub const MAX_DATA_PER_PACKET: u32 = 1400;

/// Largest message this engine will packetize.
pub const MAX_MESSAGE_LENGTH: u32 = 1 << 20;

/// Packet buffer capacity allocated per packet (header room + payload).
pub const SKB_SIZE: usize = 2048;

/// Front reserve left before the transport headers in each packet buffer.
pub const SKB_RESERVE: usize = 64;

/// IPv4 header overhead counted into `bytes_on_wire`.
pub const IPV4_HEADER: u32 = 20;

/// VLAN tag overhead counted into `bytes_on_wire`.
pub const VLAN_HEADER: u32 = 4;

/// Ethernet framing overhead (preamble + FCS + inter-frame gap, approximated)
/// counted into `bytes_on_wire`.
pub const ETH_OVERHEAD: u32 = 24;

/// Tunables read at configuration-change time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    /// Bytes of unscheduled data a message may carry per round trip.
    pub rtt_bytes: u32,
    /// Link capacity in megabits/sec.
    pub link_mbps: u32,
    /// Maximum tolerated NIC queue depth, in nanoseconds of wire time.
    pub max_nic_queue_ns: u64,
    /// Below this many remaining bytes, never throttle a message.
    pub throttle_min_bytes: u32,
    /// CPU clock rate in kHz, used to convert nanoseconds to cycles.
    pub cpu_khz: u64,
    /// Disables pacer throttling entirely when set.
    pub dont_throttle: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            rtt_bytes: 10_000,
            link_mbps: 10_000,
            max_nic_queue_ns: 2_000,
            throttle_min_bytes: 1000,
            cpu_khz: 2_000_000,
            dont_throttle: false,
        }
    }
}

/// Rate constants derived once per configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedRates {
    /// `(8 * cpu_khz) / link_mbps` — CPU cycles to transmit one kilobyte.
    pub cycles_per_kbyte: u64,
    /// `(max_nic_queue_ns * cpu_khz) / 1_000_000` — NIC queue budget in cycles.
    pub max_nic_queue_cycles: u64,
}

impl DerivedRates {
    fn compute(t: &Tunables) -> Self {
        DerivedRates {
            cycles_per_kbyte: (8 * t.cpu_khz) / t.link_mbps as u64,
            max_nic_queue_cycles: (t.max_nic_queue_ns * t.cpu_khz) / 1_000_000,
        }
    }
}

/// Owns tunables and their derived rate constants together so a reader never
/// sees one recomputed without the other.
pub struct Config {
    inner: Mutex<ConfigInner>,
}

struct ConfigInner {
    tunables: Tunables,
    rates: DerivedRates,
}

impl Config {
    pub fn new(tunables: Tunables) -> Self {
        let rates = DerivedRates::compute(&tunables);
        Config {
            inner: Mutex::new(ConfigInner { tunables, rates }),
        }
    }

    /// Current tunables and derived rates, taken as a consistent snapshot.
    pub fn snapshot(&self) -> (Tunables, DerivedRates) {
        let inner = self.inner.lock().unwrap();
        (inner.tunables, inner.rates)
    }

    pub fn rates(&self) -> DerivedRates {
        self.inner.lock().unwrap().rates
    }

    pub fn tunables(&self) -> Tunables {
        self.inner.lock().unwrap().tunables
    }

    /// Recompute `cycles_per_kbyte` and `max_nic_queue_cycles` from a new set
    /// of tunables. Idempotent: calling twice with identical tunables leaves
    /// the derived rates unchanged.
    pub fn on_configuration_changed(&self, tunables: Tunables) {
        let rates = DerivedRates::compute(&tunables);
        let mut inner = self.inner.lock().unwrap();
        inner.tunables = tunables;
        inner.rates = rates;
        tracing::info!(
            link_mbps = tunables.link_mbps,
            max_nic_queue_ns = tunables.max_nic_queue_ns,
            cycles_per_kbyte = rates.cycles_per_kbyte,
            max_nic_queue_cycles = rates.max_nic_queue_cycles,
            "homa configuration changed"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Tunables::default())
    }
}
