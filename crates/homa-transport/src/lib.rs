//! # homa-transport
//!
//! The outgoing-message half of a Homa transport implementation: turns an
//! application message into wire-format data packets and pushes them through
//! a bandwidth-constrained link under Homa's priority and scheduling rules.
//!
//! ## Crate structure
//!
//! - [`wire`] — packet header serialization, VLAN priority mapping
//! - [`config`] — tunables and the rate constants derived from them
//! - [`error`] — [`error::HomaError`], this crate's error type
//! - [`byte_source`] — abstraction over where packet payloads come from
//! - [`packet`] — packet buffers and the `Peer`/`NetworkSink` collaborator traits
//! - [`message`] — packetization and the per-message send cursor
//! - [`link`] — the lock-free link-idle-time estimate
//! - [`pacer`] — the throttled-message queue and its worker thread
//! - [`context`] — process-wide state shared across messages
//! - [`transmit`] — the transmit path and control-packet transmission
//! - [`resend`] — selective range retransmission
//! - [`stats`] — aggregate counters, exposed as a serializable snapshot

pub mod byte_source;
pub mod config;
pub mod context;
pub mod error;
pub mod link;
pub mod message;
pub mod pacer;
pub mod packet;
pub mod resend;
pub mod stats;
pub mod transmit;
pub mod wire;
