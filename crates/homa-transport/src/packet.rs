//! Packet buffers and the collaborator traits ([`Peer`], [`NetworkSink`])
//! this subsystem consumes but does not implement.
//!
//! A packet is shared via `Arc<Packet>`; handing a clone to a [`NetworkSink`]
//! models the kernel's "increment refcount before submit" without the manual
//! bookkeeping — [`Packet::is_shared`] is just `Arc::strong_count(..) > 1`,
//! true for as long as the sink (or anything else) still holds a clone.

use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex};

use crate::config::{SKB_RESERVE, SKB_SIZE};
use crate::error::Result;
use crate::wire::{CommonHeader, DataHeader};

/// A cached destination-routing handle, opaque to this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHandle(pub u64);

/// The peer this subsystem is sending to. Implemented by an external
/// collaborator; this crate only reads from it.
pub trait Peer: Send + Sync {
    /// Incremented by the peer whenever its priority thresholds change.
    fn current_cutoff_version(&self) -> u16;
    /// Priority (0..=7) assigned to unscheduled bytes of a message this size.
    fn unscheduled_priority_for(&self, message_length: u32) -> u8;
    /// Route used to reach this peer.
    fn destination_route(&self) -> RouteHandle;
}

/// The IP transmission primitive. Implemented by an external collaborator;
/// takes ownership of the packet reference per its own release contract.
pub trait NetworkSink: Send + Sync {
    fn submit_to_network(&self, packet: Arc<Packet>) -> Result<()>;

    /// Control packets carry no send cursor and are never shared or
    /// retransmitted, so they travel as their own small value rather than a
    /// [`Packet`].
    fn submit_control_to_network(&self, packet: ControlPacket) -> Result<()>;
}

/// A fully framed control packet (GRANT, RESEND, BUSY, CUTOFFS), always sent
/// at maximum priority and never re-submitted. `frame` is already encoded and
/// zero-padded to [`crate::wire::MAX_HEADER`] by [`ControlPacket::new`] — a
/// `NetworkSink` puts these bytes on the wire as-is.
#[derive(Debug, Clone)]
pub struct ControlPacket {
    pub common: CommonHeader,
    pub frame: Bytes,
    pub vlan_priority_tag: u8,
}

impl ControlPacket {
    pub fn new(common: CommonHeader, body: Bytes, vlan_priority_tag: u8) -> Self {
        let frame = crate::wire::WireControlPacket { common, body }
            .encode()
            .freeze();
        ControlPacket {
            common,
            frame,
            vlan_priority_tag,
        }
    }
}

/// Mutable packet state touched on every (re)transmission. `header` is the
/// actual on-wire common+data header (spec §4.1); `vlan_priority_tag` and
/// `route_handle` are link-layer/routing metadata that never appear in the
/// Homa wire format itself.
struct PacketState {
    header: DataHeader,
    vlan_priority_tag: u8,
    route_handle: Option<RouteHandle>,
    /// The full on-wire buffer: `SKB_RESERVE` zero-filled front reserve,
    /// then the encoded transport header, then the payload. Rebuilt by
    /// [`Packet::prepare_for_send`] on every (re)transmission, so any bytes a
    /// previous submission attempt pushed in front of the transport header
    /// (spec §4.3 step 5, "normalize framing") never survive into the next
    /// one — there is nothing to strip because nothing persists.
    frame: BytesMut,
}

/// One data packet: the common+data header written at packetization time
/// (spec §4.1), refreshed on every send, plus the payload bytes. `frame`
/// exposes the literal bytes a [`NetworkSink`] should put on the wire.
pub struct Packet {
    /// Byte offset of this packet's payload within the owning message.
    pub offset: u32,
    pub payload: Bytes,
    state: Mutex<PacketState>,
}

impl Packet {
    /// Build a packet buffer from its initial common+data header and
    /// payload. Allocates `SKB_SIZE` bytes of capacity with a `SKB_RESERVE`
    /// front reserve ahead of the transport header, per spec §4.1.
    pub fn new(header: DataHeader, payload: Bytes) -> Self {
        let offset = header.offset;
        let frame = build_frame(&header, &payload);
        Packet {
            offset,
            payload,
            state: Mutex::new(PacketState {
                header,
                vlan_priority_tag: 0,
                route_handle: None,
                frame,
            }),
        }
    }

    /// True while something besides the caller's own reference still holds
    /// this packet — i.e. a previous submission has not yet completed.
    pub fn is_shared(self_arc: &Arc<Packet>) -> bool {
        Arc::strong_count(self_arc) > 1
    }

    /// The current common+data header, exactly as it would be serialized.
    pub fn header(&self) -> DataHeader {
        self.state.lock().unwrap().header
    }

    pub fn cutoff_version(&self) -> u16 {
        self.state.lock().unwrap().header.cutoff_version
    }

    pub fn retransmit_flag(&self) -> bool {
        self.state.lock().unwrap().header.retransmit
    }

    pub fn vlan_priority_tag(&self) -> u8 {
        self.state.lock().unwrap().vlan_priority_tag
    }

    pub fn route_handle(&self) -> Option<RouteHandle> {
        self.state.lock().unwrap().route_handle
    }

    /// The fully framed bytes as they stand right now — front reserve,
    /// transport header, payload — exactly what a `NetworkSink` transmits.
    pub fn frame_bytes(&self) -> Bytes {
        self.state.lock().unwrap().frame.clone().freeze()
    }

    /// Refresh the header fields the transmit path owns before a (re)send
    /// and rebuild the frame buffer from those fields. This both refreshes
    /// `cutoff_version`/`retransmit` (spec §4.3 step 4) and normalizes the
    /// framing back to the transport header (step 5): since the frame is
    /// always rebuilt from `SKB_RESERVE` forward, nothing a previous
    /// submission wrote ahead of the transport header can leak through.
    pub fn prepare_for_send(&self, cutoff_version: u16, logical_priority: u8, retransmit: bool) {
        let mut state = self.state.lock().unwrap();
        state.header.cutoff_version = cutoff_version;
        state.header.retransmit = retransmit;
        state.vlan_priority_tag = crate::wire::vlan_tag_for(logical_priority);
        state.frame = build_frame(&state.header, &self.payload);
    }

    /// Fill in the destination route if this is the first time the packet is
    /// being sent (or the network layer cleared it after a prior error).
    pub fn ensure_route(&self, peer: &dyn Peer) -> RouteHandle {
        let mut state = self.state.lock().unwrap();
        if let Some(route) = state.route_handle {
            return route;
        }
        let route = peer.destination_route();
        state.route_handle = Some(route);
        route
    }

    /// Clear the cached route, e.g. after the network layer reports it stale.
    pub fn clear_route(&self) {
        self.state.lock().unwrap().route_handle = None;
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Packet")
            .field("offset", &self.offset)
            .field("payload_len", &self.payload.len())
            .field("header", &state.header)
            .field("vlan_priority_tag", &state.vlan_priority_tag)
            .field("route_handle", &state.route_handle)
            .finish()
    }
}

fn build_frame(header: &DataHeader, payload: &Bytes) -> BytesMut {
    let mut frame = BytesMut::with_capacity(SKB_SIZE);
    frame.resize(SKB_RESERVE, 0);
    header.encode(&mut frame);
    frame.extend_from_slice(payload);
    debug_assert!(frame.len() <= SKB_SIZE, "packet frame exceeds SKB_SIZE");
    frame
}
