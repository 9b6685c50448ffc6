//! The Transmit Path: push granted bytes onto the wire, or hand the message
//! to the pacer when the NIC budget is exhausted.

use std::sync::Arc;

use crate::config::MAX_DATA_PER_PACKET;
use crate::context::HomaContext;
use crate::message::{Addressing, Message};
use crate::packet::{ControlPacket, Packet};
use crate::wire::{CommonHeader, PacketType};

/// Maximum logical priority; used for every control packet.
const CONTROL_PRIORITY: u8 = 7;

/// Blocking entry point: acquires `message`'s send lock and drains as much of
/// the grant as the NIC budget allows. Callers (user context or a grant/ack
/// handler) are expected to already hold the owning RPC's socket lock; the
/// inner lock here only serializes against the pacer worker.
pub fn transmit_ready(message: &Arc<Message>, ctx: &HomaContext) {
    let _guard = message.send_lock.lock().unwrap();
    run_transmit_loop(message, ctx);
}

/// Non-blocking entry point used by the pacer worker. Returns `false`
/// (SOCKET_BUSY) if a user-context caller currently holds the send lock,
/// leaving the message queued for the next burst.
pub fn try_transmit_ready(message: &Arc<Message>, ctx: &HomaContext) -> bool {
    match message.send_lock.try_lock() {
        Ok(_guard) => {
            run_transmit_loop(message, ctx);
            true
        }
        Err(_) => false,
    }
}

fn run_transmit_loop(message: &Arc<Message>, ctx: &HomaContext) {
    let rates = ctx.config.rates();
    let tunables = ctx.config.tunables();

    loop {
        let (next_offset, next_packet, unscheduled, sched_priority) = {
            let cursor = message.cursor();
            if !(cursor.next_offset < cursor.granted && cursor.next_packet < message.packets.len())
            {
                return;
            }
            (
                cursor.next_offset,
                cursor.next_packet,
                message.unscheduled,
                cursor.sched_priority,
            )
        };

        let remaining = message.length.saturating_sub(next_offset);
        if !tunables.dont_throttle
            && remaining > tunables.throttle_min_bytes
            && ctx.clock.now_cycles() + rates.max_nic_queue_cycles < ctx.link_idle.get()
        {
            ctx.enqueue_throttled(Arc::clone(message));
            ctx.stats.record_throttled();
            return;
        }

        let priority = if next_offset < unscheduled {
            message.peer.unscheduled_priority_for(message.length)
        } else {
            sched_priority
        };

        let packet = &message.packets[next_packet];
        if Packet::is_shared(packet) {
            // Preserved exactly: the cursor advances past a temporarily
            // shared packet without transmitting it, relying on the
            // receiver's later resend_range to recover the gap.
            ctx.stats.record_skipped_shared();
        } else {
            submit_packet(message, ctx, packet, priority, false);
        }

        let mut cursor = message.cursor();
        cursor.next_offset += MAX_DATA_PER_PACKET;
        cursor.next_packet += 1;
    }
}

/// Shared per-packet submit subroutine used by both the transmit path and
/// the resender: refresh headers, acquire a route, hand off to the sink, and
/// account for the bytes put on the wire.
pub(crate) fn submit_packet(
    message: &Message,
    ctx: &HomaContext,
    packet: &Arc<Packet>,
    logical_priority: u8,
    retransmit: bool,
) {
    packet.prepare_for_send(
        message.peer.current_cutoff_version(),
        logical_priority,
        retransmit,
    );
    packet.ensure_route(message.peer.as_ref());

    let payload_len = packet.payload.len() as u32;
    match message.sink.submit_to_network(Arc::clone(packet)) {
        Ok(()) => {
            tracing::trace!(
                offset = packet.offset,
                priority = logical_priority,
                retransmit,
                payload_len,
                "data packet submitted"
            );
            ctx.stats.record_data_sent(payload_len);
            if retransmit {
                ctx.stats.record_retransmission();
            }
            ctx.link_idle.update(payload_len, ctx.clock.as_ref(), ctx.config.rates());
        }
        Err(error) => {
            // Not retried here; the receive side will time out and drive a
            // resend_range if this loss matters.
            tracing::warn!(offset = packet.offset, %error, "data packet submission failed");
            debug_assert!(
                !Packet::is_shared(packet),
                "sink did not release packet {} after a failed submission",
                packet.offset
            );
            ctx.stats.record_data_xmit_error();
        }
    }
}

/// Send a control packet (GRANT, RESEND, BUSY, CUTOFFS) at maximum priority,
/// bypassing the pacer and the NIC budget entirely.
pub fn transmit_control(
    ctx: &HomaContext,
    sink: &dyn crate::packet::NetworkSink,
    addressing: Addressing,
    packet_type: PacketType,
    body: bytes::Bytes,
) -> crate::error::Result<()> {
    let common = CommonHeader {
        src_port: addressing.src_port,
        dst_port: addressing.dst_port,
        packet_type,
        rpc_id: addressing.rpc_id,
    };
    let result = sink.submit_control_to_network(ControlPacket::new(
        common,
        body,
        crate::wire::vlan_tag_for(CONTROL_PRIORITY),
    ));
    match &result {
        Ok(()) => {
            tracing::trace!(
                rpc_id = addressing.rpc_id,
                packet_type = ?packet_type,
                "control packet submitted"
            );
        }
        Err(error) => {
            tracing::warn!(
                rpc_id = addressing.rpc_id,
                packet_type = ?packet_type,
                %error,
                "control packet submission failed"
            );
            ctx.stats.record_control_xmit_error();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;
    use crate::config::Config;
    use crate::context::HomaContext;
    use crate::link::ManualClock;
    use crate::message::test_support::{addressing, FixedPeer, HoldingSink, RecordingSink};
    use crate::message::{packetize, GrantParams};

    fn ctx_with_clock(now: u64) -> Arc<HomaContext> {
        HomaContext::with_clock(Config::default(), Box::new(ManualClock::new(now)))
    }

    #[test]
    fn transmit_ready_sends_at_unscheduled_then_scheduled_priority() {
        let ctx = ctx_with_clock(0);
        let mut source = SliceSource::new(vec![0u8; 6000]);
        let peer = Arc::new(FixedPeer {
            cutoff_version: 0,
            unscheduled_priority: 6,
        });
        let sink = Arc::new(RecordingSink::default());
        let msg = Arc::new(
            packetize(
                &mut source,
                6000,
                addressing(),
                GrantParams { unscheduled: 2000 },
                peer,
                Arc::clone(&sink) as Arc<dyn crate::packet::NetworkSink>,
            )
            .unwrap(),
        );
        msg.cursor().granted = 5000;
        msg.set_sched_priority(2);

        transmit_ready(&msg, &ctx);

        let submitted = sink.submitted.lock().unwrap();
        let offsets: Vec<u32> = submitted.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 1400, 2800, 4200]);
        assert_eq!(submitted[0].vlan_priority_tag(), crate::wire::vlan_tag_for(6));
        assert_eq!(submitted[1].vlan_priority_tag(), crate::wire::vlan_tag_for(6));
        assert_eq!(submitted[2].vlan_priority_tag(), crate::wire::vlan_tag_for(2));
        assert_eq!(submitted[3].vlan_priority_tag(), crate::wire::vlan_tag_for(2));
        assert_eq!(msg.next_offset(), 5600);
    }

    #[test]
    fn transmit_ready_throttles_once_nic_budget_is_exhausted() {
        // max_nic_queue_cycles = (1_000_000ns * 3000kHz) / 1_000_000 = 3000.
        let config = Config::new(crate::config::Tunables {
            throttle_min_bytes: 200,
            cpu_khz: 3000,
            link_mbps: 8,
            max_nic_queue_ns: 1_000_000,
            ..crate::config::Tunables::default()
        });
        let ctx = HomaContext::with_clock(config, Box::new(ManualClock::new(10_000)));
        assert_eq!(ctx.config.rates().max_nic_queue_cycles, 3000);

        let mut source = SliceSource::new(vec![0u8; 6000]);
        let peer = Arc::new(FixedPeer {
            cutoff_version: 0,
            unscheduled_priority: 0,
        });
        let sink = Arc::new(RecordingSink::default());
        let msg = Arc::new(
            packetize(
                &mut source,
                6000,
                addressing(),
                GrantParams { unscheduled: 6000 },
                peer,
                Arc::clone(&sink) as Arc<dyn crate::packet::NetworkSink>,
            )
            .unwrap(),
        );

        // Clock held fixed at 10_000: the first packet clears the budget check
        // against a still-zero link_idle_time, but its own update() pushes
        // link_idle_time far enough ahead that the second packet throttles.
        transmit_ready(&msg, &ctx);

        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
        assert!(msg.is_queued());
        assert_eq!(msg.next_offset(), 1400);
    }

    #[test]
    fn packet_is_skipped_but_cursor_still_advances_when_shared() {
        let ctx = ctx_with_clock(0);
        let mut source = SliceSource::new(vec![0u8; 1400]);
        let peer = Arc::new(FixedPeer {
            cutoff_version: 0,
            unscheduled_priority: 0,
        });
        let sink = Arc::new(HoldingSink::default());
        let msg = Arc::new(
            packetize(
                &mut source,
                1400,
                addressing(),
                GrantParams { unscheduled: 1400 },
                peer,
                Arc::clone(&sink) as Arc<dyn crate::packet::NetworkSink>,
            )
            .unwrap(),
        );
        // Hold an extra clone so the single packet looks "shared" up front.
        let _extra = Arc::clone(&msg.packets[0]);

        transmit_ready(&msg, &ctx);

        assert!(sink.held.lock().unwrap().is_empty());
        assert_eq!(msg.next_offset(), 1400);
        assert!(msg.is_send_complete());
    }
}
