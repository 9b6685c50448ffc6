//! Selective retransmission of a byte range, independent of the send cursor.

use crate::config::MAX_DATA_PER_PACKET;
use crate::context::HomaContext;
use crate::message::Message;
use crate::packet::Packet;
use crate::transmit::submit_packet;

/// Resend every packet overlapping `[start, end)` at `priority`, tagging each
/// with `retransmit = true`. Does not touch `next_offset`, `granted`, or any
/// other cursor state — a later `transmit_ready` resumes unaffected.
pub fn resend_range(message: &Message, ctx: &HomaContext, start: u32, end: u32, priority: u8) {
    for packet in &message.packets {
        if packet.offset + MAX_DATA_PER_PACKET <= start {
            continue;
        }
        if packet.offset >= end {
            break;
        }
        if Packet::is_shared(packet) {
            continue;
        }
        submit_packet(message, ctx, packet, priority, true);
    }
}
