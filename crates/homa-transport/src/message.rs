//! Outgoing messages: packetization and the send cursor.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::byte_source::ByteSource;
use crate::config::MAX_DATA_PER_PACKET;
use crate::error::HomaError;
use crate::packet::{NetworkSink, Packet, Peer};
use crate::wire::{CommonHeader, DataHeader, PacketType};

/// The 4-tuple identifying one RPC's outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    pub src_port: u16,
    pub dst_port: u16,
    pub rpc_id: u64,
}

/// Initial grant parameters supplied at packetization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantParams {
    /// Bytes the sender may emit without waiting for a grant.
    pub unscheduled: u32,
}

/// Mutable send-cursor state, grouped so the owning caller's lock (modeled
/// here as [`Message`]'s own mutex) protects it as one unit.
pub(crate) struct Cursor {
    pub granted: u32,
    pub next_offset: u32,
    pub next_packet: usize,
    pub sched_priority: u8,
}

/// One outbound message: immutable payload split into packets, plus the
/// mutable cursor tracking how much of it has been sent and granted.
pub struct Message {
    pub addressing: Addressing,
    pub length: u32,
    pub unscheduled: u32,
    pub packets: Vec<Arc<Packet>>,
    /// This message's destination. Stored here (rather than threaded through
    /// every call) because the pacer worker drains arbitrary queued messages
    /// without any other way to reach their peer.
    pub peer: Arc<dyn Peer>,
    pub sink: Arc<dyn NetworkSink>,
    pub(crate) cursor: Mutex<Cursor>,
    in_pacer_queue: AtomicBool,
    /// Stands in for the owning RPC's socket lock: held for the duration of
    /// one `transmit_ready` call so user-context and pacer invocations never
    /// interleave packet submissions for the same message.
    pub(crate) send_lock: Mutex<()>,
}

impl Message {
    pub(crate) fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap()
    }

    /// Remaining unsent bytes — the pacer queue's ordering key.
    pub fn remaining_bytes(&self) -> u32 {
        self.length - self.cursor().next_offset
    }

    pub fn next_offset(&self) -> u32 {
        self.cursor().next_offset
    }

    pub fn granted(&self) -> u32 {
        self.cursor().granted
    }

    pub fn sched_priority(&self) -> u8 {
        self.cursor().sched_priority
    }

    pub fn set_sched_priority(&self, priority: u8) {
        self.cursor().sched_priority = priority;
    }

    /// True once every granted byte has been pushed, or the packet chain is
    /// exhausted — `transmit_ready` becomes a no-op and the pacer may drop
    /// this message from its queue.
    pub fn is_send_complete(&self) -> bool {
        let cursor = self.cursor();
        cursor.next_offset >= cursor.granted || cursor.next_packet >= self.packets.len()
    }

    pub(crate) fn mark_queued(&self) -> bool {
        // false if it was already queued -- enqueue is then a no-op.
        !self.in_pacer_queue.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_dequeued(&self) {
        self.in_pacer_queue.store(false, Ordering::Release);
    }

    pub fn is_queued(&self) -> bool {
        self.in_pacer_queue.load(Ordering::Acquire)
    }

    /// Rewind the send cursor to the beginning. Packet payloads and the
    /// packet chain itself are untouched.
    pub fn reset_cursor(&self) {
        let mut cursor = self.cursor();
        cursor.next_offset = 0;
        cursor.next_packet = 0;
        cursor.granted = self.unscheduled.min(self.length);
    }
}

/// Split `length` bytes pulled from `source` into a chain of data packets and
/// initialize a fresh send cursor over them.
///
/// Fails with [`HomaError::TooLarge`] if `length` exceeds
/// [`crate::config::MAX_MESSAGE_LENGTH`]; any allocation or source-read
/// failure releases the packets built so far before returning.
pub fn packetize<S: ByteSource>(
    source: &mut S,
    length: u32,
    addressing: Addressing,
    grant: GrantParams,
    peer: Arc<dyn Peer>,
    sink: Arc<dyn NetworkSink>,
) -> Result<Message, HomaError> {
    if length > crate::config::MAX_MESSAGE_LENGTH {
        return Err(HomaError::TooLarge {
            length,
            max: crate::config::MAX_MESSAGE_LENGTH,
        });
    }

    let cutoff_version = peer.current_cutoff_version();
    let unscheduled = grant.unscheduled.min(length);
    let common = CommonHeader {
        src_port: addressing.src_port,
        dst_port: addressing.dst_port,
        packet_type: PacketType::Data,
        rpc_id: addressing.rpc_id,
    };
    let num_packets = length.div_ceil(MAX_DATA_PER_PACKET).max(1) as usize;
    let mut packets = Vec::with_capacity(num_packets);

    let mut offset: u32 = 0;
    while offset < length || packets.is_empty() && length == 0 {
        let remaining = length - offset;
        let chunk_len = remaining.min(MAX_DATA_PER_PACKET);
        let payload: Bytes = source
            .read_at(offset, chunk_len)
            .map_err(|e| HomaError::SourceIo(Box::new(e)))?;
        if payload.len() as u32 != chunk_len {
            // Source under-delivered; treat as an I/O short-read.
            return Err(HomaError::SourceIo(Box::new(ShortRead {
                expected: chunk_len,
                got: payload.len() as u32,
            })));
        }
        let header = DataHeader {
            common,
            message_length: length,
            offset,
            unscheduled,
            cutoff_version,
            retransmit: false,
        };
        packets.push(Arc::new(Packet::new(header, payload)));
        offset += chunk_len;
        if length == 0 {
            break;
        }
    }

    let granted = unscheduled;

    Ok(Message {
        addressing,
        length,
        unscheduled,
        packets,
        peer,
        sink,
        cursor: Mutex::new(Cursor {
            granted,
            next_offset: 0,
            next_packet: 0,
            sched_priority: 0,
        }),
        in_pacer_queue: AtomicBool::new(false),
        send_lock: Mutex::new(()),
    })
}

/// Release a message's packet chain. The original source guarded this on a
/// signed `length < 0` check left over from an earlier era; `length` is
/// unsigned here, so that guard is vestigial and omitted — destruction is
/// always safe, including on a message that was never packetized.
pub fn destroy_message(message: Message) {
    drop(message);
}

#[derive(Debug, thiserror::Error)]
#[error("byte source returned {got} bytes, expected {expected}")]
struct ShortRead {
    expected: u32,
    got: u32,
}
