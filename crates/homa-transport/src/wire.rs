//! # Homa Wire Format
//!
//! Fixed-size binary headers, all multi-byte fields in network byte order.
//!
//! ## Common header (prefix of every packet, 15 bytes)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          src_port            |          dst_port            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            unused            |     type      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            rpc_id                            |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ## Data header: common header followed by 16 more bytes
//!
//! `{message_length: u32, offset: u32, unscheduled: u32, cutoff_version: u16,
//! retransmit: u8, pad: u8}`, then up to `MAX_DATA_PER_PACKET` payload bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maps logical priority (0..=7) to the on-wire VLAN priority code.
///
/// Legacy ordering: wire code 0 is not the lowest priority, so logical 0 and
/// logical 1 are swapped; everything above is identity.
pub const VLAN_PRIORITY_TABLE: [u8; 8] = [1, 0, 2, 3, 4, 5, 6, 7];

/// Translate a logical priority into the VLAN priority code placed on the wire.
#[inline]
pub fn vlan_tag_for(logical_priority: u8) -> u8 {
    VLAN_PRIORITY_TABLE[logical_priority as usize & 0x07]
}

/// Packet type occupying the `type` byte of the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0x10,
    Grant = 0x11,
    Resend = 0x12,
    Busy = 0x13,
    Cutoffs = 0x14,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x10 => Some(PacketType::Data),
            0x11 => Some(PacketType::Grant),
            0x12 => Some(PacketType::Resend),
            0x13 => Some(PacketType::Busy),
            0x14 => Some(PacketType::Cutoffs),
            _ => None,
        }
    }
}

/// Fixed prefix of every packet on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub packet_type: PacketType,
    pub rpc_id: u64,
}

impl CommonHeader {
    pub const LEN: usize = 2 + 2 + 2 + 1 + 8;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u16(0); // unused
        buf.put_u8(self.packet_type as u8);
        buf.put_u64(self.rpc_id);
    }

    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::LEN {
            return None;
        }
        let src_port = buf.get_u16();
        let dst_port = buf.get_u16();
        let _unused = buf.get_u16();
        let packet_type = PacketType::from_byte(buf.get_u8())?;
        let rpc_id = buf.get_u64();
        Some(CommonHeader {
            src_port,
            dst_port,
            packet_type,
            rpc_id,
        })
    }
}

/// Header carried by every DATA packet, immediately following the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub common: CommonHeader,
    pub message_length: u32,
    pub offset: u32,
    pub unscheduled: u32,
    pub cutoff_version: u16,
    pub retransmit: bool,
}

impl DataHeader {
    pub const FIELDS_LEN: usize = 4 + 4 + 4 + 2 + 1 + 1; // + pad byte
    pub const LEN: usize = CommonHeader::LEN + Self::FIELDS_LEN;

    pub fn encode(&self, buf: &mut BytesMut) {
        self.common.encode(buf);
        buf.put_u32(self.message_length);
        buf.put_u32(self.offset);
        buf.put_u32(self.unscheduled);
        buf.put_u16(self.cutoff_version);
        buf.put_u8(self.retransmit as u8);
        buf.put_u8(0); // pad
    }

    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        let common = CommonHeader::decode(buf)?;
        if buf.remaining() < Self::FIELDS_LEN {
            return None;
        }
        let message_length = buf.get_u32();
        let offset = buf.get_u32();
        let unscheduled = buf.get_u32();
        let cutoff_version = buf.get_u16();
        let retransmit = buf.get_u8() != 0;
        let _pad = buf.get_u8();
        Some(DataHeader {
            common,
            message_length,
            offset,
            unscheduled,
            cutoff_version,
            retransmit,
        })
    }
}

/// Size every control packet is zero-padded to on the wire. The data header
/// is the largest fixed header this subsystem emits, so it sets the floor.
pub const MAX_HEADER: usize = DataHeader::LEN;

/// A fully serialized data packet: header plus up to `MAX_DATA_PER_PACKET`
/// payload bytes.
#[derive(Debug, Clone)]
pub struct WireDataPacket {
    pub header: DataHeader,
    pub payload: Bytes,
}

impl WireDataPacket {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(DataHeader::LEN + self.payload.len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &mut impl Buf) -> Option<Self> {
        let header = DataHeader::decode(data)?;
        // offset > message_length never happens on a well-formed wire packet,
        // but arbitrary input must not underflow this subtraction.
        let payload_len = header.message_length.saturating_sub(header.offset).min(
            // caller-provided buffer already trimmed to one packet; take whatever is left
            data.remaining() as u32,
        ) as usize;
        if data.remaining() < payload_len {
            return None;
        }
        let payload = data.copy_to_bytes(payload_len);
        Some(WireDataPacket { header, payload })
    }
}

/// A control packet: common header plus an opaque, type-specific body,
/// zero-padded to [`MAX_HEADER`].
#[derive(Debug, Clone)]
pub struct WireControlPacket {
    pub common: CommonHeader,
    pub body: Bytes,
}

impl WireControlPacket {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(MAX_HEADER);
        self.common.encode(&mut buf);
        buf.extend_from_slice(&self.body);
        let written = CommonHeader::LEN + self.body.len();
        if written < MAX_HEADER {
            buf.resize(MAX_HEADER, 0);
        }
        buf
    }

    pub fn decode(data: &mut impl Buf) -> Option<Self> {
        let common = CommonHeader::decode(data)?;
        let body = data.copy_to_bytes(data.remaining());
        Some(WireControlPacket { common, body })
    }
}
