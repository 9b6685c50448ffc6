//! Property-based tests for the Homa wire format and packetization.

use bytes::{Bytes, BytesMut};
use homa_transport::byte_source::SliceSource;
use homa_transport::config::MAX_DATA_PER_PACKET;
use homa_transport::message::{packetize, Addressing, GrantParams};
use homa_transport::packet::{NetworkSink, Peer, RouteHandle};
use homa_transport::wire::{vlan_tag_for, CommonHeader, DataHeader, PacketType, WireDataPacket};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

proptest! {
    #[test]
    fn vlan_tag_is_an_involution_on_the_low_pair(p in 0u8..8) {
        // logical 0 <-> wire 1, logical 1 <-> wire 0; everything else fixed.
        let tagged = vlan_tag_for(p);
        if p < 2 {
            prop_assert_eq!(vlan_tag_for(tagged), p);
        } else {
            prop_assert_eq!(tagged, p);
        }
    }

    #[test]
    fn common_header_roundtrips_for_any_field_values(
        src_port in any::<u16>(),
        dst_port in any::<u16>(),
        rpc_id in any::<u64>(),
    ) {
        let header = CommonHeader {
            src_port,
            dst_port,
            packet_type: PacketType::Data,
            rpc_id,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let decoded = CommonHeader::decode(&mut buf).unwrap();
        prop_assert_eq!(decoded, header);
    }

    #[test]
    fn data_header_roundtrips_for_any_field_values(
        message_length in any::<u32>(),
        offset in any::<u32>(),
        unscheduled in any::<u32>(),
        cutoff_version in any::<u16>(),
        retransmit in any::<bool>(),
    ) {
        let header = DataHeader {
            common: CommonHeader {
                src_port: 1,
                dst_port: 2,
                packet_type: PacketType::Data,
                rpc_id: 3,
            },
            message_length,
            offset,
            unscheduled,
            cutoff_version,
            retransmit,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let decoded = DataHeader::decode(&mut buf).unwrap();
        prop_assert_eq!(decoded, header);
    }

    #[test]
    fn data_packet_payload_survives_roundtrip(payload_len in 0usize..=MAX_DATA_PER_PACKET as usize) {
        let payload = Bytes::from(vec![0x5Au8; payload_len]);
        let header = DataHeader {
            common: CommonHeader {
                src_port: 1,
                dst_port: 2,
                packet_type: PacketType::Data,
                rpc_id: 0,
            },
            message_length: payload_len as u32,
            offset: 0,
            unscheduled: payload_len as u32,
            cutoff_version: 0,
            retransmit: false,
        };
        let packet = WireDataPacket { header, payload: payload.clone() };
        let mut encoded = packet.encode().freeze();
        let decoded = WireDataPacket::decode(&mut encoded).unwrap();
        prop_assert_eq!(decoded.payload, payload);
    }
}

struct FixedPeer;
impl Peer for FixedPeer {
    fn current_cutoff_version(&self) -> u16 {
        0
    }
    fn unscheduled_priority_for(&self, _length: u32) -> u8 {
        0
    }
    fn destination_route(&self) -> RouteHandle {
        RouteHandle(1)
    }
}

#[derive(Default)]
struct CountingSink {
    bytes_seen: Mutex<u64>,
}

impl NetworkSink for CountingSink {
    fn submit_to_network(
        &self,
        packet: Arc<homa_transport::packet::Packet>,
    ) -> homa_transport::error::Result<()> {
        *self.bytes_seen.lock().unwrap() += packet.payload.len() as u64;
        Ok(())
    }
    fn submit_control_to_network(
        &self,
        _packet: homa_transport::packet::ControlPacket,
    ) -> homa_transport::error::Result<()> {
        Ok(())
    }
}

proptest! {
    #[test]
    fn packetize_always_covers_the_full_message_length(length in 0u32..200_000) {
        let mut source = SliceSource::new(vec![0u8; length as usize]);
        let msg = packetize(
            &mut source,
            length,
            Addressing { src_port: 1, dst_port: 2, rpc_id: 1 },
            GrantParams { unscheduled: length },
            Arc::new(FixedPeer),
            Arc::new(CountingSink::default()),
        ).unwrap();

        let total: u64 = msg.packets.iter().map(|p| p.payload.len() as u64).sum();
        prop_assert_eq!(total, length as u64);

        let num_packets = if length == 0 { 1 } else { length.div_ceil(MAX_DATA_PER_PACKET) as usize };
        prop_assert_eq!(msg.packets.len(), num_packets);
    }

    #[test]
    fn packetized_frames_carry_a_correctly_addressed_data_header(length in 1u32..200_000) {
        let addressing = Addressing { src_port: 11, dst_port: 22, rpc_id: 777 };
        let unscheduled = (length / 3).max(1);
        let mut source = SliceSource::new(vec![0u8; length as usize]);
        let msg = packetize(
            &mut source,
            length,
            addressing,
            GrantParams { unscheduled },
            Arc::new(FixedPeer),
            Arc::new(CountingSink::default()),
        ).unwrap();

        for packet in &msg.packets {
            let frame = packet.frame_bytes();
            let mut rest = frame.slice(homa_transport::config::SKB_RESERVE..);
            let decoded = WireDataPacket::decode(&mut rest)
                .expect("every packetized frame must decode as a data packet");
            prop_assert_eq!(decoded.header.common.src_port, addressing.src_port);
            prop_assert_eq!(decoded.header.common.dst_port, addressing.dst_port);
            prop_assert_eq!(decoded.header.common.rpc_id, addressing.rpc_id);
            prop_assert_eq!(decoded.header.common.packet_type, PacketType::Data);
            prop_assert_eq!(decoded.header.message_length, length);
            prop_assert_eq!(decoded.header.offset, packet.offset);
            prop_assert_eq!(decoded.header.unscheduled, unscheduled.min(length));
            prop_assert_eq!(decoded.payload, packet.payload.clone());
        }
    }
}
