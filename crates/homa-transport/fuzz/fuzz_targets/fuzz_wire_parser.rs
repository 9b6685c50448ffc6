#![no_main]

use homa_transport::wire::{CommonHeader, DataHeader, WireControlPacket, WireDataPacket};
use libfuzzer_sys::fuzz_target;

/// The wire decoders must never panic on arbitrary input, only return `None`.
fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    let _ = CommonHeader::decode(&mut buf);

    let mut buf = data;
    let _ = DataHeader::decode(&mut buf);

    let mut buf = data;
    let _ = WireDataPacket::decode(&mut buf);

    let mut buf = data;
    let _ = WireControlPacket::decode(&mut buf);

    // If a data header decodes, re-encoding it must reproduce the same bytes.
    let mut buf = data;
    if let Some(header) = DataHeader::decode(&mut buf) {
        let mut encoded = bytes::BytesMut::new();
        header.encode(&mut encoded);
        let mut re = &encoded[..];
        let re_decoded = DataHeader::decode(&mut re).expect("re-decode must succeed");
        assert_eq!(re_decoded, header);
    }
});
