//! End-to-end exercise of the pacer worker: enqueue a throttled message,
//! start the worker, and confirm it drains to completion and stops cleanly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use homa_transport::byte_source::SliceSource;
use homa_transport::config::Config;
use homa_transport::context::HomaContext;
use homa_transport::message::{packetize, Addressing, GrantParams};
use homa_transport::pacer::pacer_start;
use homa_transport::packet::{ControlPacket, NetworkSink, Packet, Peer, RouteHandle};

struct StaticPeer;
impl Peer for StaticPeer {
    fn current_cutoff_version(&self) -> u16 {
        0
    }
    fn unscheduled_priority_for(&self, _length: u32) -> u8 {
        0
    }
    fn destination_route(&self) -> RouteHandle {
        RouteHandle(7)
    }
}

#[derive(Default)]
struct CollectingSink {
    offsets: Mutex<Vec<u32>>,
}

impl NetworkSink for CollectingSink {
    fn submit_to_network(&self, packet: Arc<Packet>) -> homa_transport::error::Result<()> {
        self.offsets.lock().unwrap().push(packet.offset);
        Ok(())
    }
    fn submit_control_to_network(&self, _packet: ControlPacket) -> homa_transport::error::Result<()> {
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn pacer_drains_a_queued_message_to_completion() {
    init_tracing();

    let ctx = HomaContext::new(Config::default());
    let mut source = SliceSource::new(vec![0u8; 4200]);
    let sink = Arc::new(CollectingSink::default());
    let message = Arc::new(
        packetize(
            &mut source,
            4200,
            Addressing {
                src_port: 10,
                dst_port: 20,
                rpc_id: 99,
            },
            GrantParams { unscheduled: 4200 },
            Arc::new(StaticPeer),
            Arc::clone(&sink) as Arc<dyn NetworkSink>,
        )
        .unwrap(),
    );

    // Start the pacer first so it parks on an empty queue, then enqueue
    // through the same path transmit_ready uses — this only drains if
    // enqueue_throttled actually wakes the parked worker.
    let handle = pacer_start(Arc::clone(&ctx));
    std::thread::sleep(Duration::from_millis(20));
    ctx.enqueue_throttled(Arc::clone(&message));

    let mut waited = Duration::ZERO;
    while !message.is_send_complete() && waited < Duration::from_secs(2) {
        std::thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    handle.stop();

    assert!(message.is_send_complete());
    assert_eq!(sink.offsets.lock().unwrap().len(), 3);
    assert!(!message.is_queued());
}
