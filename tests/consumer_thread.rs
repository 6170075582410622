//! End-to-end: platform threads deliver, a consumer thread drains.

use midihub::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const BATCHES: u64 = 500;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn build_hub(platform: &MockPlatform) -> midihub::Result<Hub<MockPlatform>> {
    Ok(HubBuilder::new()
        .client_name("consumer test")
        .unbounded_queues()
        .build(platform.clone())?)
}

#[test]
fn test_consumer_thread_drains_every_source_in_order() {
    init_tracing();
    let platform = MockPlatform::new();
    let endpoints: Vec<EndpointId> = (0..3)
        .map(|i| platform.add_source(&format!("Device {i}")))
        .collect();
    let mut hub = build_hub(&platform).unwrap();
    assert_eq!(hub.sources().len(), 3);

    let signal = Arc::new(DataSignal::with_capacity(64));
    hub.set_source_delegate(&signal);

    let sources: HashMap<EndpointId, Arc<Source>> = hub
        .sources()
        .iter()
        .map(|s| (s.endpoint(), Arc::clone(s)))
        .collect();

    let consumer = {
        let signal = Arc::clone(&signal);
        thread::spawn(move || {
            let mut received: HashMap<EndpointId, Vec<u64>> = HashMap::new();
            let expected = BATCHES as usize * sources.len();
            let mut total = 0;
            while total < expected {
                let Some(endpoint) = signal.recv_timeout(Duration::from_millis(50)) else {
                    // Signals can be missed when the channel is full; the
                    // packets are still queued
                    for (endpoint, source) in &sources {
                        let drained = source.drain();
                        total += drained.len();
                        received
                            .entry(*endpoint)
                            .or_default()
                            .extend(drained.iter().map(Packet::timestamp));
                    }
                    continue;
                };
                let drained = sources[&endpoint].drain();
                total += drained.len();
                received
                    .entry(endpoint)
                    .or_default()
                    .extend(drained.iter().map(Packet::timestamp));
            }
            received
        })
    };

    let producers: Vec<_> = endpoints
        .iter()
        .map(|&endpoint| {
            let platform = platform.clone();
            thread::spawn(move || {
                for ts in 0..BATCHES {
                    let packet = Packet::new(ts, &[0x90, (ts % 128) as u8, 100]).unwrap();
                    assert!(platform.deliver(endpoint, &[packet]));
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let received = consumer.join().unwrap();

    for endpoint in endpoints {
        let expected: Vec<u64> = (0..BATCHES).collect();
        assert_eq!(received[&endpoint], expected, "{endpoint} out of order");
    }
}

#[test]
fn test_errors_convert_into_the_umbrella_error() {
    init_tracing();
    let oversized = vec![0xF0; midihub::PACKET_CAPACITY + 1];
    let result: midihub::Result<Packet> = Packet::new(0, &oversized).map_err(Into::into);
    assert!(matches!(result, Err(midihub::Error::Core(_))));

    let platform = MockPlatform::new();
    platform.fail_client_creation(true);
    assert!(matches!(
        build_hub(&platform),
        Err(midihub::Error::Hub(midihub::io::Error::Client(_)))
    ));
}
