//! Prints every MIDI packet from every source, and follows devices as they
//! come and go.
//!
//! Also publishes a virtual destination named "midihub monitor" that other
//! apps can send to.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p midihub-io --example monitor
//! ```

use midihub_io::{DataSignal, HubBuilder, MidirPlatform};
use std::sync::Arc;
use std::time::Duration;

fn main() -> midihub_io::Result<()> {
    tracing_subscriber::fmt::init();

    let mut hub = HubBuilder::new()
        .client_name("midihub monitor")
        .virtual_endpoint_name("midihub monitor")
        .virtual_destination()
        .build(MidirPlatform::new().with_poll_interval(Duration::from_millis(500)))?;

    let signal = Arc::new(DataSignal::new());
    hub.set_source_delegate(&signal);

    println!("=== MIDI Sources ===");
    if hub.sources().is_empty() {
        println!("  (none found)");
    }
    for source in hub.sources() {
        println!("  {}", source.connection());
    }

    println!("\n=== MIDI Destinations ===");
    if hub.destinations().is_empty() {
        println!("  (none found)");
    }
    for destination in hub.destinations() {
        println!("  {}", destination.connection());
    }

    println!("\nListening (Ctrl+C to quit)...");
    loop {
        let change = hub.process_notifications()?;
        for endpoint in &change.sources_added {
            if let Some(source) = hub.source(*endpoint) {
                println!("+ {}", source.connection());
            }
        }
        for endpoint in &change.sources_removed {
            println!("- {}", endpoint);
        }

        let Some(first) = signal.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        let mut ready = vec![first];
        for endpoint in signal.pending_sources() {
            if !ready.contains(&endpoint) {
                ready.push(endpoint);
            }
        }

        for endpoint in ready {
            let Some(source) = hub.source(endpoint) else {
                continue;
            };
            for packet in source.drain() {
                println!(
                    "{:>12} {:<24} {:02X?}",
                    packet.timestamp(),
                    source.connection().display_name(),
                    packet.bytes()
                );
            }
            if source.take_overflow() {
                println!("  ({} packets dropped)", source.dropped_packets());
            }
        }
    }
}
