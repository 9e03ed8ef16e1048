//! Simulated end-to-end run of the presence stack.
//!
//! Feeds synthetic discoveries for a handful of devices through the service,
//! prints the sorted view a few times, flips the sort order, and shuts down.
//!
//! ```text
//! RUST_LOG=debug cargo run --example scan_demo
//! ```

use std::time::Duration;

use nearscan::scan::{parse_address, Discovery, NullScanSource};
use nearscan::{PresenceConfig, PresenceService, ScanRateLimits, SortKey};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PresenceConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_limits(ScanRateLimits::new(5, Duration::from_secs(30)))
        .with_sweep_interval(Duration::from_millis(250));
    let service = PresenceService::start(config, NullScanSource);
    service.start_scanning().await.expect("scheduler task running");

    let devices = [
        ("0E:06:E5:75:F0:AE", "CARD", -62),
        ("0E:06:E5:E6:E7:AE", "FNDR", -48),
        ("0E:06:E5:E2:73:AF", "TAG", -75),
    ];

    for round in 0..6 {
        for (address, name, base_signal) in devices {
            let address = parse_address(address).expect("well-formed address");
            // Wiggle the readings so smoothing has something to do.
            let signal = base_signal + ((round * 7) % 11) - 5;
            service.on_discovery(&Discovery::new(address, Some(name.to_string()), signal));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        println!("--- round {round} (strongest first) ---");
        for (i, row) in service.snapshot().iter().enumerate() {
            println!(
                "{i:2}  {}  {:24}  {:4} dBm  expires in {:.1}s",
                row.address,
                row.name,
                row.signal,
                row.remaining.as_secs_f64()
            );
        }
    }

    service.set_sort_key(SortKey::Name);
    println!("--- sorted by name ---");
    for row in service.snapshot() {
        println!("    {}  {}", row.address, row.name);
    }

    // Stop feeding discoveries and watch entries age out. The 5s timeout is
    // measured in scanning time, so with a 50% duty cycle this takes roughly
    // twice as long on the wall clock.
    println!("--- waiting for expiry ---");
    tokio::time::sleep(Duration::from_secs(12)).await;
    println!("tracked devices after timeout: {}", service.device_count());

    service.stop_scanning().await.expect("scheduler task running");
    service.shutdown().await;
}
