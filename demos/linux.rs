//! Poll a VL53L4CD on a Raspberry Pi once and print the status stream.
//!
//! `cargo run --example linux --features i2cdev,tokio [-- --repeat]`

use std::time::Duration;

use tof_ranging::{vl53l4cd::Vl53l4cd, Policy, PollLoop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let policy = if std::env::args().any(|a| a == "--repeat") {
        Policy::Repeat {
            delay: Duration::from_secs(1),
            sessions: None,
        }
    } else {
        Policy::SingleSession
    };

    println!("Start sensor polling");

    let mut poll = PollLoop::new(Vl53l4cd::new("/dev/i2c-1").with_range_timing(200, 0)).with_policy(policy);
    let summary = poll.run_async(|report| println!("{report}")).await?;

    println!("{} session(s), {} sample(s)", summary.sessions, summary.samples);

    Ok(())
}
