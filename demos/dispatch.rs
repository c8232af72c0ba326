//! Quick controller test using urlink - dispatch one motion program
//!
//! Test sequence:
//! 1. Load configuration (host from argv, UR simulator default)
//! 2. Power on the arm and release the brakes via the dashboard
//! 3. Connect the telemetry stream
//! 4. Dispatch a short joint move and wait for it to finish
//! 5. Print the final pose and session statistics
//!
//! Run against a URSim instance:
//! ```sh
//! RUST_LOG=info cargo run --example dispatch -- 192.168.56.101
//! ```

use std::time::Duration;

use urlink::{Config, DashboardClient, RealtimeClient, RtdeClient};

const PARK_PROGRAM: &str =
    "def park():\n  movej([0.0, -1.57, 0.0, -1.57, 0.0, 0.0], a=0.5, v=0.5)\nend\n";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("=== urlink dispatch demo ===");

    // === 1. Configuration ===
    let mut config = Config::ur_defaults();
    if let Some(host) = std::env::args().nth(1) {
        config.robot.host = host;
    }
    log::info!("1. Controller at {}", config.robot.host);

    // === 2. Power on through the dashboard ===
    let mut dashboard = DashboardClient::connect(&config)?;
    log::info!("2. Dashboard says: {}", dashboard.power_on()?);
    log::info!("   ✓ {}", dashboard.brake_release()?);

    // === 3. Telemetry stream ===
    let mut client = RtdeClient::connect(&config)?;
    log::info!("3. Streaming {} telemetry fields", client.output_schema().len());

    // === 4. Dispatch a motion program ===
    let mut realtime = RealtimeClient::connect(&config, client.state(), client.session())?;
    log::info!("4. Dispatching park program...");
    realtime.send_program(PARK_PROGRAM)?;
    log::info!("   ✓ Program running");
    realtime.wait_program_complete(Duration::from_secs(60))?;
    log::info!("   ✓ Program complete");

    // === 5. Final state ===
    let state = client.snapshot();
    log::info!("5. {}", state.summary());
    log::info!("   Session: {}", client.stats());

    realtime.shutdown();
    client.shutdown();
    Ok(())
}
