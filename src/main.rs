//! urlink - Real-time interface daemon for Universal Robots controllers
//!
//! Connects to a controller, negotiates the telemetry schema, and keeps the
//! robot state model fresh while logging a periodic status line with the
//! stream health counters. Useful for cell bring-up and as a wiring example
//! for the library; anything beyond watching the robot belongs in a program
//! built on the library API.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use urlink::config::Config;
use urlink::error::{Error, Result};
use urlink::rtde::RtdeClient;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `urlink <path>` (positional)
/// - `urlink --config <path>` (flag-based)
/// - `urlink -c <path>` (short flag)
///
/// Defaults to `/etc/urlink.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/urlink.toml".to_string()
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("urlink v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = parse_config_path();
    log::info!("Using config: {}", config_path);
    let config = Config::from_file(&config_path)?;

    log::info!(
        "Controller: {} (telemetry {}, dispatch {}, admin {})",
        config.robot.host,
        config.robot.rtde_port,
        config.robot.realtime_port,
        config.robot.dashboard_port
    );

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut client = RtdeClient::connect(&config)?;
    log::info!(
        "Streaming {} telemetry fields. Press Ctrl-C to stop.",
        client.output_schema().len()
    );

    // Main loop: short sleeps for signal responsiveness, one status line
    // per second
    let mut ticks = 0u32;
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));

        if client.session_error().is_some() {
            break;
        }

        ticks += 1;
        if ticks % 10 == 0 {
            let state = client.snapshot();
            log::info!("{} | {}", state.summary(), client.stats());
        }
    }

    let failure = client.session().take_error();
    client.shutdown();

    if let Some(e) = failure {
        log::error!("Session ended with error: {}", e);
        return Err(e);
    }

    log::info!("urlink stopped");
    Ok(())
}
