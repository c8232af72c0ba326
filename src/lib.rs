//! urlink - Real-time interface client for Universal Robots controllers
//!
//! This library speaks the controller's binary real-time data exchange
//! protocol over TCP: schema-negotiated cyclic telemetry merged into a
//! shared robot state model, register writes back to the controller,
//! program dispatch synchronized on run-state transitions, and the
//! administrative text channel.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod protocol;
pub mod realtime;
pub mod rtde;
pub mod session;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dashboard::DashboardClient;
pub use error::{Error, Result};
pub use realtime::RealtimeClient;
pub use rtde::RtdeClient;
pub use session::{SessionState, StatsSnapshot};
pub use state::{RobotState, StateHandle};
pub use types::ConnectionState;
