//! Configuration for urlink
//!
//! Loads configuration from a TOML file: controller endpoints, the
//! telemetry/command field lists that seed schema negotiation, and the
//! timing knobs of the streaming pipeline. Every field except the robot
//! host carries a default, so a minimal file only names the controller.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Telemetry fields requested when the configuration does not name its own.
///
/// Mirrors the controller's full cyclic report: joint-space targets and
/// actuals, TCP pose/speed/force, I/O banks, and the mode words. The
/// timestamp is always requested first and is not part of this list.
const DEFAULT_OUTPUT_FIELDS: &[&str] = &[
    "target_q",
    "target_qd",
    "target_qdd",
    "target_current",
    "target_moment",
    "actual_q",
    "actual_qd",
    "actual_current",
    "joint_control_output",
    "actual_TCP_pose",
    "actual_TCP_speed",
    "actual_TCP_force",
    "target_TCP_pose",
    "target_TCP_speed",
    "actual_digital_input_bits",
    "joint_temperatures",
    "actual_execution_time",
    "robot_mode",
    "joint_mode",
    "safety_mode",
    "actual_tool_accelerometer",
    "speed_scaling",
    "target_speed_fraction",
    "actual_momentum",
    "actual_main_voltage",
    "actual_robot_voltage",
    "actual_robot_current",
    "actual_joint_voltage",
    "actual_digital_output_bits",
    "runtime_state",
    "robot_status_bits",
    "safety_status_bits",
];

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub robot: RobotConfig,
    #[serde(default)]
    pub rtde: RtdeConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Controller endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Controller hostname or IP address
    pub host: String,
    /// Telemetry and register-write port
    #[serde(default = "RobotConfig::default_rtde_port")]
    pub rtde_port: u16,
    /// Program dispatch port (URScript text)
    #[serde(default = "RobotConfig::default_realtime_port")]
    pub realtime_port: u16,
    /// Administrative command port
    #[serde(default = "RobotConfig::default_dashboard_port")]
    pub dashboard_port: u16,
}

impl RobotConfig {
    const fn default_rtde_port() -> u16 {
        30004
    }

    const fn default_realtime_port() -> u16 {
        30003
    }

    const fn default_dashboard_port() -> u16 {
        29999
    }

    fn addr(&self, port: u16) -> Result<SocketAddr> {
        let endpoint = format!("{}:{}", self.host, port);
        endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidParameter(format!("cannot resolve '{}'", endpoint)))
    }

    /// Resolved telemetry endpoint
    pub fn rtde_addr(&self) -> Result<SocketAddr> {
        self.addr(self.rtde_port)
    }

    /// Resolved program dispatch endpoint
    pub fn realtime_addr(&self) -> Result<SocketAddr> {
        self.addr(self.realtime_port)
    }

    /// Resolved administrative endpoint
    pub fn dashboard_addr(&self) -> Result<SocketAddr> {
        self.addr(self.dashboard_port)
    }
}

/// Telemetry schema and merge behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RtdeConfig {
    /// Output field names requested from the controller. The timestamp is
    /// always requested first and need not appear here.
    #[serde(default = "RtdeConfig::default_output_fields")]
    pub output_fields: Vec<String>,
    /// Input field names negotiated for register writes. An empty list
    /// disables the write direction.
    #[serde(default)]
    pub input_fields: Vec<String>,
    /// Bind output names the state model does not know as ignored instead
    /// of failing the handshake
    #[serde(default)]
    pub ignore_unknown_fields: bool,
}

impl RtdeConfig {
    fn default_output_fields() -> Vec<String> {
        DEFAULT_OUTPUT_FIELDS.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for RtdeConfig {
    fn default() -> Self {
        Self {
            output_fields: Self::default_output_fields(),
            input_fields: Vec::new(),
            ignore_unknown_fields: false,
        }
    }
}

/// Pipeline timing knobs. Durations are milliseconds unless the name says
/// otherwise.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Controller output cadence in seconds (0.008 for a 125 Hz controller)
    #[serde(default = "TimingConfig::default_control_period_s")]
    pub control_period_s: f64,
    /// Timestamp gap treated as dropped packages, as a multiple of the
    /// control period
    #[serde(default = "TimingConfig::default_dropped_packet_factor")]
    pub dropped_packet_factor: f64,
    /// Lower bound on state-merge spacing
    #[serde(default = "TimingConfig::default_merge_min_interval_ms")]
    pub merge_min_interval_ms: u64,
    /// Upper bound on state-merge spacing before a cadence violation is
    /// counted
    #[serde(default = "TimingConfig::default_merge_max_interval_ms")]
    pub merge_max_interval_ms: u64,
    /// Spacing between outbound frames while the session is being set up
    #[serde(default = "TimingConfig::default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// How long to wait for a handshake or administrative reply
    #[serde(default = "TimingConfig::default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// How long to wait for a dispatched program to start or finish
    #[serde(default = "TimingConfig::default_program_timeout_ms")]
    pub program_timeout_ms: u64,
    /// TCP connect timeout
    #[serde(default = "TimingConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl TimingConfig {
    const fn default_control_period_s() -> f64 {
        0.008
    }

    const fn default_dropped_packet_factor() -> f64 {
        1.6
    }

    const fn default_merge_min_interval_ms() -> u64 {
        2
    }

    const fn default_merge_max_interval_ms() -> u64 {
        32
    }

    const fn default_send_interval_ms() -> u64 {
        100
    }

    const fn default_reply_timeout_ms() -> u64 {
        2000
    }

    const fn default_program_timeout_ms() -> u64 {
        5000
    }

    const fn default_connect_timeout_ms() -> u64 {
        5000
    }

    pub fn merge_min_interval(&self) -> Duration {
        Duration::from_millis(self.merge_min_interval_ms)
    }

    pub fn merge_max_interval(&self) -> Duration {
        Duration::from_millis(self.merge_max_interval_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn program_timeout(&self) -> Duration {
        Duration::from_millis(self.program_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_period_s: Self::default_control_period_s(),
            dropped_packet_factor: Self::default_dropped_packet_factor(),
            merge_min_interval_ms: Self::default_merge_min_interval_ms(),
            merge_max_interval_ms: Self::default_merge_max_interval_ms(),
            send_interval_ms: Self::default_send_interval_ms(),
            reply_timeout_ms: Self::default_reply_timeout_ms(),
            program_timeout_ms: Self::default_program_timeout_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Returns
    /// Parsed configuration or error
    ///
    /// # Example
    /// ```no_run
    /// use urlink::config::Config;
    ///
    /// let config = Config::from_file("urlink.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for a UR controller on the simulator address
    ///
    /// Suitable for testing against URSim. Production deployments should
    /// use a proper TOML configuration file.
    pub fn ur_defaults() -> Self {
        Self {
            robot: RobotConfig {
                host: "192.168.56.101".to_string(),
                rtde_port: RobotConfig::default_rtde_port(),
                realtime_port: RobotConfig::default_realtime_port(),
                dashboard_port: RobotConfig::default_dashboard_port(),
            },
            rtde: RtdeConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    /// Save configuration to TOML file
    ///
    /// # Arguments
    /// - `path`: Path to save TOML configuration file
    ///
    /// # Returns
    /// Success or error
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::ur_defaults()
    }
}
