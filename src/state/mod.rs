//! Live robot state model
//!
//! One [`RobotState`] aggregate per connection, owned by a [`StateHandle`].
//! The merge stage is the only writer; command channels and external
//! consumers read snapshots or block on [`StateHandle::wait_for`] until a
//! predicate holds. Writes that do not change any field are suppressed, so
//! the change generation only advances on real transitions.

pub mod fields;

pub use fields::FieldId;

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::FieldValue;
use crate::session::SessionState;
use crate::types::{
    ControllerVersion, DigitalBits, JointMode, RobotMode, RobotStatus, RuntimeState, SafetyMode,
    SafetyStatus, Vector3D, Vector6D,
};

/// Snapshot of everything the controller reports.
///
/// Field names follow the controller's telemetry vocabulary: `actual_*` is
/// measured, `target_*` is commanded.
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    /// Robot-clock time of the most recent merged package, seconds
    pub timestamp: f64,

    // Joint space, 6 joints base to wrist
    pub target_joint_positions: Vector6D,
    pub target_joint_velocities: Vector6D,
    pub target_joint_accelerations: Vector6D,
    pub target_joint_currents: Vector6D,
    pub target_joint_moments: Vector6D,
    pub actual_joint_positions: Vector6D,
    pub actual_joint_velocities: Vector6D,
    pub actual_joint_currents: Vector6D,
    pub joint_control_output: Vector6D,
    pub joint_temperatures: Vector6D,
    pub actual_joint_voltages: Vector6D,
    /// None until the joint has reported a recognized mode
    pub joint_modes: [Option<JointMode>; 6],

    // Cartesian, base frame
    pub actual_tcp_pose: Vector6D,
    pub actual_tcp_speed: Vector6D,
    pub actual_tcp_force: Vector6D,
    pub target_tcp_pose: Vector6D,
    pub target_tcp_speed: Vector6D,
    pub tcp_force_scalar: f64,
    pub actual_tool_accelerometer: Vector3D,

    // Scalar telemetry
    pub actual_execution_time: f64,
    pub speed_scaling: f64,
    pub target_speed_fraction: f64,
    pub actual_momentum: f64,
    pub actual_main_voltage: f64,
    pub actual_robot_voltage: f64,
    pub actual_robot_current: f64,

    // Mode and status words
    pub robot_mode: RobotMode,
    pub safety_mode: SafetyMode,
    pub runtime_state: RuntimeState,
    pub robot_status: RobotStatus,
    pub safety_status: SafetyStatus,

    // Digital I/O, one 8-bit bank each
    pub standard_digital_inputs: DigitalBits,
    pub configurable_digital_inputs: DigitalBits,
    pub standard_digital_outputs: DigitalBits,
    pub configurable_digital_outputs: DigitalBits,

    // Analog I/O
    pub analog_io_types: u32,
    pub standard_analog_input: [f64; 2],
    pub standard_analog_output: [f64; 2],
    pub io_current: f64,

    // Tool interface
    pub tool_mode: u32,
    pub tool_analog_input_types: u32,
    pub tool_analog_input: [f64; 2],
    pub tool_output_voltage: i32,
    pub tool_output_current: f64,
    pub tool_temperature: f64,

    // Euromap 67 interface, present on machine-tending installations
    pub euromap67_input_bits: u32,
    pub euromap67_output_bits: u32,
    pub euromap67_voltage: f64,
    pub euromap67_current: f64,

    // General-purpose output registers
    pub output_bit_registers: [u32; 2],
    pub output_int_registers: [i32; 24],
    pub output_double_registers: [f64; 24],

    /// Reported by the controller during the handshake
    pub controller_version: Option<ControllerVersion>,
}

impl RobotState {
    /// One-line operator summary for periodic logging
    pub fn summary(&self) -> String {
        format!(
            "t={:.3} mode={:?} safety={:?} runtime={:?} tcp=[{:.4}, {:.4}, {:.4}]",
            self.timestamp,
            self.robot_mode,
            self.safety_mode,
            self.runtime_state,
            self.actual_tcp_pose.x,
            self.actual_tcp_pose.y,
            self.actual_tcp_pose.z
        )
    }
}

/// One decoded data package, ready to merge
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// Values in recipe order
    pub values: Vec<(FieldId, FieldValue)>,
}

impl StateUpdate {
    /// The package's robot-clock timestamp, when the recipe carries one
    pub fn timestamp(&self) -> Option<f64> {
        self.values.iter().find_map(|(id, value)| {
            if *id == FieldId::Timestamp {
                value.double()
            } else {
                None
            }
        })
    }
}

#[derive(Debug)]
struct Inner {
    state: RobotState,
    generation: u64,
}

/// Granularity of blocking waits; bounds how late a wait notices
/// session shutdown
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Shared, change-notified access to the robot state.
///
/// Readers take snapshots or wait on the condition variable; the single
/// writer merges updates and advances a generation counter whenever at
/// least one field actually changed.
#[derive(Debug)]
pub struct StateHandle {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RobotState::default(),
                generation: 0,
            }),
            changed: Condvar::new(),
        }
    }
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state, consistent across all fields
    pub fn snapshot(&self) -> RobotState {
        self.inner.lock().state.clone()
    }

    /// Monotonic counter, advanced once per merge that changed anything
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Merge a decoded package. Returns the number of fields that changed;
    /// waiters are only woken when that is non-zero.
    pub(crate) fn apply_update(&self, update: &StateUpdate) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut changed = 0;
        for (id, value) in &update.values {
            if fields::apply(&mut inner.state, *id, value)? {
                changed += 1;
            }
        }
        if changed > 0 {
            inner.generation += 1;
            self.changed.notify_all();
        }
        Ok(changed)
    }

    pub(crate) fn set_controller_version(&self, version: ControllerVersion) {
        let mut inner = self.inner.lock();
        inner.state.controller_version = Some(version);
        inner.generation += 1;
        self.changed.notify_all();
    }

    /// Block until `predicate` holds for the current state.
    ///
    /// Wakes on every change notification and additionally every
    /// [`WAIT_SLICE`] to notice session shutdown. Fails with `Timeout` at
    /// the deadline and `NotConnected` when the session winds down first.
    pub fn wait_for<F>(&self, session: &SessionState, timeout: Duration, predicate: F) -> Result<()>
    where
        F: Fn(&RobotState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if predicate(&inner.state) {
                return Ok(());
            }
            if session.is_shutdown() {
                return Err(Error::NotConnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.changed.wait_for(&mut inner, slice);
        }
    }
}
