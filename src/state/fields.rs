//! Telemetry field identifiers and typed setters
//!
//! Field names are resolved to [`FieldId`] once, right after the output
//! recipe is negotiated. The per-packet merge path then dispatches on the
//! enum instead of comparing strings, and unknown names surface at
//! resolution time as a single explicit failure.

use crate::error::{Error, Result};
use crate::protocol::FieldValue;
use crate::types::{
    DigitalBits, JointMode, RobotMode, RobotStatus, RuntimeState, SafetyMode, SafetyStatus,
    Vector3D, Vector6D,
};

use super::RobotState;

/// Number of output registers per bank (integer and double alike)
pub const REGISTER_BANK_SIZE: u8 = 24;

/// Identity of one telemetry field in the state model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Timestamp,
    TargetJointPositions,
    TargetJointVelocities,
    TargetJointAccelerations,
    TargetJointCurrents,
    TargetJointMoments,
    ActualJointPositions,
    ActualJointVelocities,
    ActualJointCurrents,
    JointControlOutput,
    JointTemperatures,
    ActualJointVoltages,
    JointModes,
    ActualTcpPose,
    ActualTcpSpeed,
    ActualTcpForce,
    TargetTcpPose,
    TargetTcpSpeed,
    TcpForceScalar,
    ActualToolAccelerometer,
    ActualExecutionTime,
    SpeedScaling,
    TargetSpeedFraction,
    ActualMomentum,
    ActualMainVoltage,
    ActualRobotVoltage,
    ActualRobotCurrent,
    RobotMode,
    SafetyMode,
    RuntimeState,
    RobotStatusBits,
    SafetyStatusBits,
    DigitalInputBits,
    DigitalOutputBits,
    AnalogIoTypes,
    StandardAnalogInput0,
    StandardAnalogInput1,
    StandardAnalogOutput0,
    StandardAnalogOutput1,
    IoCurrent,
    ToolMode,
    ToolAnalogInputTypes,
    ToolAnalogInput0,
    ToolAnalogInput1,
    ToolOutputVoltage,
    ToolOutputCurrent,
    ToolTemperature,
    Euromap67InputBits,
    Euromap67OutputBits,
    Euromap67Voltage,
    Euromap67Current,
    OutputBitRegistersLow,
    OutputBitRegistersHigh,
    OutputIntRegister(u8),
    OutputDoubleRegister(u8),
    /// Resolved but deliberately not merged (opt-in for unknown names)
    Ignored,
}

impl FieldId {
    /// Map a wire field name to its identifier. Returns None for names the
    /// state model does not know.
    pub fn resolve(name: &str) -> Option<Self> {
        if let Some(index) = parse_register_index(name, "output_int_register_") {
            return Some(FieldId::OutputIntRegister(index));
        }
        if let Some(index) = parse_register_index(name, "output_double_register_") {
            return Some(FieldId::OutputDoubleRegister(index));
        }
        let id = match name {
            "timestamp" => FieldId::Timestamp,
            "target_q" => FieldId::TargetJointPositions,
            "target_qd" => FieldId::TargetJointVelocities,
            "target_qdd" => FieldId::TargetJointAccelerations,
            "target_current" => FieldId::TargetJointCurrents,
            "target_moment" => FieldId::TargetJointMoments,
            "actual_q" => FieldId::ActualJointPositions,
            "actual_qd" => FieldId::ActualJointVelocities,
            "actual_current" => FieldId::ActualJointCurrents,
            "joint_control_output" => FieldId::JointControlOutput,
            "joint_temperatures" => FieldId::JointTemperatures,
            "actual_joint_voltage" => FieldId::ActualJointVoltages,
            "joint_mode" => FieldId::JointModes,
            "actual_TCP_pose" => FieldId::ActualTcpPose,
            "actual_TCP_speed" => FieldId::ActualTcpSpeed,
            "actual_TCP_force" => FieldId::ActualTcpForce,
            "target_TCP_pose" => FieldId::TargetTcpPose,
            "target_TCP_speed" => FieldId::TargetTcpSpeed,
            "tcp_force_scalar" => FieldId::TcpForceScalar,
            "actual_tool_accelerometer" => FieldId::ActualToolAccelerometer,
            "actual_execution_time" => FieldId::ActualExecutionTime,
            "speed_scaling" => FieldId::SpeedScaling,
            "target_speed_fraction" => FieldId::TargetSpeedFraction,
            "actual_momentum" => FieldId::ActualMomentum,
            "actual_main_voltage" => FieldId::ActualMainVoltage,
            "actual_robot_voltage" => FieldId::ActualRobotVoltage,
            "actual_robot_current" => FieldId::ActualRobotCurrent,
            "robot_mode" => FieldId::RobotMode,
            "safety_mode" => FieldId::SafetyMode,
            "runtime_state" => FieldId::RuntimeState,
            "robot_status_bits" => FieldId::RobotStatusBits,
            "safety_status_bits" => FieldId::SafetyStatusBits,
            "actual_digital_input_bits" => FieldId::DigitalInputBits,
            "actual_digital_output_bits" => FieldId::DigitalOutputBits,
            "analog_io_types" => FieldId::AnalogIoTypes,
            "standard_analog_input0" => FieldId::StandardAnalogInput0,
            "standard_analog_input1" => FieldId::StandardAnalogInput1,
            "standard_analog_output0" => FieldId::StandardAnalogOutput0,
            "standard_analog_output1" => FieldId::StandardAnalogOutput1,
            "io_current" => FieldId::IoCurrent,
            "tool_mode" => FieldId::ToolMode,
            "tool_analog_input_types" => FieldId::ToolAnalogInputTypes,
            "tool_analog_input0" => FieldId::ToolAnalogInput0,
            "tool_analog_input1" => FieldId::ToolAnalogInput1,
            "tool_output_voltage" => FieldId::ToolOutputVoltage,
            "tool_output_current" => FieldId::ToolOutputCurrent,
            "tool_temperature" => FieldId::ToolTemperature,
            "euromap67_input_bits" => FieldId::Euromap67InputBits,
            "euromap67_output_bits" => FieldId::Euromap67OutputBits,
            "euromap67_24V_voltage" => FieldId::Euromap67Voltage,
            "euromap67_24V_current" => FieldId::Euromap67Current,
            "output_bit_registers0_to_31" => FieldId::OutputBitRegistersLow,
            "output_bit_registers32_to_63" => FieldId::OutputBitRegistersHigh,
            _ => return None,
        };
        Some(id)
    }
}

pub(crate) fn parse_register_index(name: &str, prefix: &str) -> Option<u8> {
    let index: u8 = name.strip_prefix(prefix)?.parse().ok()?;
    if index < REGISTER_BANK_SIZE {
        Some(index)
    } else {
        None
    }
}

/// Vectors change when any component moves past this; suppresses encoder
/// jitter below physical significance
const VECTOR_TOLERANCE: f64 = 1e-5;

fn set_scalar<T: PartialEq + Copy>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn set_vector6(slot: &mut Vector6D, value: Vector6D) -> bool {
    if slot.approx_eq(&value, VECTOR_TOLERANCE) {
        return false;
    }
    *slot = value;
    true
}

fn set_vector3(slot: &mut Vector3D, value: Vector3D) -> bool {
    if slot.approx_eq(&value, VECTOR_TOLERANCE) {
        return false;
    }
    *slot = value;
    true
}

fn mismatch(id: FieldId, value: &FieldValue) -> Error {
    Error::Decode(format!(
        "field {:?} cannot take a {} value",
        id,
        value.field_type().type_name()
    ))
}

fn expect_double(id: FieldId, value: &FieldValue) -> Result<f64> {
    value.double().ok_or_else(|| mismatch(id, value))
}

fn expect_integer(id: FieldId, value: &FieldValue) -> Result<u64> {
    value.integer().ok_or_else(|| mismatch(id, value))
}

fn expect_vector6(id: FieldId, value: &FieldValue) -> Result<Vector6D> {
    value.vector6().ok_or_else(|| mismatch(id, value))
}

/// Merge one observed value into the state model.
///
/// Returns whether the write changed the model. A value identical to the
/// stored one is a no-op so callers can gate change notification on the
/// result. Type mismatches reject the package; unrecognized enum raw values
/// keep the previous mode and are only logged.
pub(crate) fn apply(state: &mut RobotState, id: FieldId, value: &FieldValue) -> Result<bool> {
    let changed = match id {
        FieldId::Timestamp => set_scalar(&mut state.timestamp, expect_double(id, value)?),
        FieldId::TargetJointPositions => {
            set_vector6(&mut state.target_joint_positions, expect_vector6(id, value)?)
        }
        FieldId::TargetJointVelocities => set_vector6(
            &mut state.target_joint_velocities,
            expect_vector6(id, value)?,
        ),
        FieldId::TargetJointAccelerations => set_vector6(
            &mut state.target_joint_accelerations,
            expect_vector6(id, value)?,
        ),
        FieldId::TargetJointCurrents => {
            set_vector6(&mut state.target_joint_currents, expect_vector6(id, value)?)
        }
        FieldId::TargetJointMoments => {
            set_vector6(&mut state.target_joint_moments, expect_vector6(id, value)?)
        }
        FieldId::ActualJointPositions => {
            set_vector6(&mut state.actual_joint_positions, expect_vector6(id, value)?)
        }
        FieldId::ActualJointVelocities => set_vector6(
            &mut state.actual_joint_velocities,
            expect_vector6(id, value)?,
        ),
        FieldId::ActualJointCurrents => {
            set_vector6(&mut state.actual_joint_currents, expect_vector6(id, value)?)
        }
        FieldId::JointControlOutput => {
            set_vector6(&mut state.joint_control_output, expect_vector6(id, value)?)
        }
        FieldId::JointTemperatures => {
            set_vector6(&mut state.joint_temperatures, expect_vector6(id, value)?)
        }
        FieldId::ActualJointVoltages => {
            set_vector6(&mut state.actual_joint_voltages, expect_vector6(id, value)?)
        }
        FieldId::JointModes => {
            let raw = value.vector6_int().ok_or_else(|| mismatch(id, value))?;
            let mut changed = false;
            for (joint, &code) in raw.iter().enumerate() {
                match JointMode::from_raw(code) {
                    Some(mode) => {
                        changed |= set_scalar(&mut state.joint_modes[joint], Some(mode));
                    }
                    None => log::warn!("Joint {} reported unknown mode {}", joint, code),
                }
            }
            changed
        }
        FieldId::ActualTcpPose => set_vector6(&mut state.actual_tcp_pose, expect_vector6(id, value)?),
        FieldId::ActualTcpSpeed => {
            set_vector6(&mut state.actual_tcp_speed, expect_vector6(id, value)?)
        }
        FieldId::ActualTcpForce => {
            set_vector6(&mut state.actual_tcp_force, expect_vector6(id, value)?)
        }
        FieldId::TargetTcpPose => set_vector6(&mut state.target_tcp_pose, expect_vector6(id, value)?),
        FieldId::TargetTcpSpeed => {
            set_vector6(&mut state.target_tcp_speed, expect_vector6(id, value)?)
        }
        FieldId::TcpForceScalar => set_scalar(&mut state.tcp_force_scalar, expect_double(id, value)?),
        FieldId::ActualToolAccelerometer => {
            let vector = value.vector3().ok_or_else(|| mismatch(id, value))?;
            set_vector3(&mut state.actual_tool_accelerometer, vector)
        }
        FieldId::ActualExecutionTime => {
            set_scalar(&mut state.actual_execution_time, expect_double(id, value)?)
        }
        FieldId::SpeedScaling => set_scalar(&mut state.speed_scaling, expect_double(id, value)?),
        FieldId::TargetSpeedFraction => {
            set_scalar(&mut state.target_speed_fraction, expect_double(id, value)?)
        }
        FieldId::ActualMomentum => set_scalar(&mut state.actual_momentum, expect_double(id, value)?),
        FieldId::ActualMainVoltage => {
            set_scalar(&mut state.actual_main_voltage, expect_double(id, value)?)
        }
        FieldId::ActualRobotVoltage => {
            set_scalar(&mut state.actual_robot_voltage, expect_double(id, value)?)
        }
        FieldId::ActualRobotCurrent => {
            set_scalar(&mut state.actual_robot_current, expect_double(id, value)?)
        }
        FieldId::RobotMode => {
            let raw = expect_integer(id, value)? as u32;
            match RobotMode::from_raw(raw) {
                Some(mode) => set_scalar(&mut state.robot_mode, mode),
                None => {
                    log::warn!("Controller reported unknown robot mode {}", raw);
                    false
                }
            }
        }
        FieldId::SafetyMode => {
            let raw = expect_integer(id, value)? as u32;
            match SafetyMode::from_raw(raw) {
                Some(mode) => set_scalar(&mut state.safety_mode, mode),
                None => {
                    log::warn!("Controller reported unknown safety mode {}", raw);
                    false
                }
            }
        }
        FieldId::RuntimeState => {
            let raw = expect_integer(id, value)? as u32;
            match RuntimeState::from_raw(raw) {
                Some(runtime) => set_scalar(&mut state.runtime_state, runtime),
                None => {
                    log::warn!("Controller reported unknown runtime state {}", raw);
                    false
                }
            }
        }
        FieldId::RobotStatusBits => {
            let status = RobotStatus::from_bits(expect_integer(id, value)? as u32);
            set_scalar(&mut state.robot_status, status)
        }
        FieldId::SafetyStatusBits => {
            let status = SafetyStatus::from_bits(expect_integer(id, value)? as u32);
            set_scalar(&mut state.safety_status, status)
        }
        FieldId::DigitalInputBits => {
            let bits = expect_integer(id, value)?;
            let standard = set_scalar(
                &mut state.standard_digital_inputs,
                DigitalBits((bits & 0xFF) as u8),
            );
            let configurable = set_scalar(
                &mut state.configurable_digital_inputs,
                DigitalBits(((bits >> 8) & 0xFF) as u8),
            );
            standard || configurable
        }
        FieldId::DigitalOutputBits => {
            let bits = expect_integer(id, value)?;
            let standard = set_scalar(
                &mut state.standard_digital_outputs,
                DigitalBits((bits & 0xFF) as u8),
            );
            let configurable = set_scalar(
                &mut state.configurable_digital_outputs,
                DigitalBits(((bits >> 8) & 0xFF) as u8),
            );
            standard || configurable
        }
        FieldId::AnalogIoTypes => {
            set_scalar(&mut state.analog_io_types, expect_integer(id, value)? as u32)
        }
        FieldId::StandardAnalogInput0 => {
            set_scalar(&mut state.standard_analog_input[0], expect_double(id, value)?)
        }
        FieldId::StandardAnalogInput1 => {
            set_scalar(&mut state.standard_analog_input[1], expect_double(id, value)?)
        }
        FieldId::StandardAnalogOutput0 => set_scalar(
            &mut state.standard_analog_output[0],
            expect_double(id, value)?,
        ),
        FieldId::StandardAnalogOutput1 => set_scalar(
            &mut state.standard_analog_output[1],
            expect_double(id, value)?,
        ),
        FieldId::IoCurrent => set_scalar(&mut state.io_current, expect_double(id, value)?),
        FieldId::ToolMode => set_scalar(&mut state.tool_mode, expect_integer(id, value)? as u32),
        FieldId::ToolAnalogInputTypes => set_scalar(
            &mut state.tool_analog_input_types,
            expect_integer(id, value)? as u32,
        ),
        FieldId::ToolAnalogInput0 => {
            set_scalar(&mut state.tool_analog_input[0], expect_double(id, value)?)
        }
        FieldId::ToolAnalogInput1 => {
            set_scalar(&mut state.tool_analog_input[1], expect_double(id, value)?)
        }
        FieldId::ToolOutputVoltage => {
            let raw = expect_integer(id, value)? as u32 as i32;
            set_scalar(&mut state.tool_output_voltage, raw)
        }
        FieldId::ToolOutputCurrent => {
            set_scalar(&mut state.tool_output_current, expect_double(id, value)?)
        }
        FieldId::ToolTemperature => {
            set_scalar(&mut state.tool_temperature, expect_double(id, value)?)
        }
        FieldId::Euromap67InputBits => set_scalar(
            &mut state.euromap67_input_bits,
            expect_integer(id, value)? as u32,
        ),
        FieldId::Euromap67OutputBits => set_scalar(
            &mut state.euromap67_output_bits,
            expect_integer(id, value)? as u32,
        ),
        FieldId::Euromap67Voltage => {
            set_scalar(&mut state.euromap67_voltage, expect_double(id, value)?)
        }
        FieldId::Euromap67Current => {
            set_scalar(&mut state.euromap67_current, expect_double(id, value)?)
        }
        FieldId::OutputBitRegistersLow => set_scalar(
            &mut state.output_bit_registers[0],
            expect_integer(id, value)? as u32,
        ),
        FieldId::OutputBitRegistersHigh => set_scalar(
            &mut state.output_bit_registers[1],
            expect_integer(id, value)? as u32,
        ),
        FieldId::OutputIntRegister(index) => {
            let raw = expect_integer(id, value)? as u32 as i32;
            set_scalar(&mut state.output_int_registers[index as usize], raw)
        }
        FieldId::OutputDoubleRegister(index) => set_scalar(
            &mut state.output_double_registers[index as usize],
            expect_double(id, value)?,
        ),
        FieldId::Ignored => false,
    };
    if changed {
        log::trace!("{:?} changed", id);
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(FieldId::resolve("timestamp"), Some(FieldId::Timestamp));
        assert_eq!(FieldId::resolve("actual_q"), Some(FieldId::ActualJointPositions));
        assert_eq!(FieldId::resolve("actual_TCP_pose"), Some(FieldId::ActualTcpPose));
        assert_eq!(
            FieldId::resolve("euromap67_24V_voltage"),
            Some(FieldId::Euromap67Voltage)
        );
        assert_eq!(FieldId::resolve("made_up_field"), None);
    }

    #[test]
    fn test_resolve_register_names() {
        assert_eq!(
            FieldId::resolve("output_int_register_0"),
            Some(FieldId::OutputIntRegister(0))
        );
        assert_eq!(
            FieldId::resolve("output_double_register_23"),
            Some(FieldId::OutputDoubleRegister(23))
        );
        assert_eq!(FieldId::resolve("output_int_register_24"), None);
        assert_eq!(FieldId::resolve("output_int_register_x"), None);
    }

    #[test]
    fn test_apply_suppresses_identical_writes() {
        let mut state = RobotState::default();
        let value = FieldValue::Double(7.5);
        assert!(apply(&mut state, FieldId::Timestamp, &value).unwrap());
        assert!(!apply(&mut state, FieldId::Timestamp, &value).unwrap());
        assert_eq!(state.timestamp, 7.5);
    }

    #[test]
    fn test_apply_rejects_type_mismatch() {
        let mut state = RobotState::default();
        let value = FieldValue::Double(1.0);
        assert!(apply(&mut state, FieldId::ActualJointPositions, &value).is_err());
    }

    #[test]
    fn test_digital_bits_split_into_banks() {
        let mut state = RobotState::default();
        let value = FieldValue::UInt64(0x0203);
        assert!(apply(&mut state, FieldId::DigitalInputBits, &value).unwrap());
        assert_eq!(state.standard_digital_inputs, DigitalBits(0x03));
        assert_eq!(state.configurable_digital_inputs, DigitalBits(0x02));
    }

    #[test]
    fn test_unknown_mode_value_keeps_previous() {
        let mut state = RobotState::default();
        assert!(apply(&mut state, FieldId::RobotMode, &FieldValue::Int32(7)).unwrap());
        assert_eq!(state.robot_mode, RobotMode::Running);
        assert!(!apply(&mut state, FieldId::RobotMode, &FieldValue::Int32(99)).unwrap());
        assert_eq!(state.robot_mode, RobotMode::Running);
    }

    #[test]
    fn test_vector_tolerance_gates_changes() {
        let mut state = RobotState::default();
        let pose = FieldValue::Vector6D(Vector6D::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0));
        assert!(apply(&mut state, FieldId::ActualTcpPose, &pose).unwrap());

        let nudged = FieldValue::Vector6D(Vector6D::new(0.1 + 1e-7, 0.2, 0.3, 0.0, 0.0, 0.0));
        assert!(!apply(&mut state, FieldId::ActualTcpPose, &nudged).unwrap());

        let moved = FieldValue::Vector6D(Vector6D::new(0.2, 0.2, 0.3, 0.0, 0.0, 0.0));
        assert!(apply(&mut state, FieldId::ActualTcpPose, &moved).unwrap());
    }

    #[test]
    fn test_register_banks() {
        let mut state = RobotState::default();
        assert!(apply(
            &mut state,
            FieldId::OutputIntRegister(5),
            &FieldValue::Int32(-42)
        )
        .unwrap());
        assert_eq!(state.output_int_registers[5], -42);

        assert!(apply(
            &mut state,
            FieldId::OutputDoubleRegister(23),
            &FieldValue::Double(2.75)
        )
        .unwrap());
        assert_eq!(state.output_double_registers[23], 2.75);
    }
}
