//! Session and robot mode enumerations

/// Lifecycle of the telemetry session as seen by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Error = 0,
    Disconnected = 1,
    Connected = 2,
    Paused = 3,
    Started = 4,
}

impl ConnectionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Disconnected,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Paused,
            4 => ConnectionState::Started,
            _ => ConnectionState::Error,
        }
    }
}

/// Whether a dispatched program is currently executing.
///
/// Uninitialized until the first program is sent, then alternating between
/// Idle and Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeState {
    #[default]
    Uninitialized = 0,
    Idle = 1,
    Running = 2,
}

impl RuntimeState {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(RuntimeState::Uninitialized),
            1 => Some(RuntimeState::Idle),
            2 => Some(RuntimeState::Running),
            _ => None,
        }
    }
}

/// Controller-reported robot mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotMode {
    #[default]
    Disconnected = 0,
    ConfirmSafety = 1,
    Booting = 2,
    PowerOff = 3,
    PowerOn = 4,
    Idle = 5,
    Backdrive = 6,
    Running = 7,
    UpdatingFirmware = 8,
}

impl RobotMode {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(RobotMode::Disconnected),
            1 => Some(RobotMode::ConfirmSafety),
            2 => Some(RobotMode::Booting),
            3 => Some(RobotMode::PowerOff),
            4 => Some(RobotMode::PowerOn),
            5 => Some(RobotMode::Idle),
            6 => Some(RobotMode::Backdrive),
            7 => Some(RobotMode::Running),
            8 => Some(RobotMode::UpdatingFirmware),
            _ => None,
        }
    }
}

/// Controller-reported safety mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyMode {
    #[default]
    Normal = 1,
    Reduced = 2,
    ProtectiveStop = 3,
    Recovery = 4,
    SafeguardStop = 5,
    SystemEmergencyStop = 6,
    RobotEmergencyStop = 7,
    Violation = 8,
    Fault = 9,
}

impl SafetyMode {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(SafetyMode::Normal),
            2 => Some(SafetyMode::Reduced),
            3 => Some(SafetyMode::ProtectiveStop),
            4 => Some(SafetyMode::Recovery),
            5 => Some(SafetyMode::SafeguardStop),
            6 => Some(SafetyMode::SystemEmergencyStop),
            7 => Some(SafetyMode::RobotEmergencyStop),
            8 => Some(SafetyMode::Violation),
            9 => Some(SafetyMode::Fault),
            _ => None,
        }
    }
}

/// Per-joint mode reported in the `joint_mode` vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointMode {
    ShuttingDown = 236,
    PartDCalibration = 237,
    Backdrive = 238,
    PowerOff = 239,
    NotResponding = 245,
    MotorInitialization = 246,
    Booting = 247,
    PartDCalibrationError = 248,
    Bootloader = 249,
    Calibration = 250,
    Fault = 252,
    Running = 253,
    Idle = 255,
}

impl JointMode {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            236 => Some(JointMode::ShuttingDown),
            237 => Some(JointMode::PartDCalibration),
            238 => Some(JointMode::Backdrive),
            239 => Some(JointMode::PowerOff),
            245 => Some(JointMode::NotResponding),
            246 => Some(JointMode::MotorInitialization),
            247 => Some(JointMode::Booting),
            248 => Some(JointMode::PartDCalibrationError),
            249 => Some(JointMode::Bootloader),
            250 => Some(JointMode::Calibration),
            252 => Some(JointMode::Fault),
            253 => Some(JointMode::Running),
            255 => Some(JointMode::Idle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_round_trip() {
        assert_eq!(
            ConnectionState::from_u8(ConnectionState::Started as u8),
            ConnectionState::Started
        );
        assert_eq!(ConnectionState::from_u8(99), ConnectionState::Error);
    }

    #[test]
    fn test_runtime_state_from_raw() {
        assert_eq!(RuntimeState::from_raw(2), Some(RuntimeState::Running));
        assert_eq!(RuntimeState::from_raw(7), None);
    }

    #[test]
    fn test_robot_mode_bounds() {
        assert_eq!(RobotMode::from_raw(7), Some(RobotMode::Running));
        assert_eq!(RobotMode::from_raw(9), None);
    }

    #[test]
    fn test_safety_mode_has_no_zero() {
        assert_eq!(SafetyMode::from_raw(0), None);
        assert_eq!(SafetyMode::from_raw(9), Some(SafetyMode::Fault));
    }

    #[test]
    fn test_joint_mode_from_raw() {
        assert_eq!(JointMode::from_raw(255), Some(JointMode::Idle));
        assert_eq!(JointMode::from_raw(0), None);
    }
}
