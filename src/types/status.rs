//! Status bit fields unpacked from telemetry words

/// One 8-bit bank of digital I/O lines.
///
/// The controller reports standard and configurable banks packed into the low
/// bytes of `actual_digital_input_bits` / `actual_digital_output_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalBits(pub u8);

impl DigitalBits {
    pub fn bit(&self, index: u8) -> bool {
        index < 8 && (self.0 >> index) & 1 == 1
    }

    pub fn set_bit(&mut self, index: u8, on: bool) {
        if index < 8 {
            if on {
                self.0 |= 1 << index;
            } else {
                self.0 &= !(1 << index);
            }
        }
    }
}

/// Flags from the `robot_status_bits` word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RobotStatus {
    pub power_on: bool,
    pub program_running: bool,
    pub teach_button_pressed: bool,
    pub power_button_pressed: bool,
}

impl RobotStatus {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            power_on: bits & 0x01 != 0,
            program_running: bits & 0x02 != 0,
            teach_button_pressed: bits & 0x04 != 0,
            power_button_pressed: bits & 0x08 != 0,
        }
    }
}

/// Flags from the `safety_status_bits` word.
///
/// Bits 0-7 live in the low byte, bits 8-10 in the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyStatus {
    pub normal_mode: bool,
    pub reduced_mode: bool,
    pub protective_stopped: bool,
    pub recovery_mode: bool,
    pub safeguard_stopped: bool,
    pub system_emergency_stopped: bool,
    pub robot_emergency_stopped: bool,
    pub emergency_stopped: bool,
    pub violation: bool,
    pub fault: bool,
    pub stopped_due_to_safety: bool,
}

impl SafetyStatus {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            normal_mode: bits & 0x0001 != 0,
            reduced_mode: bits & 0x0002 != 0,
            protective_stopped: bits & 0x0004 != 0,
            recovery_mode: bits & 0x0008 != 0,
            safeguard_stopped: bits & 0x0010 != 0,
            system_emergency_stopped: bits & 0x0020 != 0,
            robot_emergency_stopped: bits & 0x0040 != 0,
            emergency_stopped: bits & 0x0080 != 0,
            violation: bits & 0x0100 != 0,
            fault: bits & 0x0200 != 0,
            stopped_due_to_safety: bits & 0x0400 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_bits() {
        let mut bits = DigitalBits(0b0000_0101);
        assert!(bits.bit(0));
        assert!(!bits.bit(1));
        assert!(bits.bit(2));
        assert!(!bits.bit(9));
        bits.set_bit(7, true);
        assert_eq!(bits.0, 0b1000_0101);
        bits.set_bit(0, false);
        assert_eq!(bits.0, 0b1000_0100);
    }

    #[test]
    fn test_robot_status_from_bits() {
        let status = RobotStatus::from_bits(0b0011);
        assert!(status.power_on);
        assert!(status.program_running);
        assert!(!status.teach_button_pressed);
        assert!(!status.power_button_pressed);
    }

    #[test]
    fn test_safety_status_from_bits() {
        let status = SafetyStatus::from_bits(0x0001);
        assert!(status.normal_mode);
        assert!(!status.fault);

        let status = SafetyStatus::from_bits(0x0700);
        assert!(status.violation);
        assert!(status.fault);
        assert!(status.stopped_due_to_safety);
        assert!(!status.normal_mode);
    }
}
