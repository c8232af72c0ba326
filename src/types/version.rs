//! Controller software version

use std::fmt;

/// Software version reported by the controller during the handshake.
///
/// Controllers older than 3.2.19171 speak an incompatible variant of the
/// real-time protocol and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerVersion {
    pub major: u32,
    pub minor: u32,
    pub bugfix: u32,
    pub build: u32,
}

impl ControllerVersion {
    pub fn new(major: u32, minor: u32, bugfix: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            bugfix,
            build,
        }
    }

    /// Minimum supported controller release (3.2.19171).
    pub fn meets_minimum(&self) -> bool {
        (self.major, self.minor, self.bugfix) >= (3, 2, 19171)
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}-{}",
            self.major, self.minor, self.bugfix, self.build
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_version_boundary() {
        assert!(ControllerVersion::new(3, 2, 19171, 0).meets_minimum());
        assert!(!ControllerVersion::new(3, 2, 19170, 0).meets_minimum());
        assert!(ControllerVersion::new(3, 3, 0, 0).meets_minimum());
        assert!(ControllerVersion::new(5, 12, 0, 1101848).meets_minimum());
        assert!(!ControllerVersion::new(1, 8, 0, 0).meets_minimum());
    }

    #[test]
    fn test_display() {
        let v = ControllerVersion::new(5, 12, 0, 1101848);
        assert_eq!(v.to_string(), "5.12.0-1101848");
    }
}
