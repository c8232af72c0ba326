//! Vector types carried by the telemetry stream

/// Cartesian pose or 6-axis joint vector (position/speed/force, depending on field)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector6D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Vector6D {
    pub fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_array(v: [f64; 6]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
            rx: v[3],
            ry: v[4],
            rz: v[5],
        }
    }

    pub fn to_array(self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }

    /// Element-wise comparison with absolute tolerance.
    ///
    /// Telemetry repeats poses with sub-micron jitter; the state model uses
    /// this to decide whether a write is a real change.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        let a = self.to_array();
        let b = other.to_array();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
    }
}

/// 3-axis vector (tool accelerometer)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector6d_array_round_trip() {
        let v = Vector6D::from_array([0.1, -0.2, 0.3, 1.0, -1.5, 3.14]);
        assert_eq!(v.to_array(), [0.1, -0.2, 0.3, 1.0, -1.5, 3.14]);
        assert_eq!(v.rz, 3.14);
    }

    #[test]
    fn test_vector6d_approx_eq_within_tolerance() {
        let a = Vector6D::from_array([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let b = Vector6D::from_array([0.100_004, 0.2, 0.3, 0.4, 0.5, 0.599_996]);
        assert!(a.approx_eq(&b, 0.00001));
        let c = Vector6D::from_array([0.1002, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!(!a.approx_eq(&c, 0.00001));
    }

    #[test]
    fn test_vector3d_approx_eq() {
        let a = Vector3D::new(9.81, 0.0, 0.0);
        let b = Vector3D::new(9.810_001, 0.0, 0.0);
        assert!(a.approx_eq(&b, 0.00001));
        assert!(!a.approx_eq(&Vector3D::zero(), 0.00001));
    }
}
