//! Core math types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn mag(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; zero vectors stay zero.
    pub fn unit(&self) -> Vec3 {
        let m = self.mag();
        if m == 0.0 {
            return Vec3::zero();
        }
        Vec3::new(self.x / m, self.y / m, self.z / m)
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        (*other - *self).mag()
    }

    pub fn scale(&self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Decode from a JSON `[x, y, z]` list. Anything else is `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Vec3> {
        let list = value.as_array()?;
        if list.len() != 3 {
            return None;
        }
        Some(Vec3::new(
            list[0].as_f64()?,
            list[1].as_f64()?,
            list[2].as_f64()?,
        ))
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!([self.x, self.y, self.z])
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Unit quaternion used for entity orientation.
///
/// Frame transforms fall back to the identity rotation when an orientation
/// is missing or not normalised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn is_valid(&self) -> bool {
        let n = self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z;
        (n - 1.0).abs() < 1e-6
    }

    /// Hamilton product `self * rhs`.
    pub fn multiply(&self, rhs: &Quaternion) -> Quaternion {
        Quaternion::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(&self, v: &Vec3) -> Vec3 {
        // v' = q * (0, v) * q^-1, expanded for unit quaternions.
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = cross(&qv, v);
        let uuv = cross(&qv, &uv);
        *v + uv.scale(2.0 * self.w) + uuv.scale(2.0)
    }
}

fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}
