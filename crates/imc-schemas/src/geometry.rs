//! Rigid-body geometry: translation, rotation, pose composition.
//!
//! Quaternions are stored `(x, y, z, w)`; `w` is the scalar part.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, o: &Vector3) -> Vector3 {
        Vector3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    fn cross(&self, o: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    fn scale(&self, s: f64) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Component-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, o: &Vector3, eps: f64) -> bool {
        (self.x - o.x).abs() <= eps && (self.y - o.y).abs() <= eps && (self.z - o.z).abs() <= eps
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about the +Z axis.
    pub fn from_yaw(angle: f64) -> Self {
        let half = angle * 0.5;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Unit quaternion in the same direction.
    ///
    /// A zero quaternion (common for "unset" orientations on the wire) is
    /// treated as identity rather than producing NaNs.
    pub fn normalized(&self) -> Quaternion {
        let n = self.norm();
        if n <= f64::EPSILON {
            return Quaternion::IDENTITY;
        }
        Quaternion::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }

    /// Hamilton product `self * rhs` (apply `rhs` first, then `self`).
    pub fn mul(&self, rhs: &Quaternion) -> Quaternion {
        Quaternion::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    pub fn conjugate(&self) -> Quaternion {
        Quaternion::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector by this (assumed unit) quaternion.
    pub fn rotate(&self, v: &Vector3) -> Vector3 {
        // v' = v + 2w(u x v) + 2u x (u x v)
        let u = Vector3::new(self.x, self.y, self.z);
        let t = u.cross(v).scale(2.0);
        v.add(&t.scale(self.w)).add(&u.cross(&t))
    }

    /// Equality up to sign (q and -q encode the same rotation).
    pub fn approx_eq(&self, o: &Quaternion, eps: f64) -> bool {
        let same = (self.x - o.x).abs() <= eps
            && (self.y - o.y).abs() <= eps
            && (self.z - o.z).abs() <= eps
            && (self.w - o.w).abs() <= eps;
        let flipped = (self.x + o.x).abs() <= eps
            && (self.y + o.y).abs() <= eps
            && (self.z + o.z).abs() <= eps
            && (self.w + o.w).abs() <= eps;
        same || flipped
    }
}

/// Position + orientation of a child frame expressed in its parent frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vector3::ZERO,
        orientation: Quaternion::IDENTITY,
    };

    pub fn new(position: Vector3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vector3::new(x, y, z), Quaternion::IDENTITY)
    }

    /// `self ∘ rhs`: if `self` maps frame B into frame A and `rhs` is a pose
    /// in frame B, the result is the same pose expressed in frame A.
    pub fn compose(&self, rhs: &Pose) -> Pose {
        let q = self.orientation.normalized();
        Pose {
            position: self.position.add(&q.rotate(&rhs.position)),
            orientation: q.mul(&rhs.orientation.normalized()).normalized(),
        }
    }

    /// Inverse transform (maps A back into B).
    pub fn inverse(&self) -> Pose {
        let q_inv = self.orientation.normalized().conjugate();
        let p = q_inv.rotate(&self.position);
        Pose {
            position: Vector3::new(-p.x, -p.y, -p.z),
            orientation: q_inv,
        }
    }

    pub fn approx_eq(&self, o: &Pose, eps: f64) -> bool {
        self.position.approx_eq(&o.position, eps)
            && self.orientation.approx_eq(&o.orientation, eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    #[test]
    fn yaw_quarter_turn_rotates_x_onto_y() {
        let q = Quaternion::from_yaw(FRAC_PI_2);
        let v = q.rotate(&Vector3::new(1.0, 0.0, 0.0));
        assert!(v.approx_eq(&Vector3::new(0.0, 1.0, 0.0), EPS), "{v:?}");
    }

    #[test]
    fn compose_applies_rotation_before_translation() {
        // Frame B sits at (1,0,0) in A, rotated 90° about Z.
        let a_from_b = Pose::new(Vector3::new(1.0, 0.0, 0.0), Quaternion::from_yaw(FRAC_PI_2));
        let in_b = Pose::from_translation(2.0, 0.0, 0.0);

        let in_a = a_from_b.compose(&in_b);
        assert!(in_a.position.approx_eq(&Vector3::new(1.0, 2.0, 0.0), EPS));
        assert!(in_a
            .orientation
            .approx_eq(&Quaternion::from_yaw(FRAC_PI_2), EPS));
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let p = Pose::new(Vector3::new(0.3, -2.0, 5.0), Quaternion::from_yaw(0.7));
        let id = p.compose(&p.inverse());
        assert!(id.approx_eq(&Pose::IDENTITY, EPS), "{id:?}");
    }

    #[test]
    fn zero_quaternion_normalizes_to_identity() {
        let z = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(z.normalized(), Quaternion::IDENTITY);
    }
}
