//! Geometric state shared by the kinematics, gait and filter modules.
//!
//! All positions are in meters in the body-centered frame: x forward, y up, z right,
//! ground at `y = 0`.
use core::ops::{Add, Mul, Sub};

use crate::config::{BodyGeometry, StanceConfig};
use crate::robot::leg::{Leg, LEGS};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ZERO: Point3 = Point3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn norm(self) -> f32 {
        libm::sqrtf(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Rotates the point about the vertical axis.
    pub fn rotate_about_y(self, angle: f32) -> Self {
        let (sin, cos) = (libm::sinf(angle), libm::cosf(angle));
        Self {
            x: cos * self.x + sin * self.z,
            y: self.y,
            z: -sin * self.x + cos * self.z,
        }
    }

    pub fn lerp(self, other: Point3, t: f32) -> Self {
        self + (other - self) * t
    }

    pub fn as_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Point3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Point3;

    fn mul(self, rhs: f32) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Body orientation in radians: roll about x, yaw about y, pitch about z.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyAngles {
    pub omega: f32,
    pub phi: f32,
    pub psi: f32,
}

impl BodyAngles {
    pub const fn new(omega: f32, phi: f32, psi: f32) -> Self {
        Self { omega, phi, psi }
    }
}

/// Joint angles of one leg in radians (hip yaw, hip pitch, knee).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointAngles {
    pub th1: f32,
    pub th2: f32,
    pub th3: f32,
}

impl JointAngles {
    pub fn is_finite(&self) -> bool {
        self.th1.is_finite() && self.th2.is_finite() && self.th3.is_finite()
    }
}

/// Foot positions indexed by [`Leg`].
pub type FeetPositions = [Point3; 4];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyState {
    pub position: Point3,
    pub angles: BodyAngles,
    pub feet: FeetPositions,
}

impl BodyState {
    /// Body standing at `height` above its neutral feet.
    pub fn standing(geometry: &BodyGeometry, stance: &StanceConfig) -> Self {
        Self {
            position: Point3::new(0.0, stance.default_stand_height, 0.0),
            angles: BodyAngles::default(),
            feet: neutral_stance(geometry, stance),
        }
    }

    /// Body lowered onto the ground with the feet pushed forward.
    pub fn lying_down(geometry: &BodyGeometry, stance: &StanceConfig) -> Self {
        let mut feet = [Point3::ZERO; 4];
        for leg in LEGS {
            feet[leg] = foot_anchor(geometry, leg, stance.lie_down_feet_x_offset);
        }
        Self {
            position: Point3::new(0.0, stance.lie_down_height, 0.0),
            angles: BodyAngles::default(),
            feet,
        }
    }
}

/// Default foot placement under each shoulder, on the ground.
pub fn neutral_stance(geometry: &BodyGeometry, stance: &StanceConfig) -> FeetPositions {
    let mut feet = [Point3::ZERO; 4];
    for leg in LEGS {
        let x_offset = if leg.is_front() {
            stance.stand_front_x_offset
        } else {
            stance.stand_back_x_offset
        };
        feet[leg] = foot_anchor(geometry, leg, x_offset);
    }
    feet
}

fn foot_anchor(geometry: &BodyGeometry, leg: Leg, x_offset: f32) -> Point3 {
    let half_length = geometry.body_length / 2.0;
    let lateral = geometry.body_width / 2.0 + geometry.hip_link_length;
    let x = if leg.is_front() { half_length } else { -half_length } + x_offset;
    let z = if leg.is_left() { -lateral } else { lateral };
    Point3::new(x, 0.0, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use approx::assert_abs_diff_eq;

    #[test]
    fn neutral_stance_is_symmetric() {
        let config = RobotConfig::DEFAULT;
        let feet = neutral_stance(&config.geometry, &config.stance);
        assert_abs_diff_eq!(feet[Leg::FrontLeft].x, 0.093 + 0.015, epsilon = 1e-6);
        assert_abs_diff_eq!(feet[Leg::FrontLeft].z, -feet[Leg::FrontRight].z, epsilon = 1e-6);
        assert_abs_diff_eq!(feet[Leg::RearRight].z, 0.039 + 0.055, epsilon = 1e-6);
        assert_abs_diff_eq!(feet[Leg::RearLeft].x, -0.093, epsilon = 1e-6);
    }

    #[test]
    fn rotation_about_y_preserves_height_and_norm() {
        let p = Point3::new(0.1, 0.02, -0.05);
        let r = p.rotate_about_y(0.7);
        assert_abs_diff_eq!(r.y, p.y);
        assert_abs_diff_eq!(r.norm(), p.norm(), epsilon = 1e-6);
        let back = r.rotate_about_y(-0.7);
        assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-6);
        assert_abs_diff_eq!(back.z, p.z, epsilon = 1e-6);
    }
}
