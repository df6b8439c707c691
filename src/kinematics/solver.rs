//! Closed-form leg inverse kinematics and the matching forward kinematics.
//!
//! Each leg is a three link chain: a hip link `l1` rotated by the hip yaw `th1`, then an
//! upper leg `l2` and lower leg `l3` in the plane selected by the hip pitch `th2` and knee
//! `th3`. Targets are first moved from the body frame into the leg frame through
//! [`leg_frame`] and [`body_transform`].
//!
//! The solver never fails: every square root and inverse trigonometric input is clamped,
//! and [`LegSolution::clamped`] tells the caller whether the target had to be bent into
//! the reachable workspace.
use core::f32::consts::FRAC_PI_2;

use crate::config::BodyGeometry;
use crate::kinematics::transform::Transform;
use crate::robot::leg::{Leg, LEGS};
use crate::robot::state::{BodyAngles, BodyState, FeetPositions, JointAngles, Point3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkLengths {
    pub l1: f32,
    pub l2: f32,
    pub l3: f32,
}

impl From<&BodyGeometry> for LinkLengths {
    fn from(geometry: &BodyGeometry) -> Self {
        Self {
            l1: geometry.hip_link_length,
            l2: geometry.upper_leg_link_length,
            l3: geometry.lower_leg_link_length,
        }
    }
}

impl LinkLengths {
    /// Distance range from the hip pitch joint that the foot can reach.
    pub fn reach(&self) -> (f32, f32) {
        (libm::fabsf(self.l2 - self.l3), self.l2 + self.l3)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegSolution {
    pub angles: JointAngles,
    /// Set when the target lay outside the reachable workspace.
    pub clamped: bool,
}

/// Solves one leg for a target in its local frame.
///
/// The knee always takes the negative branch. Mirrored mounting of the right side servos
/// is carried by their calibration `direction`, not by the solver.
pub fn inverse_kinematics(target: Point3, links: &LinkLengths) -> LegSolution {
    if !target.is_finite() {
        return LegSolution {
            angles: JointAngles::default(),
            clamped: true,
        };
    }
    let Point3 { x, y, z } = target;
    let LinkLengths { l1, l2, l3 } = *links;

    let raw_d = (x * x + y * y + z * z - l1 * l1 - l2 * l2 - l3 * l3) / (2.0 * l2 * l3);
    let d = raw_d.clamp(-1.0, 1.0);
    let planar_sq = x * x + y * y - l1 * l1;
    let clamped = raw_d != d || planar_sq < 0.0;
    let planar = libm::sqrtf(planar_sq.max(0.0));

    let knee = libm::sqrtf((1.0 - d * d).max(0.0));
    let th3 = libm::atan2f(-knee, d);
    let th2 = libm::atan2f(z, planar)
        - libm::atan2f(l3 * libm::sinf(th3), l2 + l3 * libm::cosf(th3));
    let th1 = libm::atan2f(y, x) + libm::atan2f(planar, -l1);

    LegSolution {
        angles: JointAngles { th1, th2, th3 },
        clamped,
    }
}

/// Foot position in the leg frame for the given joint angles.
pub fn forward_kinematics(angles: &JointAngles, links: &LinkLengths) -> Point3 {
    leg_chain(angles, links).translation_part()
}

fn leg_chain(angles: &JointAngles, links: &LinkLengths) -> Transform {
    let hip = Transform::rotation_z(angles.th1).with_translation(Point3::new(
        -links.l1 * libm::cosf(angles.th1),
        -links.l1 * libm::sinf(angles.th1),
        0.0,
    ));
    let pitch_frame = Transform {
        m: [
            [0.0, 0.0, -1.0, 0.0],
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
    hip * pitch_frame * link(angles.th2, links.l2) * link(angles.th3, links.l3)
}

fn link(angle: f32, length: f32) -> Transform {
    Transform::rotation_z(angle).with_translation(Point3::new(
        length * libm::cosf(angle),
        length * libm::sinf(angle),
        0.0,
    ))
}

/// Transform from the body center to the shoulder frame of `leg`.
pub fn leg_frame(leg: Leg, geometry: &BodyGeometry) -> Transform {
    let yaw = if leg.is_left() { -FRAC_PI_2 } else { FRAC_PI_2 };
    let x = if leg.is_front() {
        geometry.body_length / 2.0
    } else {
        -geometry.body_length / 2.0
    };
    let z = if leg.is_left() {
        -geometry.body_width / 2.0
    } else {
        geometry.body_width / 2.0
    };
    Transform::rotation_y(yaw).with_translation(Point3::new(x, 0.0, z))
}

pub fn body_transform(position: Point3, angles: &BodyAngles) -> Transform {
    Transform::translation(position.x, position.y, position.z)
        * Transform::rotation_xyz(angles.omega, angles.phi, angles.psi)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodySolution {
    pub legs: [LegSolution; 4],
}

impl BodySolution {
    pub fn is_reachable(&self) -> bool {
        self.legs.iter().all(|leg| !leg.clamped)
    }

    pub fn joint_angles(&self) -> [JointAngles; 4] {
        self.legs.map(|leg| leg.angles)
    }
}

/// Whole-body solver bound to one robot geometry.
#[derive(Debug, Clone, Copy)]
pub struct Kinematics {
    geometry: BodyGeometry,
    links: LinkLengths,
    leg_frames: [Transform; 4],
}

impl Kinematics {
    pub fn new(geometry: &BodyGeometry) -> Self {
        Self {
            geometry: *geometry,
            links: LinkLengths::from(geometry),
            leg_frames: LEGS.map(|leg| leg_frame(leg, geometry)),
        }
    }

    pub fn links(&self) -> &LinkLengths {
        &self.links
    }

    pub fn geometry(&self) -> &BodyGeometry {
        &self.geometry
    }

    /// Moves a body-frame foot position into the frame of `leg`.
    pub fn to_leg_frame(&self, leg: Leg, position: Point3, angles: &BodyAngles, foot: Point3) -> Point3 {
        (body_transform(position, angles) * self.leg_frames[leg])
            .inverse()
            .apply(foot)
    }

    pub fn solve(&self, body: &BodyState) -> BodySolution {
        let mut solution = BodySolution::default();
        for leg in LEGS {
            let local = self.to_leg_frame(leg, body.position, &body.angles, body.feet[leg]);
            solution.legs[leg] = inverse_kinematics(local, &self.links);
        }
        solution
    }

    /// Foot positions in the body frame reached by the given joint angles.
    pub fn feet_positions(
        &self,
        position: Point3,
        angles: &BodyAngles,
        joints: &[JointAngles; 4],
    ) -> FeetPositions {
        let body = body_transform(position, angles);
        LEGS.map(|leg| {
            (body * self.leg_frames[leg]).apply(forward_kinematics(&joints[leg], &self.links))
        })
    }
}
