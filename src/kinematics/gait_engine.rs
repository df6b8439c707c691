//! Phase scheduled walking gait.
//!
//! The walk cycle is cut in 4 or 8 phases. In every phase each leg is either planted
//! (stance) or airborne (swing) according to its contact table. Stance feet slide against
//! the commanded velocity; swing feet follow a triangular height profile towards a
//! predicted touchdown point. The 8 phase schedule also shifts the body over the
//! supporting legs before each swing.
use log::debug;

use crate::config::{BodyGeometry, GaitConfig, StanceConfig, MAX_PHASES};
use crate::robot::leg::{Leg, LEGS};
use crate::robot::state::{neutral_stance, FeetPositions, Point3};

/// Phase timing derived once from [`GaitConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaitPhaseConfig {
    pub num_phases: usize,
    pub phase_ticks: [u32; MAX_PHASES],
    pub phase_length: u32,
    pub swing_ticks: u32,
    pub stance_ticks: u32,
    pub contact_phases: [[u8; MAX_PHASES]; 4],
}

impl GaitPhaseConfig {
    pub fn new(gait: &GaitConfig) -> Self {
        let swing_ticks = (libm::roundf(gait.swing_time / gait.dt) as u32).max(1);
        let overlap_ticks = (libm::roundf(gait.overlap_time / gait.dt).max(0.0)) as u32;

        let mut phase_ticks = [0; MAX_PHASES];
        let (num_phases, stance_ticks) = if gait.num_phases == 4 {
            phase_ticks[..4].copy_from_slice(&[overlap_ticks, swing_ticks, overlap_ticks, swing_ticks]);
            (4, 2 * overlap_ticks + swing_ticks)
        } else {
            phase_ticks.fill(swing_ticks);
            (MAX_PHASES, 7 * swing_ticks)
        };

        Self {
            num_phases,
            phase_ticks,
            phase_length: phase_ticks[..num_phases].iter().sum(),
            swing_ticks,
            stance_ticks,
            contact_phases: gait.contact_phases,
        }
    }

    /// Phase index and ticks elapsed inside that phase for an absolute tick count.
    pub fn locate(&self, ticks: u64) -> (usize, u32) {
        let mut phase_time = (ticks % self.phase_length.max(1) as u64) as u32;
        for (index, &length) in self.phase_ticks[..self.num_phases].iter().enumerate() {
            if phase_time < length {
                return (index, phase_time);
            }
            phase_time -= length;
        }
        (self.num_phases - 1, 0)
    }

    pub fn in_swing(&self, leg: Leg, phase_index: usize) -> bool {
        self.contact_phases[leg][phase_index] == 0
    }

    /// Number of legs airborne during `phase_index`.
    pub fn swing_count(&self, phase_index: usize) -> usize {
        LEGS.iter().filter(|&&leg| self.in_swing(leg, phase_index)).count()
    }
}

/// Commanded body velocity: forward and lateral in m/s, yaw in rad/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityCommand {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl VelocityCommand {
    pub fn clamped(self, gait: &GaitConfig) -> Self {
        Self {
            x: self.x.clamp(-gait.max_fwd_velocity, gait.max_fwd_velocity),
            y: self.y.clamp(-gait.max_side_velocity, gait.max_side_velocity),
            yaw: self.yaw.clamp(-gait.max_yaw_rate, gait.max_yaw_rate),
        }
    }
}

/// One step of the gait: feet and body position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitFrame {
    pub feet: FeetPositions,
    pub body: Point3,
    pub phase_index: usize,
}

#[derive(Debug, Clone)]
pub struct GaitGenerator {
    config: GaitConfig,
    phases: GaitPhaseConfig,
    default_stance: FeetPositions,
    stand_height: f32,
    feet: FeetPositions,
    body: Point3,
    ticks: u64,
    phase_index: usize,
}

impl GaitGenerator {
    pub fn new(config: &GaitConfig, geometry: &BodyGeometry, stance: &StanceConfig) -> Self {
        let default_stance = neutral_stance(geometry, stance);
        Self {
            config: *config,
            phases: GaitPhaseConfig::new(config),
            default_stance,
            stand_height: stance.default_stand_height,
            feet: default_stance,
            body: Point3::new(0.0, stance.default_stand_height, 0.0),
            ticks: 0,
            phase_index: 0,
        }
    }

    pub fn phases(&self) -> &GaitPhaseConfig {
        &self.phases
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn feet(&self) -> &FeetPositions {
        &self.feet
    }

    pub fn body(&self) -> Point3 {
        self.body
    }

    pub fn frame(&self) -> GaitFrame {
        GaitFrame {
            feet: self.feet,
            body: self.body,
            phase_index: self.phase_index,
        }
    }

    /// Restarts the cycle from the neutral stance.
    pub fn reset(&mut self) {
        self.feet = self.default_stance;
        self.body = Point3::new(0.0, self.stand_height, 0.0);
        self.ticks = 0;
        self.phase_index = 0;
    }

    /// Advances the cycle by one tick and returns the new feet and body position.
    pub fn step(&mut self, command: VelocityCommand) -> GaitFrame {
        let command = command.clamped(&self.config);
        self.ticks += 1;
        let (phase_index, subphase_ticks) = self.phases.locate(self.ticks);
        if phase_index != self.phase_index {
            debug!("[MOTION_TASK] gait phase {phase_index}");
        }
        self.phase_index = phase_index;

        for leg in LEGS {
            self.feet[leg] = if self.phases.in_swing(leg, phase_index) {
                self.swing_leg(leg, subphase_ticks, &command)
            } else {
                self.stance_leg(self.feet[leg], &command)
            };
        }
        if self.phases.num_phases == MAX_PHASES {
            self.body = self.body_shift(phase_index, subphase_ticks);
        }
        self.frame()
    }

    fn stance_leg(&self, foot: Point3, command: &VelocityCommand) -> Point3 {
        let dt = self.config.dt;
        let rotated = foot.rotate_about_y(command.yaw * dt);
        rotated
            + Point3::new(
                -command.x * dt,
                (0.0 - foot.y) / self.config.foot_height_time_constant * dt,
                -command.y * dt,
            )
    }

    fn swing_leg(&self, leg: Leg, subphase_ticks: u32, command: &VelocityCommand) -> Point3 {
        let dt = self.config.dt;
        let swing_ticks = self.phases.swing_ticks as f32;
        let stance_time = self.phases.stance_ticks as f32 * dt;
        let t = (subphase_ticks as f32 / swing_ticks).clamp(0.0, 0.999);

        let height = if t < 0.5 {
            2.0 * self.config.z_clearance * t
        } else {
            2.0 * self.config.z_clearance * (1.0 - t)
        };

        let touchdown = self.default_stance[leg].rotate_about_y(-self.config.beta * stance_time * command.yaw)
            + Point3::new(
                self.config.alpha * stance_time * command.x,
                0.0,
                self.config.alpha * stance_time * command.y,
            );

        let foot = self.feet[leg];
        let remaining = (dt * swing_ticks * (1.0 - t)).max(1e-5);
        Point3::new(
            foot.x + (touchdown.x - foot.x) / remaining * dt,
            height,
            foot.z + (touchdown.z - foot.z) / remaining * dt,
        )
    }

    fn body_shift(&self, phase_index: usize, subphase_ticks: u32) -> Point3 {
        let fwd = self.config.fwd_body_balance_shift;
        let back = self.config.back_body_balance_shift;
        let side = self.config.side_body_balance_shift;
        // phase pairs: shift then hold over one diagonal
        let target = match phase_index / 2 {
            0 => (fwd, -side),
            1 => (-back, -side),
            2 => (fwd, side),
            _ => (-back, side),
        };

        let (x, z) = if phase_index % 2 == 1 {
            target
        } else {
            let remaining = (self.phases.phase_ticks[phase_index].saturating_sub(subphase_ticks)).max(1) as f32;
            (
                self.body.x + (target.0 - self.body.x) / remaining,
                self.body.z + (target.1 - self.body.z) / remaining,
            )
        };
        Point3::new(x, self.stand_height, z)
    }
}
