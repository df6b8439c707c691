//! Walking session state: operator factors and the keyframe double buffer.
//!
//! The gait generator produces one [`Keyframe`] per gait tick. The walking speed decides
//! how many gait ticks elapse per control frame; between two ticks the feet are blended
//! from the previous keyframe to the next one.
use crate::config::{ControlConfig, GaitConfig};
use crate::kinematics::gait_engine::VelocityCommand;
use crate::robot::leg::LEGS;
use crate::robot::state::{FeetPositions, Point3};

/// The four foot positions at one instant of the walk cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keyframe {
    pub feet: FeetPositions,
}

impl Keyframe {
    pub fn new(feet: FeetPositions) -> Self {
        Self { feet }
    }

    pub fn lerp(&self, other: &Keyframe, ratio: f32) -> Keyframe {
        let mut feet = self.feet;
        for leg in LEGS {
            feet[leg] = self.feet[leg].lerp(other.feet[leg], ratio);
        }
        Keyframe { feet }
    }
}

/// Two keyframe slots and the index of the newest one.
///
/// Pushing writes a whole keyframe into the older slot and flips the index, so the pair
/// read by an interpolation is never half updated.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeBuffer {
    slots: [Keyframe; 2],
    next: usize,
}

impl KeyframeBuffer {
    pub fn new(start: Keyframe) -> Self {
        Self {
            slots: [start, start],
            next: 0,
        }
    }

    pub fn push(&mut self, keyframe: Keyframe) {
        self.next ^= 1;
        self.slots[self.next] = keyframe;
    }

    pub fn previous(&self) -> &Keyframe {
        &self.slots[self.next ^ 1]
    }

    pub fn next(&self) -> &Keyframe {
        &self.slots[self.next]
    }

    pub fn interpolate(&self, ratio: f32) -> Keyframe {
        self.previous().lerp(self.next(), ratio.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone)]
pub struct KeyframeService {
    control: ControlConfig,
    max_fwd_velocity: f32,
    max_yaw_rate: f32,
    buffer: KeyframeBuffer,
    forward_factor: f32,
    rotation_factor: f32,
    lean_factor: f32,
    height_factor: f32,
    walking_speed: u8,
    elapsed: f32,
}

impl KeyframeService {
    pub fn new(control: &ControlConfig, gait: &GaitConfig) -> Self {
        Self {
            control: *control,
            max_fwd_velocity: gait.max_fwd_velocity,
            max_yaw_rate: gait.max_yaw_rate,
            buffer: KeyframeBuffer::default(),
            forward_factor: 0.0,
            rotation_factor: 0.0,
            lean_factor: 0.0,
            height_factor: 0.0,
            walking_speed: control.max_walking_speed,
            elapsed: 0.0,
        }
    }

    pub fn forward_factor(&self) -> f32 {
        self.forward_factor
    }

    pub fn rotation_factor(&self) -> f32 {
        self.rotation_factor
    }

    pub fn lean_factor(&self) -> f32 {
        self.lean_factor
    }

    pub fn height_factor(&self) -> f32 {
        self.height_factor
    }

    pub fn walking_speed(&self) -> u8 {
        self.walking_speed
    }

    /// Fractional position between the previous and next keyframe.
    pub fn ratio(&self) -> f32 {
        self.elapsed - libm::floorf(self.elapsed)
    }

    pub fn buffer(&self) -> &KeyframeBuffer {
        &self.buffer
    }

    /// Starts a walking session from `start`.
    pub fn reset_walking_state(&mut self, start: Keyframe) {
        self.buffer = KeyframeBuffer::new(start);
        self.elapsed = 0.0;
    }

    pub fn set_forward_factor(&mut self, factor: f32) {
        self.forward_factor = factor.clamp(-1.0, 1.0);
    }

    /// Moves the rotation factor one increment towards the stick direction.
    pub fn set_rotation_factor(&mut self, factor: f32) {
        let step = self.control.rotation_increment;
        let factor = factor.clamp(-1.0, 1.0);
        self.rotation_factor = if factor > self.rotation_factor {
            (self.rotation_factor + step).min(factor)
        } else if factor < self.rotation_factor {
            (self.rotation_factor - step).max(factor)
        } else {
            factor
        };
    }

    pub fn set_lean(&mut self, lean: f32) {
        self.lean_factor = lean.clamp(-1.0, 1.0);
    }

    pub fn set_height_offset(&mut self, height: f32) {
        self.height_factor = height.clamp(-1.0, 1.0);
    }

    pub fn reset_movement(&mut self) {
        self.forward_factor = 0.0;
        self.rotation_factor = 0.0;
    }

    pub fn reset_body_adjustments(&mut self) {
        self.lean_factor = 0.0;
        self.height_factor = 0.0;
    }

    pub fn adjust_walking_speed(&mut self, delta: i8) {
        self.walking_speed = if delta > 0 {
            self.walking_speed.saturating_add(1).min(self.control.max_walking_speed)
        } else {
            self.walking_speed.saturating_sub(1).max(1)
        };
    }

    pub fn velocity_command(&self) -> VelocityCommand {
        VelocityCommand {
            x: self.forward_factor * self.max_fwd_velocity,
            y: 0.0,
            yaw: self.rotation_factor * self.max_yaw_rate,
        }
    }

    /// Body offset produced by the lean and height factors.
    pub fn body_offset(&self) -> Point3 {
        Point3::new(
            0.0,
            self.height_factor * self.control.max_height_offset,
            self.lean_factor * self.control.max_lean,
        )
    }

    /// Advances the walk clock by one frame and returns the number of gait ticks due.
    pub fn advance(&mut self) -> u32 {
        let before = libm::floorf(self.elapsed);
        self.elapsed += self.walking_speed as f32 / self.control.max_walking_speed as f32;
        let due = (libm::floorf(self.elapsed) - before) as u32;
        // keep the clock small, only the fraction matters
        self.elapsed -= libm::floorf(self.elapsed);
        due
    }

    pub fn push(&mut self, keyframe: Keyframe) {
        self.buffer.push(keyframe);
    }

    pub fn interpolate(&self) -> Keyframe {
        self.buffer.interpolate(self.ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::robot::leg::Leg;
    use approx::assert_abs_diff_eq;

    fn keyframe(x: f32) -> Keyframe {
        Keyframe::new([Point3::new(x, 0.0, 0.0); 4])
    }

    fn service() -> KeyframeService {
        let config = RobotConfig::DEFAULT;
        KeyframeService::new(&config.control, &config.gait)
    }

    #[test]
    fn buffer_swaps_slots_on_push() {
        let mut buffer = KeyframeBuffer::new(keyframe(0.0));
        buffer.push(keyframe(1.0));
        assert_eq!(buffer.previous(), &keyframe(0.0));
        assert_eq!(buffer.next(), &keyframe(1.0));
        buffer.push(keyframe(2.0));
        assert_eq!(buffer.previous(), &keyframe(1.0));
        assert_eq!(buffer.next(), &keyframe(2.0));
        assert_abs_diff_eq!(buffer.interpolate(0.25).feet[Leg::RearLeft].x, 1.25);
    }

    #[test]
    fn full_speed_runs_one_gait_tick_per_frame() {
        let mut keyframes = service();
        for _ in 0..5 {
            assert_eq!(keyframes.advance(), 1);
            assert_abs_diff_eq!(keyframes.ratio(), 0.0);
        }
    }

    #[test]
    fn reduced_speed_interpolates_between_ticks() {
        let mut keyframes = service();
        let max = RobotConfig::DEFAULT.control.max_walking_speed;
        while keyframes.walking_speed() > max / 2 {
            keyframes.adjust_walking_speed(-1);
        }
        keyframes.reset_walking_state(keyframe(0.0));
        keyframes.push(keyframe(1.0));

        let due: u32 = (0..max as u32).map(|_| keyframes.advance()).sum();
        assert_eq!(due, (max / 2) as u32);
        assert!(keyframes.ratio() > 0.0);
        let blended = keyframes.interpolate().feet[Leg::FrontLeft].x;
        assert_abs_diff_eq!(blended, keyframes.ratio(), epsilon = 1e-6);
    }

    #[test]
    fn walking_speed_stays_in_bounds() {
        let mut keyframes = service();
        keyframes.adjust_walking_speed(1);
        assert_eq!(keyframes.walking_speed(), 15);
        for _ in 0..40 {
            keyframes.adjust_walking_speed(-1);
        }
        assert_eq!(keyframes.walking_speed(), 1);
    }

    #[test]
    fn rotation_factor_ramps_by_increments() {
        let mut keyframes = service();
        keyframes.set_rotation_factor(1.0);
        assert_abs_diff_eq!(keyframes.rotation_factor(), 0.025);
        keyframes.set_rotation_factor(1.0);
        assert_abs_diff_eq!(keyframes.rotation_factor(), 0.05);
        keyframes.set_rotation_factor(-1.0);
        assert_abs_diff_eq!(keyframes.rotation_factor(), 0.025);
        keyframes.reset_movement();
        assert_eq!(keyframes.rotation_factor(), 0.0);
    }

    #[test]
    fn factors_shape_the_command_and_body_offset() {
        let mut keyframes = service();
        keyframes.set_forward_factor(0.5);
        keyframes.set_lean(-1.0);
        keyframes.set_height_offset(2.0);
        let command = keyframes.velocity_command();
        assert_abs_diff_eq!(command.x, 0.2);
        let offset = keyframes.body_offset();
        assert_abs_diff_eq!(offset.y, 0.03);
        assert_abs_diff_eq!(offset.z, -0.03);
        keyframes.reset_body_adjustments();
        assert_eq!(keyframes.body_offset(), Point3::ZERO);
    }
}
