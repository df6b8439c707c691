//! Rate limited first order filters over commanded positions and angles.
//!
//! Every channel is independent: a [`FilteredValue`] low-pass filters towards a staged
//! target, never moves faster than its rate limit and drops the target once it is
//! reached. The composites below only group channels, there is no cross-axis coupling.
use crate::config::FilterConfig;
use crate::robot::leg::LEGS;
use crate::robot::state::{BodyAngles, BodyState, FeetPositions, Point3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredValue {
    dt: f32,
    tau: f32,
    alpha: f32,
    value: f32,
    target: Option<f32>,
    rate_limit: f32,
    epsilon: f32,
}

impl FilteredValue {
    /// A filter sampled every `dt` seconds. Use `f32::INFINITY` to disable the rate limit.
    pub fn new(dt: f32, tau: f32, rate_limit: f32, epsilon: f32) -> Self {
        Self {
            dt,
            tau,
            alpha: alpha(dt, tau),
            value: 0.0,
            target: None,
            rate_limit,
            epsilon,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> Option<f32> {
        self.target
    }

    pub fn tau(&self) -> f32 {
        self.tau
    }

    pub fn is_settled(&self) -> bool {
        self.target.is_none()
    }

    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = Some(target);
        }
    }

    /// Jumps to `value` and forgets any pending target.
    pub fn reset(&mut self, value: f32) {
        self.value = value;
        self.target = None;
    }

    pub fn set_dynamics(&mut self, tau: f32, rate_limit: f32) {
        self.tau = tau;
        self.alpha = alpha(self.dt, tau);
        self.rate_limit = rate_limit;
    }

    pub fn step(&mut self) -> f32 {
        let Some(target) = self.target else {
            return self.value;
        };
        let max_step = self.rate_limit * self.dt;
        let smoothed = (1.0 - self.alpha) * self.value + self.alpha * target;
        let delta = (smoothed - self.value).clamp(-max_step, max_step);
        let stepped = self.value + delta;

        // snapping must not exceed the rate limit either
        if libm::fabsf(target - stepped) <= self.epsilon && libm::fabsf(target - self.value) <= max_step {
            self.value = target;
            self.target = None;
        } else {
            self.value = stepped;
        }
        self.value
    }
}

fn alpha(dt: f32, tau: f32) -> f32 {
    dt / (tau.max(0.0) + dt)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredPosition {
    axes: [FilteredValue; 3],
}

impl FilteredPosition {
    pub fn new(dt: f32, tau: f32, rate_limit: f32, epsilon: f32) -> Self {
        Self {
            axes: [FilteredValue::new(dt, tau, rate_limit, epsilon); 3],
        }
    }

    pub fn value(&self) -> Point3 {
        Point3::new(self.axes[0].value(), self.axes[1].value(), self.axes[2].value())
    }

    pub fn is_settled(&self) -> bool {
        self.axes.iter().all(FilteredValue::is_settled)
    }

    pub fn set_target(&mut self, target: Point3) {
        for (axis, value) in self.axes.iter_mut().zip(target.as_array()) {
            axis.set_target(value);
        }
    }

    pub fn reset(&mut self, value: Point3) {
        for (axis, value) in self.axes.iter_mut().zip(value.as_array()) {
            axis.reset(value);
        }
    }

    pub fn set_dynamics(&mut self, tau: f32, rate_limit: f32) {
        for axis in &mut self.axes {
            axis.set_dynamics(tau, rate_limit);
        }
    }

    pub fn step(&mut self) -> Point3 {
        for axis in &mut self.axes {
            axis.step();
        }
        self.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredFeet {
    feet: [FilteredPosition; 4],
}

impl FilteredFeet {
    pub fn new(dt: f32, tau: f32, rate_limit: f32, epsilon: f32) -> Self {
        Self {
            feet: [FilteredPosition::new(dt, tau, rate_limit, epsilon); 4],
        }
    }

    pub fn value(&self) -> FeetPositions {
        LEGS.map(|leg| self.feet[leg].value())
    }

    pub fn is_settled(&self) -> bool {
        self.feet.iter().all(FilteredPosition::is_settled)
    }

    pub fn set_target(&mut self, target: &FeetPositions) {
        for leg in LEGS {
            self.feet[leg].set_target(target[leg]);
        }
    }

    pub fn reset(&mut self, value: &FeetPositions) {
        for leg in LEGS {
            self.feet[leg].reset(value[leg]);
        }
    }

    pub fn set_dynamics(&mut self, tau: f32, rate_limit: f32) {
        for foot in &mut self.feet {
            foot.set_dynamics(tau, rate_limit);
        }
    }

    pub fn step(&mut self) -> FeetPositions {
        for foot in &mut self.feet {
            foot.step();
        }
        self.value()
    }
}

/// Body position, orientation and feet, with separate linear and angular rate limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredBodyState {
    position: FilteredPosition,
    angles: [FilteredValue; 3],
    feet: FilteredFeet,
}

impl FilteredBodyState {
    pub fn new(dt: f32, tau: f32, rate_limit: f32, angle_rate_limit: f32, epsilon: f32) -> Self {
        Self {
            position: FilteredPosition::new(dt, tau, rate_limit, epsilon),
            angles: [FilteredValue::new(dt, tau, angle_rate_limit, epsilon); 3],
            feet: FilteredFeet::new(dt, tau, rate_limit, epsilon),
        }
    }

    pub fn value(&self) -> BodyState {
        BodyState {
            position: self.position.value(),
            angles: BodyAngles::new(
                self.angles[0].value(),
                self.angles[1].value(),
                self.angles[2].value(),
            ),
            feet: self.feet.value(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.position.is_settled()
            && self.angles.iter().all(FilteredValue::is_settled)
            && self.feet.is_settled()
    }

    pub fn set_target(&mut self, target: &BodyState) {
        self.position.set_target(target.position);
        self.set_angles_target(&target.angles);
        self.feet.set_target(&target.feet);
    }

    pub fn set_angles_target(&mut self, target: &BodyAngles) {
        self.angles[0].set_target(target.omega);
        self.angles[1].set_target(target.phi);
        self.angles[2].set_target(target.psi);
    }

    pub fn reset(&mut self, value: &BodyState) {
        self.position.reset(value.position);
        self.angles[0].reset(value.angles.omega);
        self.angles[1].reset(value.angles.phi);
        self.angles[2].reset(value.angles.psi);
        self.feet.reset(&value.feet);
    }

    pub fn set_dynamics(&mut self, tau: f32, rate_limit: f32, angle_rate_limit: f32) {
        self.position.set_dynamics(tau, rate_limit);
        for angle in &mut self.angles {
            angle.set_dynamics(tau, angle_rate_limit);
        }
        self.feet.set_dynamics(tau, rate_limit);
    }

    pub fn step(&mut self) -> BodyState {
        self.position.step();
        for angle in &mut self.angles {
            angle.step();
        }
        self.feet.step();
        self.value()
    }
}

/// Servo angles in degrees indexed by leg then joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredJointAngles {
    joints: [[FilteredValue; 3]; 4],
}

impl FilteredJointAngles {
    pub fn new(dt: f32, tau: f32, rate_limit: f32, epsilon: f32) -> Self {
        Self {
            joints: [[FilteredValue::new(dt, tau, rate_limit, epsilon); 3]; 4],
        }
    }

    pub fn value(&self) -> [[f32; 3]; 4] {
        self.joints.map(|leg| leg.map(|joint| joint.value()))
    }

    pub fn is_settled(&self) -> bool {
        self.joints.iter().flatten().all(FilteredValue::is_settled)
    }

    pub fn set_target(&mut self, target: &[[f32; 3]; 4]) {
        for (leg, angles) in self.joints.iter_mut().zip(target) {
            for (joint, angle) in leg.iter_mut().zip(angles) {
                joint.set_target(*angle);
            }
        }
    }

    pub fn reset(&mut self, value: &[[f32; 3]; 4]) {
        for (leg, angles) in self.joints.iter_mut().zip(value) {
            for (joint, angle) in leg.iter_mut().zip(angles) {
                joint.reset(*angle);
            }
        }
    }

    pub fn set_dynamics(&mut self, tau: f32, rate_limit: f32) {
        for joint in self.joints.iter_mut().flatten() {
            joint.set_dynamics(tau, rate_limit);
        }
    }

    pub fn step(&mut self) -> [[f32; 3]; 4] {
        for joint in self.joints.iter_mut().flatten() {
            joint.step();
        }
        self.value()
    }
}

/// Which filter the current frame's command enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// Body targets go through the body filter, then IK, then the joint filter.
    #[default]
    Body,
    /// Pose servo angles feed the joint filter directly.
    Pose,
}

#[derive(Debug, Clone)]
pub struct MotionFilterBank {
    config: FilterConfig,
    pub body: FilteredBodyState,
    pub joints: FilteredJointAngles,
    mode: DriveMode,
}

impl MotionFilterBank {
    pub fn new(config: &FilterConfig, dt: f32) -> Self {
        Self {
            config: *config,
            body: FilteredBodyState::new(
                dt,
                config.transit_tau,
                config.transit_rate_limit,
                config.transit_angle_rate_limit,
                config.epsilon,
            ),
            joints: FilteredJointAngles::new(dt, config.joint_tau, config.joint_rate_limit, config.epsilon),
            mode: DriveMode::Body,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DriveMode) {
        self.mode = mode;
    }

    /// Slow, smooth dynamics used while standing and posing.
    pub fn use_transit_dynamics(&mut self) {
        self.body.set_dynamics(
            self.config.transit_tau,
            self.config.transit_rate_limit,
            self.config.transit_angle_rate_limit,
        );
    }

    /// Fast dynamics used while walking; the gait already shapes the trajectory.
    pub fn use_walk_dynamics(&mut self) {
        self.body.set_dynamics(
            self.config.walk_tau,
            self.config.walk_rate_limit,
            self.config.walk_angle_rate_limit,
        );
    }

    pub fn reset(&mut self, body: &BodyState, servo_angles: &[[f32; 3]; 4]) {
        self.body.reset(body);
        self.joints.reset(servo_angles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::robot::leg::Leg;
    use approx::assert_abs_diff_eq;

    const DT: f32 = 0.02;

    #[test]
    fn no_target_holds_the_value() {
        let mut filter = FilteredValue::new(DT, 0.3, 1.0, 1e-4);
        filter.reset(0.7);
        for _ in 0..10 {
            assert_eq!(filter.step(), 0.7);
        }
        assert!(filter.is_settled());
    }

    #[test]
    fn step_never_exceeds_the_rate_limit() {
        let rate_limit = 0.06;
        let mut filter = FilteredValue::new(DT, 0.05, rate_limit, 5e-4);
        filter.reset(0.0);
        filter.set_target(0.1);
        let mut previous = filter.value();
        for i in 0..400 {
            if i == 150 {
                filter.set_target(-0.05);
            }
            let value = filter.step();
            assert!(libm::fabsf(value - previous) / DT <= rate_limit + 1e-4);
            previous = value;
        }
        assert_eq!(filter.value(), -0.05);
        assert!(filter.is_settled());
    }

    #[test]
    fn converges_within_one_percent_after_five_tau() {
        let tau = 0.3;
        let mut filter = FilteredValue::new(DT, tau, f32::INFINITY, 1e-6);
        filter.reset(0.0);
        filter.set_target(1.0);
        let steps = libm::ceilf(5.0 * tau / DT) as usize;
        for _ in 0..steps {
            filter.step();
        }
        assert!(libm::fabsf(1.0 - filter.value()) <= 0.01);
    }

    #[test]
    fn zero_tau_passes_through_in_one_step() {
        let mut filter = FilteredValue::new(DT, 0.0, f32::INFINITY, 1e-4);
        filter.set_target(2.5);
        assert_eq!(filter.step(), 2.5);
        assert!(filter.is_settled());
    }

    #[test]
    fn set_dynamics_retunes_smoothing() {
        let mut filter = FilteredValue::new(DT, 1.0, f32::INFINITY, 1e-4);
        filter.set_target(1.0);
        let slow = filter.step();
        filter.reset(0.0);
        filter.set_dynamics(0.0, f32::INFINITY);
        filter.set_target(1.0);
        assert!(slow < 0.05);
        assert_eq!(filter.step(), 1.0);
        assert_eq!(filter.tau(), 0.0);
    }

    #[test]
    fn body_filter_uses_separate_angular_limit() {
        let config = RobotConfig::DEFAULT;
        let mut bank = MotionFilterBank::new(&config.filters, DT);
        let start = BodyState::standing(&config.geometry, &config.stance);
        bank.reset(&start, &[[90.0; 3]; 4]);

        let mut target = start;
        target.position.y += 0.05;
        target.angles.phi = 0.3;
        bank.body.set_target(&target);
        let body = bank.body.step();
        assert!(body.position.y - start.position.y <= config.filters.transit_rate_limit * DT + 1e-6);
        assert!(body.angles.phi <= config.filters.transit_angle_rate_limit * DT + 1e-6);
        assert!(body.angles.phi > body.position.y - start.position.y);
        assert_abs_diff_eq!(body.feet[Leg::FrontLeft].x, start.feet[Leg::FrontLeft].x);
    }

    #[test]
    fn joint_filter_tracks_pose_targets() {
        let config = RobotConfig::DEFAULT;
        let mut bank = MotionFilterBank::new(&config.filters, DT);
        bank.set_mode(DriveMode::Pose);
        bank.joints.reset(&[[90.0; 3]; 4]);
        bank.joints.set_target(&[[100.0; 3]; 4]);
        let angles = bank.joints.step();
        // 400 deg/s over one 20 ms frame
        assert_abs_diff_eq!(angles[0][0], 98.0, epsilon = 1e-4);
        for _ in 0..5 {
            bank.joints.step();
        }
        assert!(bank.joints.is_settled());
        assert_eq!(bank.joints.value(), [[100.0; 3]; 4]);
    }
}
