//! Everything the motion task owns, bundled for the states to borrow.
use embassy_sync::blocking_mutex::raw::RawMutex;
use log::warn;

use crate::bus::MessageBus;
use crate::config::RobotConfig;
use crate::kinematics::conversion::joints_to_servo_angles;
use crate::kinematics::gait_engine::GaitGenerator;
use crate::kinematics::keyframe::KeyframeService;
use crate::kinematics::solver::Kinematics;
use crate::motion::filter::MotionFilterBank;
use crate::robot::pose::PoseService;
use crate::robot::servo::{rest_angles, ActuatorBoard, BoardError, ServoCoordinator};
use crate::robot::state::BodyState;

pub struct MotionContext<'a, B, M: RawMutex> {
    pub config: RobotConfig,
    pub kinematics: Kinematics,
    pub gait: GaitGenerator,
    pub keyframes: KeyframeService,
    pub poses: PoseService,
    pub filters: MotionFilterBank,
    pub servos: ServoCoordinator<B>,
    pub bus: &'a MessageBus<M>,
    /// Set when WALK hands over to STAND holding the rest position.
    pub rest_requested: bool,
    unreachable: bool,
}

impl<'a, B: ActuatorBoard, M: RawMutex> MotionContext<'a, B, M> {
    pub fn new(config: &RobotConfig, board: B, bus: &'a MessageBus<M>) -> Self {
        let mut filters = MotionFilterBank::new(&config.filters, config.frame_dt());
        filters.reset(
            &BodyState::lying_down(&config.geometry, &config.stance),
            &rest_angles(&config.servos),
        );
        Self {
            config: *config,
            kinematics: Kinematics::new(&config.geometry),
            gait: GaitGenerator::new(&config.gait, &config.geometry, &config.stance),
            keyframes: KeyframeService::new(&config.control, &config.gait),
            poses: PoseService::new(config.poses),
            filters,
            servos: ServoCoordinator::new(board, &config.servos),
            bus,
            rest_requested: false,
            unreachable: false,
        }
    }

    pub fn standing_body(&self) -> BodyState {
        BodyState::standing(&self.config.geometry, &self.config.stance)
    }

    pub fn lying_body(&self) -> BodyState {
        BodyState::lying_down(&self.config.geometry, &self.config.stance)
    }

    /// Stages the rest angles, writes them, and parks both filters there.
    pub async fn hold_rest(&mut self) -> Result<(), BoardError> {
        self.servos.rest_position().await?;
        let lying = self.lying_body();
        self.filters.reset(&lying, &rest_angles(&self.config.servos));
        Ok(())
    }

    /// Solves `body`, then pushes the servo angles through the joint filter into the
    /// staged buffer. Unreachable targets are replaced by the neutral pose.
    pub fn drive_body(&mut self, body: &BodyState) {
        let solution = self.kinematics.solve(body);
        let angles = if solution.is_reachable() {
            self.unreachable = false;
            joints_to_servo_angles(&solution.joint_angles(), &self.config.servos)
        } else {
            if !self.unreachable {
                warn!("[MOTION_TASK] foot target out of reach, holding the neutral pose");
            }
            self.unreachable = true;
            match self.poses.get(self.config.neutral_pose) {
                Some(pose) => pose.angles,
                None => *self.servos.staged(),
            }
        };
        self.filters.joints.set_target(&angles);
        let filtered = self.filters.joints.step();
        self.servos.stage_all(&filtered);
    }

    /// Steps the joint filter alone and stages the result.
    pub fn drive_joints(&mut self) {
        let filtered = self.filters.joints.step();
        self.servos.stage_all(&filtered);
    }
}
