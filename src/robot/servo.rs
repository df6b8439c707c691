//! Staged servo commands and the board they are committed to.
//!
//! The motion task stages all twelve servo angles during a frame and commits them in a
//! single pass at the end of it, so the board never sees half of a frame.
use core::fmt::{self, Display, Formatter};

use log::{debug, info, warn};

use crate::config::JointCalibration;
use crate::kinematics::conversion::angle_to_pulse;
use crate::robot::joint::JOINTS;
use crate::robot::leg::{Leg, LEGS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// The bus transfer to the board failed.
    Bus,
    /// The channel index does not exist on the board.
    InvalidChannel(u8),
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::Bus => f.write_str("actuator board bus error"),
            BoardError::InvalidChannel(channel) => write!(f, "channel {channel} does not exist"),
        }
    }
}

impl core::error::Error for BoardError {}

/// A PWM board driving hobby servos.
#[allow(async_fn_in_trait)]
pub trait ActuatorBoard {
    async fn set_channel_pulse(&mut self, channel: u8, pulse_us: f32) -> Result<(), BoardError>;
    async fn activate(&mut self) -> Result<(), BoardError>;
    async fn deactivate(&mut self) -> Result<(), BoardError>;
    fn is_active(&self) -> bool;
}

/// One staged angle per joint and a single dirty flag for all of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoCommandBuffer {
    angles: [[f32; 3]; 4],
    dirty: bool,
}

impl ServoCommandBuffer {
    pub fn new(angles: [[f32; 3]; 4]) -> Self {
        Self {
            angles,
            dirty: false,
        }
    }

    pub fn angles(&self) -> &[[f32; 3]; 4] {
        &self.angles
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn stage(&mut self, leg: Leg, joint: usize, angle: f32) {
        if angle.is_finite() {
            self.angles[leg][joint] = angle;
            self.dirty = true;
        }
    }

    fn clear(&mut self) {
        self.dirty = false;
    }
}

pub struct ServoCoordinator<B> {
    board: B,
    calibration: [[JointCalibration; 3]; 4],
    buffer: ServoCommandBuffer,
    /// The last write to the board was the rest position.
    resting: bool,
    /// A full write already went out since [`Self::begin_frame`].
    frame_written: bool,
}

impl<B: ActuatorBoard> ServoCoordinator<B> {
    pub fn new(board: B, calibration: &[[JointCalibration; 3]; 4]) -> Self {
        Self {
            board,
            calibration: *calibration,
            buffer: ServoCommandBuffer::new(rest_angles(calibration)),
            resting: false,
            frame_written: false,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn is_active(&self) -> bool {
        self.board.is_active()
    }

    pub fn is_dirty(&self) -> bool {
        self.buffer.is_dirty()
    }

    pub fn staged(&self) -> &[[f32; 3]; 4] {
        self.buffer.angles()
    }

    /// Stages one leg, clamping every angle to its servo's sweep.
    pub fn stage_leg(&mut self, leg: Leg, angles: [f32; 3]) {
        for (joint, angle) in angles.into_iter().enumerate() {
            let range = self.calibration[leg][joint].range;
            self.buffer.stage(leg, joint, angle.clamp(0.0, range));
        }
    }

    pub fn stage_all(&mut self, angles: &[[f32; 3]; 4]) {
        for leg in LEGS {
            self.stage_leg(leg, angles[leg]);
        }
    }

    /// Starts a control frame. At most one commit reaches the board per frame.
    pub fn begin_frame(&mut self) {
        self.frame_written = false;
    }

    /// Writes the staged angles to the board if anything changed, the board is on and
    /// nothing was written yet this frame. Skipped angles stay staged for the next frame.
    ///
    /// Returns whether a write happened.
    pub async fn commit(&mut self) -> Result<bool, BoardError> {
        if !self.buffer.is_dirty() || !self.board.is_active() || self.frame_written {
            return Ok(false);
        }
        self.write_all().await?;
        self.buffer.clear();
        self.resting = false;
        Ok(true)
    }

    /// Stages every rest angle and writes them even if nothing changed.
    pub async fn rest_position(&mut self) -> Result<(), BoardError> {
        self.stage_all(&rest_angles(&self.calibration));
        if self.board.is_active() {
            self.write_all().await?;
            self.buffer.clear();
            self.resting = true;
        }
        debug!("[MOTION_TASK] rest position");
        Ok(())
    }

    pub async fn activate(&mut self) -> Result<(), BoardError> {
        if self.board.is_active() {
            return Ok(());
        }
        self.board.activate().await?;
        self.resting = false;
        info!("[MOTION_TASK] actuator board activated");
        Ok(())
    }

    /// Moves to rest, then powers the board down.
    ///
    /// The rest write is skipped when the board already holds the rest position.
    pub async fn deactivate(&mut self) -> Result<(), BoardError> {
        if self.board.is_active() {
            if !self.resting || self.buffer.is_dirty() {
                self.rest_position().await?;
            }
            self.board.deactivate().await?;
            info!("[MOTION_TASK] actuator board deactivated");
        }
        self.buffer = ServoCommandBuffer::new(rest_angles(&self.calibration));
        self.resting = false;
        Ok(())
    }

    /// Powers the board down after a hardware fault, ignoring further errors.
    pub async fn force_deactivate(&mut self) {
        if let Err(e) = self.board.deactivate().await {
            warn!("[MOTION_TASK] deactivation after fault failed: {e}");
        }
        self.buffer = ServoCommandBuffer::new(rest_angles(&self.calibration));
        self.resting = false;
    }

    async fn write_all(&mut self) -> Result<(), BoardError> {
        for leg in LEGS {
            for joint in JOINTS {
                let cal = &self.calibration[leg][joint];
                let angle = self.buffer.angles()[leg][joint];
                self.board
                    .set_channel_pulse(cal.channel, angle_to_pulse(angle, cal))
                    .await?;
            }
        }
        self.frame_written = true;
        Ok(())
    }
}

pub fn rest_angles(calibration: &[[JointCalibration; 3]; 4]) -> [[f32; 3]; 4] {
    calibration.map(|leg| leg.map(|joint| joint.rest_angle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::robot::mock::MockBoard;
    use approx::assert_abs_diff_eq;
    use embassy_futures::block_on;

    fn coordinator() -> ServoCoordinator<MockBoard> {
        ServoCoordinator::new(MockBoard::default(), &RobotConfig::DEFAULT.servos)
    }

    #[test]
    fn commit_writes_each_joint_once() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        for step in 0..5 {
            servos.stage_all(&[[80.0 + step as f32; 3]; 4]);
        }
        assert!(servos.is_dirty());

        assert_eq!(block_on(servos.commit()), Ok(true));
        let writes = &servos.board().writes;
        assert_eq!(writes.len(), 12);
        let mut channels: Vec<u8> = writes.iter().map(|(channel, _)| *channel).collect();
        channels.sort_unstable();
        channels.dedup();
        assert_eq!(channels.len(), 12);
        // 84 degrees over 500..2500 us
        assert_abs_diff_eq!(writes[0].1, 500.0 + 84.0 / 180.0 * 2000.0, epsilon = 1e-3);
        assert!(!servos.is_dirty());

        assert_eq!(block_on(servos.commit()), Ok(false));
        assert_eq!(servos.board().writes.len(), 12);
    }

    #[test]
    fn commit_is_skipped_while_inactive() {
        let mut servos = coordinator();
        servos.stage_leg(Leg::FrontLeft, [10.0, 20.0, 30.0]);
        assert_eq!(block_on(servos.commit()), Ok(false));
        assert!(servos.board().writes.is_empty());
        assert!(servos.is_dirty());
    }

    #[test]
    fn staged_angles_are_clamped_to_the_servo_range() {
        let mut servos = coordinator();
        servos.stage_leg(Leg::RearRight, [-20.0, 200.0, f32::NAN]);
        assert_eq!(servos.staged()[Leg::RearRight][0], 0.0);
        assert_eq!(servos.staged()[Leg::RearRight][1], 180.0);
        assert_eq!(servos.staged()[Leg::RearRight][2], 52.0);
    }

    #[test]
    fn rest_position_writes_even_when_clean() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        assert!(!servos.is_dirty());
        block_on(servos.rest_position()).unwrap();
        assert_eq!(servos.board().writes.len(), 12);
        assert_eq!(servos.staged(), &rest_angles(&RobotConfig::DEFAULT.servos));
    }

    #[test]
    fn deactivate_rests_first_then_powers_down() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        servos.stage_all(&[[45.0; 3]; 4]);
        block_on(servos.deactivate()).unwrap();

        let board = servos.board();
        assert!(!board.is_active());
        assert_eq!(board.writes.len(), 12);
        assert_abs_diff_eq!(board.writes[0].1, angle_to_pulse(90.0, &RobotConfig::DEFAULT.servos[0][0]));
        assert_eq!(board.deactivations, 1);
        assert!(!servos.is_dirty());
        assert_eq!(servos.staged(), &rest_angles(&RobotConfig::DEFAULT.servos));
    }

    #[test]
    fn commit_waits_for_the_next_frame_after_a_rest_write() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        servos.begin_frame();
        block_on(servos.rest_position()).unwrap();
        servos.stage_all(&[[80.0; 3]; 4]);
        assert_eq!(block_on(servos.commit()), Ok(false));
        assert_eq!(servos.board().writes.len(), 12);
        assert!(servos.is_dirty());

        servos.begin_frame();
        assert_eq!(block_on(servos.commit()), Ok(true));
        assert_eq!(servos.board().writes.len(), 24);
    }

    #[test]
    fn deactivate_after_rest_does_not_write_again() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        block_on(servos.rest_position()).unwrap();
        assert_eq!(servos.board().writes.len(), 12);

        block_on(servos.deactivate()).unwrap();
        assert_eq!(servos.board().writes.len(), 12);
        assert_eq!(servos.board().deactivations, 1);
    }

    #[test]
    fn deactivate_right_after_activation_still_rests() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        block_on(servos.deactivate()).unwrap();
        assert_eq!(servos.board().writes.len(), 12);
    }

    #[test]
    fn bus_error_keeps_the_buffer_dirty() {
        let mut servos = coordinator();
        block_on(servos.activate()).unwrap();
        servos.board_mut().fail_writes = true;
        servos.stage_all(&[[45.0; 3]; 4]);
        assert_eq!(block_on(servos.commit()), Err(BoardError::Bus));
        assert!(servos.is_dirty());
        block_on(servos.force_deactivate());
        assert!(!servos.is_active());
    }
}
