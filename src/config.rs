//! Static robot configuration.
//!
//! Everything the motion core needs to know about the robot lives in [`RobotConfig`]:
//! body geometry, per-joint servo calibration, gait timing, filter dynamics, input
//! shaping and the named pose table. The firmware uses [`RobotConfig::DEFAULT`] and calls
//! [`RobotConfig::validate`] once at startup; a failure there is fatal.
use core::fmt::{self, Display, Formatter};

use crate::robot::joint::{Joint, JOINTS};
use crate::robot::leg::{Leg, LEGS};
use crate::robot::pose::Pose;

/// Lowest pulse width accepted for any servo, in microseconds.
pub const SERVO_PULSE_WIDTH_MIN: f32 = 500.0;
/// Highest pulse width accepted for any servo, in microseconds.
pub const SERVO_PULSE_WIDTH_MAX: f32 = 2500.0;
/// Number of PWM outputs on the actuator board.
pub const BOARD_CHANNELS: u8 = 16;
/// Longest phase schedule supported by the gait generator.
pub const MAX_PHASES: usize = 8;

/// TCP port of the input link.
pub const PORT: u16 = 8080;
pub const RX_BUF_SIZE: usize = 1024;
pub const TX_BUF_SIZE: usize = 256;
/// Longest input line accepted before it is discarded.
pub const LINE_BUF_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// A joint has `min_pulse_us == max_pulse_us`.
    DegeneratePulseRange { leg: Leg, joint: Joint },
    /// A pulse width lies outside the hardware bounds.
    PulseOutOfBounds { leg: Leg, joint: Joint, pulse_us: f32 },
    /// A joint has a non-positive angular range.
    InvalidAngleRange { leg: Leg, joint: Joint },
    /// A joint's rest angle lies outside `[0, range]`.
    RestAngleOutOfRange { leg: Leg, joint: Joint },
    /// A channel index does not exist on the board.
    ChannelOutOfRange { leg: Leg, joint: Joint, channel: u8 },
    /// Two joints share one channel.
    DuplicateChannel { channel: u8 },
    /// Only 4 and 8 phase schedules are supported.
    UnsupportedPhaseCount(usize),
    /// A timing parameter that must be positive is not.
    NonPositive(&'static str),
    /// The pose table is empty or its neutral index is out of range.
    MissingPose,
    /// An 8 phase contact table lifts more than one leg at once or never lifts a leg.
    InvalidContactTable { phase: usize },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DegeneratePulseRange { leg, joint } => {
                write!(f, "{leg} {joint}: min and max pulse are equal")
            }
            ConfigError::PulseOutOfBounds {
                leg,
                joint,
                pulse_us,
            } => write!(
                f,
                "{leg} {joint}: pulse {pulse_us}us outside [{SERVO_PULSE_WIDTH_MIN}, {SERVO_PULSE_WIDTH_MAX}]"
            ),
            ConfigError::InvalidAngleRange { leg, joint } => {
                write!(f, "{leg} {joint}: angular range must be positive")
            }
            ConfigError::RestAngleOutOfRange { leg, joint } => {
                write!(f, "{leg} {joint}: rest angle outside the servo range")
            }
            ConfigError::ChannelOutOfRange {
                leg,
                joint,
                channel,
            } => write!(f, "{leg} {joint}: channel {channel} does not exist"),
            ConfigError::DuplicateChannel { channel } => {
                write!(f, "channel {channel} is assigned to more than one joint")
            }
            ConfigError::UnsupportedPhaseCount(n) => {
                write!(f, "unsupported number of gait phases: {n}")
            }
            ConfigError::NonPositive(name) => write!(f, "{name} must be positive"),
            ConfigError::MissingPose => f.write_str("pose table is empty or neutral pose missing"),
            ConfigError::InvalidContactTable { phase } => {
                write!(f, "contact table is not a one-leg-at-a-time walk at phase {phase}")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

/// Wireframe dimensions in meters, joint to joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyGeometry {
    pub hip_link_length: f32,
    pub upper_leg_link_length: f32,
    pub lower_leg_link_length: f32,
    pub body_width: f32,
    pub body_length: f32,
}

/// Stance placement in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StanceConfig {
    pub default_stand_height: f32,
    pub stand_front_x_offset: f32,
    pub stand_back_x_offset: f32,
    pub lie_down_height: f32,
    pub lie_down_feet_x_offset: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitConfig {
    pub dt: f32,
    pub num_phases: usize,
    pub swing_time: f32,
    pub overlap_time: f32,
    /// Contact tables indexed by [`Leg`]; `0` means the leg swings in that phase.
    pub contact_phases: [[u8; MAX_PHASES]; 4],
    pub z_clearance: f32,
    pub alpha: f32,
    pub beta: f32,
    pub fwd_body_balance_shift: f32,
    pub back_body_balance_shift: f32,
    pub side_body_balance_shift: f32,
    pub foot_height_time_constant: f32,
    pub max_fwd_velocity: f32,
    pub max_side_velocity: f32,
    pub max_yaw_rate: f32,
}

/// Time constants (s) and rate limits (m/s, rad/s, deg/s) of the motion filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    pub transit_tau: f32,
    pub transit_rate_limit: f32,
    pub transit_angle_rate_limit: f32,
    pub walk_tau: f32,
    pub walk_rate_limit: f32,
    pub walk_angle_rate_limit: f32,
    pub joint_tau: f32,
    pub joint_rate_limit: f32,
    pub epsilon: f32,
}

/// Static calibration of one servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCalibration {
    pub channel: u8,
    pub min_pulse_us: f32,
    pub max_pulse_us: f32,
    /// Servo angle commanded by the rest position, degrees.
    pub rest_angle: f32,
    /// Total angular sweep of the servo, degrees.
    pub range: f32,
    /// Servo angle corresponding to a zero joint angle, degrees.
    pub center_angle: f32,
    /// `1.0` or `-1.0`, mounting direction of the horn.
    pub direction: f32,
}

impl JointCalibration {
    const fn new(channel: u8, rest_angle: f32, center_angle: f32, direction: f32) -> Self {
        Self {
            channel,
            min_pulse_us: 500.0,
            max_pulse_us: 2500.0,
            rest_angle,
            range: 180.0,
            center_angle,
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputConfig {
    pub deadzone: f32,
    pub smoothing: f32,
    pub response_exponent: f32,
    pub min_update_interval_ms: u64,
    pub axis_threshold: f32,
    pub debounce_ms: u64,
    pub publish_rate_hz: u32,
    pub activity_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    pub frame_period_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub telemetry_interval_frames: u32,
    pub max_walking_speed: u8,
    pub rotation_increment: f32,
    /// Lateral body shift at full right stick deflection, meters.
    pub max_lean: f32,
    /// Extra body height at full right stick deflection, meters.
    pub max_height_offset: f32,
    pub pitch_step: f32,
    pub roll_step: f32,
    pub max_pitch: f32,
    pub max_roll: f32,
    pub max_yaw: f32,
    pub min_height: f32,
    pub max_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotConfig {
    pub geometry: BodyGeometry,
    pub stance: StanceConfig,
    pub gait: GaitConfig,
    pub filters: FilterConfig,
    /// Calibration indexed by [`Leg`] then joint (shoulder, leg, foot).
    pub servos: [[JointCalibration; 3]; 4],
    pub input: InputConfig,
    pub control: ControlConfig,
    pub poses: &'static [Pose],
    /// Pose substituted when a commanded foot target cannot be reached.
    pub neutral_pose: usize,
}

const DEFAULT_POSES: [Pose; 4] = [
    Pose::new(
        "rest",
        [
            [90.0, 103.0, 128.0],
            [90.0, 103.0, 128.0],
            [90.0, 77.0, 52.0],
            [90.0, 77.0, 52.0],
        ],
    ),
    Pose::new(
        "stand",
        [
            [90.0, 90.0, 98.7],
            [90.0, 90.0, 98.7],
            [90.0, 90.0, 81.3],
            [90.0, 90.0, 81.3],
        ],
    ),
    Pose::new(
        "sit",
        [
            [90.0, 90.0, 98.7],
            [90.0, 103.0, 128.0],
            [90.0, 90.0, 81.3],
            [90.0, 77.0, 52.0],
        ],
    ),
    Pose::new(
        "stretch",
        [
            [90.0, 103.0, 128.0],
            [90.0, 90.0, 98.7],
            [90.0, 77.0, 52.0],
            [90.0, 90.0, 81.3],
        ],
    ),
];

impl RobotConfig {
    pub const DEFAULT: RobotConfig = RobotConfig {
        geometry: BodyGeometry {
            hip_link_length: 0.055,
            upper_leg_link_length: 0.1075,
            lower_leg_link_length: 0.130,
            body_width: 0.078,
            body_length: 0.186,
        },
        stance: StanceConfig {
            default_stand_height: 0.155,
            stand_front_x_offset: 0.015,
            stand_back_x_offset: 0.0,
            lie_down_height: 0.083,
            lie_down_feet_x_offset: 0.065,
        },
        gait: GaitConfig {
            dt: 0.02,
            num_phases: 8,
            swing_time: 0.36,
            overlap_time: 0.0,
            contact_phases: [
                [1, 1, 1, 1, 1, 1, 1, 0], // front left
                [1, 1, 1, 1, 1, 0, 1, 1], // rear left
                [1, 1, 1, 0, 1, 1, 1, 1], // front right
                [1, 0, 1, 1, 1, 1, 1, 1], // rear right
            ],
            z_clearance: 0.050,
            alpha: 0.5,
            beta: 0.5,
            fwd_body_balance_shift: 0.035,
            back_body_balance_shift: 0.005,
            side_body_balance_shift: 0.015,
            foot_height_time_constant: 0.02,
            max_fwd_velocity: 0.4,
            max_side_velocity: 0.4,
            max_yaw_rate: 0.35,
        },
        filters: FilterConfig {
            transit_tau: 0.3,
            transit_rate_limit: 0.06,
            transit_angle_rate_limit: 0.35,
            walk_tau: 0.0,
            walk_rate_limit: 1.0,
            walk_angle_rate_limit: 1.0,
            joint_tau: 0.0,
            joint_rate_limit: 400.0,
            epsilon: 0.0005,
        },
        servos: [
            [
                JointCalibration::new(0, 90.0, 90.0, -1.0),
                JointCalibration::new(1, 103.0, 140.0, -1.0),
                JointCalibration::new(2, 128.0, 0.0, -1.0),
            ],
            [
                JointCalibration::new(3, 90.0, 90.0, -1.0),
                JointCalibration::new(4, 103.0, 140.0, -1.0),
                JointCalibration::new(5, 128.0, 0.0, -1.0),
            ],
            [
                JointCalibration::new(6, 90.0, 90.0, 1.0),
                JointCalibration::new(7, 77.0, 40.0, 1.0),
                JointCalibration::new(8, 52.0, 180.0, 1.0),
            ],
            [
                JointCalibration::new(9, 90.0, 90.0, 1.0),
                JointCalibration::new(10, 77.0, 40.0, 1.0),
                JointCalibration::new(11, 52.0, 180.0, 1.0),
            ],
        ],
        input: InputConfig {
            deadzone: 0.08,
            smoothing: 0.4,
            response_exponent: 1.3,
            min_update_interval_ms: 10,
            axis_threshold: 0.01,
            debounce_ms: 500,
            publish_rate_hz: 20,
            activity_threshold: 0.01,
        },
        control: ControlConfig {
            frame_period_ms: 20,
            inactivity_timeout_ms: 10_000,
            telemetry_interval_frames: 2,
            max_walking_speed: 15,
            rotation_increment: 0.025,
            max_lean: 0.03,
            max_height_offset: 0.03,
            pitch_step: 0.05,
            roll_step: 0.05,
            max_pitch: 0.35,
            max_roll: 0.35,
            max_yaw: 0.35,
            min_height: 0.10,
            max_height: 0.19,
        },
        poses: &DEFAULT_POSES,
        neutral_pose: 1,
    };

    /// Checks every value that would make the robot unsafe to drive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut used = [false; BOARD_CHANNELS as usize];
        for leg in LEGS {
            for joint in JOINTS {
                let cal = &self.servos[leg][joint];
                if cal.min_pulse_us == cal.max_pulse_us {
                    return Err(ConfigError::DegeneratePulseRange { leg, joint });
                }
                for pulse_us in [cal.min_pulse_us, cal.max_pulse_us] {
                    if !(SERVO_PULSE_WIDTH_MIN..=SERVO_PULSE_WIDTH_MAX).contains(&pulse_us) {
                        return Err(ConfigError::PulseOutOfBounds {
                            leg,
                            joint,
                            pulse_us,
                        });
                    }
                }
                if cal.range <= 0.0 {
                    return Err(ConfigError::InvalidAngleRange { leg, joint });
                }
                if !(0.0..=cal.range).contains(&cal.rest_angle) {
                    return Err(ConfigError::RestAngleOutOfRange { leg, joint });
                }
                if cal.channel >= BOARD_CHANNELS {
                    return Err(ConfigError::ChannelOutOfRange {
                        leg,
                        joint,
                        channel: cal.channel,
                    });
                }
                if used[cal.channel as usize] {
                    return Err(ConfigError::DuplicateChannel {
                        channel: cal.channel,
                    });
                }
                used[cal.channel as usize] = true;
            }
        }

        if self.gait.num_phases != 4 && self.gait.num_phases != 8 {
            return Err(ConfigError::UnsupportedPhaseCount(self.gait.num_phases));
        }
        if self.gait.num_phases == MAX_PHASES {
            self.validate_crawl_contacts()?;
        }
        let positive = [
            (self.gait.dt, "gait.dt"),
            (self.gait.swing_time, "gait.swing_time"),
            (
                self.gait.foot_height_time_constant,
                "gait.foot_height_time_constant",
            ),
            (self.geometry.upper_leg_link_length, "geometry.upper_leg_link_length"),
            (self.geometry.lower_leg_link_length, "geometry.lower_leg_link_length"),
            (self.filters.epsilon, "filters.epsilon"),
            (self.input.smoothing, "input.smoothing"),
        ];
        for (value, name) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive(name));
            }
        }
        if self.control.frame_period_ms == 0 {
            return Err(ConfigError::NonPositive("control.frame_period_ms"));
        }
        if self.control.max_walking_speed == 0 {
            return Err(ConfigError::NonPositive("control.max_walking_speed"));
        }
        if self.poses.is_empty() || self.neutral_pose >= self.poses.len() {
            return Err(ConfigError::MissingPose);
        }
        Ok(())
    }

    fn validate_crawl_contacts(&self) -> Result<(), ConfigError> {
        let swinging = |phase: usize| {
            LEGS.iter()
                .filter(|&&leg| self.gait.contact_phases[leg][phase] == 0)
                .count()
        };
        for phase in 0..MAX_PHASES {
            if swinging(phase) > 1 {
                return Err(ConfigError::InvalidContactTable { phase });
            }
        }
        for leg in LEGS {
            let swings = self.gait.contact_phases[leg].iter().filter(|&&c| c == 0).count();
            if swings == 0 {
                return Err(ConfigError::InvalidContactTable { phase: MAX_PHASES });
            }
        }
        Ok(())
    }

    /// Frame period as seconds.
    pub fn frame_dt(&self) -> f32 {
        self.control.frame_period_ms as f32 / 1000.0
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RobotConfig::DEFAULT.validate(), Ok(()));
    }

    #[test]
    fn equal_pulse_bounds_are_rejected() {
        let mut config = RobotConfig::DEFAULT;
        config.servos[Leg::RearRight][2].max_pulse_us = config.servos[Leg::RearRight][2].min_pulse_us;
        assert_eq!(
            config.validate(),
            Err(ConfigError::DegeneratePulseRange {
                leg: Leg::RearRight,
                joint: Joint::Foot
            })
        );
    }

    #[test]
    fn out_of_bounds_pulse_is_rejected() {
        let mut config = RobotConfig::DEFAULT;
        config.servos[Leg::FrontLeft][0].max_pulse_us = 3000.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PulseOutOfBounds { leg: Leg::FrontLeft, joint: Joint::Shoulder, .. })
        ));
    }

    #[test]
    fn duplicate_channel_is_rejected() {
        let mut config = RobotConfig::DEFAULT;
        config.servos[Leg::FrontRight][1].channel = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateChannel { channel: 0 })
        );
    }

    #[test]
    fn unsupported_phase_count_is_rejected() {
        let mut config = RobotConfig::DEFAULT;
        config.gait.num_phases = 6;
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedPhaseCount(6))
        );
    }

    #[test]
    fn two_legs_swinging_in_a_crawl_is_rejected() {
        let mut config = RobotConfig::DEFAULT;
        config.gait.contact_phases[Leg::FrontLeft][1] = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidContactTable { phase: 1 })
        );
    }

    #[test]
    fn neutral_pose_must_exist() {
        let mut config = RobotConfig::DEFAULT;
        config.neutral_pose = config.poses.len();
        assert_eq!(config.validate(), Err(ConfigError::MissingPose));
    }
}
