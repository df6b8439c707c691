//! Kinematics and gait generation.
//!
//! - [`transform`] holds the homogeneous transforms for body roll, yaw and pitch.
//! - [`solver`] implements leg inverse and forward kinematics for a whole body state.
//! - [`conversion`] maps joint angles to servo angles and servo angles to pulses.
//! - [`gait_engine`] produces foot trajectories for the eight phase crawl.
//! - [`keyframe`] interpolates gait keyframes at the motion loop rate.
pub mod conversion;
pub mod gait_engine;
pub mod keyframe;
pub mod solver;
pub mod transform;
