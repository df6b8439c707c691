//! Robot-side types and hardware seams.
//!
//! - [`leg`] and [`joint`]: leg and joint enumerations with indexing helpers.
//! - [`state`]: points, body angles and the body state the motion code works with.
//! - [`pose`]: named joint-space poses.
//! - [`servo`]: the actuator board trait and the buffered servo coordinator.
//! - [`abort`]: the hardware abort line.
//! - [`commands`]: the line protocol spoken by the input link.
pub mod abort;
#[cfg(target_os = "none")]
pub mod board;
pub mod commands;
pub mod joint;
pub mod leg;
#[cfg(test)]
pub mod mock;
pub mod pose;
pub mod servo;
pub mod state;
