//! Library root for the Spot quadruped firmware.
//!
//! The motion core ([`kinematics`], [`motion`], [`input`], [`robot`], [`bus`], [`config`])
//! is portable `no_std` code and is tested on the host. The Embassy [`tasks`] and the
//! PCA9685 board driver only exist when building for the ESP32.
#![cfg_attr(target_os = "none", no_std)]

pub mod bus;
pub mod config;
pub mod input;
pub mod kinematics;
pub mod motion;
pub mod robot;
#[cfg(target_os = "none")]
pub mod tasks;

pub const ABORT_CHANNEL_SIZE: usize = 10;
pub const MOTION_CHANNEL_SIZE: usize = 4;
pub const LCD_CHANNEL_SIZE: usize = 10;
pub const TELEMETRY_CHANNEL_SIZE: usize = 10;
