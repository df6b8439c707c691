//! Embassy tasks of the firmware.
//!
//! - [`motion_task`]: the fixed rate motion loop.
//! - [`net_task`]: WiFi, the TCP input link and controller event filtering.
//! - [`abort_task`]: drives the hardware abort line.
//! - [`status_task`]: tracks process status and drains telemetry.
//!
//! Tasks are spawned from `main.rs` and only talk through the [`MessageBus`](crate::bus::MessageBus).
pub mod abort_task;
pub mod motion_task;
pub mod net_task;
pub mod status_task;
