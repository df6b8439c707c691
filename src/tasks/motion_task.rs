//! The 50 Hz motion loop.
//!
//! Each frame takes the newest controller event off the bus, runs one controller tick
//! and sleeps until the next frame boundary. A shutdown request ends the loop after the
//! servos are rested and the board is powered down.
use embassy_time::{Instant, Timer};
use log::{debug, info};

use crate::bus::{MessageBus, ProcessName, Status};
use crate::config::RobotConfig;
use crate::motion::controller::MotionController;
use crate::robot::board::Pca9685Board;

#[embassy_executor::task]
pub async fn motion_task(config: RobotConfig, board: Pca9685Board, bus: &'static MessageBus) {
    let mut controller = MotionController::new(&config, board, bus, Instant::now());
    bus.publish_lcd(ProcessName::MotionController, Status::Ok);
    info!(
        "[MOTION_TASK] running, {} ms per frame",
        config.control.frame_period_ms
    );

    loop {
        if bus.shutdown_requested() {
            controller.shutdown().await;
            break;
        }
        let event = bus.latest_motion();
        controller.tick(Instant::now(), event).await;

        match controller.end_frame(Instant::now()) {
            Some(deadline) => Timer::at(deadline).await,
            None => debug!(
                "[MOTION_TASK] frame overrun, {} so far",
                controller.clock().overruns()
            ),
        }
    }

    bus.publish_lcd(ProcessName::MotionController, Status::Off);
    info!("[MOTION_TASK] stopped");
}
