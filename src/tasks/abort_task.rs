//! Abort line task: applies ABORT commands and reports the line state.
use embassy_time::{Duration, Instant};
use esp_hal::gpio::Output;
use log::{debug, info};

use crate::bus::{MessageBus, ProcessName, Status};
use crate::robot::abort::AbortController;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn abort_task(pin: Output<'static>, bus: &'static MessageBus) {
    let mut abort = AbortController::new(pin);
    bus.publish_lcd(ProcessName::AbortController, Status::Off);
    info!("[ABORT_TASK] abort line held high");

    let mut last_log = Instant::now();
    loop {
        match bus.receive_abort(POLL_INTERVAL).await {
            Some(command) => {
                let (process, status) = abort.handle(command);
                bus.publish_lcd(process, status);
            }
            None if last_log.elapsed() >= IDLE_LOG_INTERVAL => {
                debug!("[ABORT_TASK] aborted: {}", abort.is_aborted());
                last_log = Instant::now();
            }
            None => {}
        }
    }
}
