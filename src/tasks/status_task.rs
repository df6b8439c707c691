//! Status task: keeps the per-process status board and drains telemetry.
use embassy_time::Duration;
use log::{debug, info};

use crate::bus::{MessageBus, StatusBoard};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[embassy_executor::task]
pub async fn status_task(bus: &'static MessageBus) {
    let mut board = StatusBoard::default();

    loop {
        if let Some((process, status)) = bus.receive_lcd(POLL_INTERVAL).await {
            if board.update(process, status) {
                info!("[STATUS_TASK] {process:?}: {status:?}");
            }
        }
        while let Some(frame) = bus.try_receive_telemetry() {
            debug!(
                "[STATUS_TASK] {} active={} loop={}us idle={}us overruns={} speed={} phase={}",
                frame.state,
                frame.activated,
                frame.loop_time_us,
                frame.idle_time_us,
                frame.overruns,
                frame.walking_speed,
                frame.phase_index
            );
        }
    }
}
