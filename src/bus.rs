//! Inter-task messaging.
//!
//! Tasks share no state; everything goes through the four bounded topic queues of one
//! [`MessageBus`], created once and handed to every task by `&'static` reference. The
//! motion task never blocks on the bus: its sends are `try_send` and its MOTION reads
//! drain whatever is queued.
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use log::{debug, warn};

use crate::input::event::ControllerEvent;
use crate::motion::state_machine::RobotStateName;
use crate::robot::state::FeetPositions;
use crate::{ABORT_CHANNEL_SIZE, LCD_CHANNEL_SIZE, MOTION_CHANNEL_SIZE, TELEMETRY_CHANNEL_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Abort,
    Motion,
    Lcd,
    Telemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Nok,
    On,
    Off,
    Searching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCommand {
    /// Release the abort line so the servos may move.
    Activate,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessName {
    MotionController,
    AbortController,
    RemoteController,
    Telemetry,
}

pub const PROCESSES: [ProcessName; 4] = [
    ProcessName::MotionController,
    ProcessName::AbortController,
    ProcessName::RemoteController,
    ProcessName::Telemetry,
];

/// Snapshot of the motion loop published every few frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub state: RobotStateName,
    pub activated: bool,
    pub loop_time_us: u32,
    pub idle_time_us: u32,
    pub overruns: u32,
    pub forward_factor: f32,
    pub rotation_factor: f32,
    pub lean_factor: f32,
    pub height_factor: f32,
    pub walking_speed: u8,
    pub phase_index: u8,
    pub ratio: f32,
    pub feet: FeetPositions,
    pub servo_angles: [[f32; 3]; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Abort(AbortCommand),
    Motion(ControllerEvent),
    Lcd(ProcessName),
    Telemetry(TelemetryFrame),
}

impl Payload {
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Abort(_) => Topic::Abort,
            Payload::Motion(_) => Topic::Motion,
            Payload::Lcd(_) => Topic::Lcd,
            Payload::Telemetry(_) => Topic::Telemetry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Message {
    pub topic: Topic,
    pub status: Status,
    pub payload: Payload,
}

impl Message {
    pub fn new(status: Status, payload: Payload) -> Self {
        Self {
            topic: payload.topic(),
            status,
            payload,
        }
    }
}

pub struct MessageBus<M: RawMutex = CriticalSectionRawMutex> {
    abort: Channel<M, Message, ABORT_CHANNEL_SIZE>,
    motion: Channel<M, Message, MOTION_CHANNEL_SIZE>,
    lcd: Channel<M, Message, LCD_CHANNEL_SIZE>,
    telemetry: Channel<M, Message, TELEMETRY_CHANNEL_SIZE>,
    shutdown: Signal<M, ()>,
}

impl<M: RawMutex> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> MessageBus<M> {
    pub const fn new() -> Self {
        Self {
            abort: Channel::new(),
            motion: Channel::new(),
            lcd: Channel::new(),
            telemetry: Channel::new(),
            shutdown: Signal::new(),
        }
    }

    /// Queues `message` on its topic without waiting. Returns whether it was queued.
    pub fn publish(&self, message: Message) -> bool {
        if message.payload.topic() != message.topic {
            warn!(
                "[BUS] {:?} payload sent on {:?}, discarded",
                message.payload.topic(),
                message.topic
            );
            return false;
        }
        let queued = match message.topic {
            Topic::Abort => self.abort.try_send(message).is_ok(),
            Topic::Motion => self.motion.try_send(message).is_ok(),
            Topic::Lcd => self.lcd.try_send(message).is_ok(),
            Topic::Telemetry => self.telemetry.try_send(message).is_ok(),
        };
        if !queued {
            match message.topic {
                Topic::Motion | Topic::Telemetry => debug!("[BUS] {:?} queue full, dropped", message.topic),
                Topic::Abort | Topic::Lcd => warn!("[BUS] {:?} queue full, dropped", message.topic),
            }
        }
        queued
    }

    pub fn publish_abort(&self, command: AbortCommand) -> bool {
        self.publish(Message::new(Status::Ok, Payload::Abort(command)))
    }

    pub fn publish_lcd(&self, process: ProcessName, status: Status) -> bool {
        self.publish(Message::new(status, Payload::Lcd(process)))
    }

    pub fn publish_motion(&self, event: ControllerEvent) -> bool {
        self.publish(Message::new(Status::Ok, Payload::Motion(event)))
    }

    /// Queues a telemetry frame; when the queue is full the new frame is dropped.
    pub fn publish_telemetry(&self, frame: TelemetryFrame) -> bool {
        self.publish(Message::new(Status::Ok, Payload::Telemetry(frame)))
    }

    /// Drains the MOTION queue and returns the newest event, if any arrived.
    pub fn latest_motion(&self) -> Option<ControllerEvent> {
        let mut latest = None;
        while let Ok(message) = self.motion.try_receive() {
            match message.payload {
                Payload::Motion(event) => latest = Some(event),
                other => warn!("[BUS] unexpected {:?} payload on MOTION", other.topic()),
            }
        }
        latest
    }

    pub async fn receive_abort(&self, timeout: Duration) -> Option<AbortCommand> {
        let message = with_timeout(timeout, self.abort.receive()).await.ok()?;
        match message.payload {
            Payload::Abort(command) => Some(command),
            other => {
                warn!("[BUS] unexpected {:?} payload on ABORT", other.topic());
                None
            }
        }
    }

    pub async fn receive_lcd(&self, timeout: Duration) -> Option<(ProcessName, Status)> {
        let message = with_timeout(timeout, self.lcd.receive()).await.ok()?;
        match message.payload {
            Payload::Lcd(process) => Some((process, message.status)),
            other => {
                warn!("[BUS] unexpected {:?} payload on LCD", other.topic());
                None
            }
        }
    }

    pub fn try_receive_telemetry(&self) -> Option<TelemetryFrame> {
        match self.telemetry.try_receive().ok()?.payload {
            Payload::Telemetry(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.signal(());
    }

    /// Checked by the motion task at the top of every frame; does not consume the signal.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.signaled()
    }
}

/// Last status reported by each process, as shown on the status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBoard {
    statuses: [Status; 4],
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            statuses: [Status::Searching; 4],
        }
    }
}

impl StatusBoard {
    pub fn status(&self, process: ProcessName) -> Status {
        self.statuses[process as usize]
    }

    /// Records a status and returns whether it changed.
    pub fn update(&mut self, process: ProcessName, status: Status) -> bool {
        let slot = &mut self.statuses[process as usize];
        let changed = *slot != status;
        *slot = status;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::ControllerEvent;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn frame(overruns: u32) -> TelemetryFrame {
        TelemetryFrame {
            state: RobotStateName::Idle,
            activated: false,
            loop_time_us: 0,
            idle_time_us: 0,
            overruns,
            forward_factor: 0.0,
            rotation_factor: 0.0,
            lean_factor: 0.0,
            height_factor: 0.0,
            walking_speed: 1,
            phase_index: 0,
            ratio: 0.0,
            feet: Default::default(),
            servo_angles: [[90.0; 3]; 4],
        }
    }

    #[test]
    fn telemetry_drops_the_newest_frame_when_full() {
        let bus = MessageBus::<NoopRawMutex>::new();
        for i in 0..TELEMETRY_CHANNEL_SIZE as u32 {
            assert!(bus.publish_telemetry(frame(i)));
        }
        assert!(!bus.publish_telemetry(frame(99)));
        let received: Vec<u32> = core::iter::from_fn(|| bus.try_receive_telemetry())
            .map(|f| f.overruns)
            .collect();
        assert_eq!(received, (0..TELEMETRY_CHANNEL_SIZE as u32).collect::<Vec<_>>());
    }

    #[test]
    fn mismatched_payload_is_discarded() {
        let bus = MessageBus::<NoopRawMutex>::new();
        let message = Message {
            topic: Topic::Motion,
            status: Status::Ok,
            payload: Payload::Abort(AbortCommand::Abort),
        };
        assert!(!bus.publish(message));
        assert_eq!(bus.latest_motion(), None);
    }

    #[test]
    fn motion_reader_keeps_only_the_latest_event() {
        let bus = MessageBus::<NoopRawMutex>::new();
        let first = ControllerEvent::new([0.1; 6], [false; 10], [0, 0]);
        let second = ControllerEvent::new([0.2; 6], [false; 10], [0, 0]);
        bus.publish_motion(first);
        bus.publish_motion(second);
        assert_eq!(bus.latest_motion(), Some(second));
        assert_eq!(bus.latest_motion(), None);
    }

    #[test]
    fn motion_queue_never_blocks_the_producer() {
        let bus = MessageBus::<NoopRawMutex>::new();
        let event = ControllerEvent::default();
        for _ in 0..MOTION_CHANNEL_SIZE {
            assert!(bus.publish_motion(event));
        }
        assert!(!bus.publish_motion(event));
    }

    #[test]
    fn abort_and_lcd_round_trip_with_status() {
        let bus = MessageBus::<NoopRawMutex>::new();
        bus.publish_abort(AbortCommand::Activate);
        bus.publish_lcd(ProcessName::MotionController, Status::On);
        let timeout = Duration::from_millis(1);
        assert_eq!(block_on(bus.receive_abort(timeout)), Some(AbortCommand::Activate));
        assert_eq!(
            block_on(bus.receive_lcd(timeout)),
            Some((ProcessName::MotionController, Status::On))
        );
    }

    #[test]
    fn shutdown_signal_is_sticky() {
        let bus = MessageBus::<NoopRawMutex>::new();
        assert!(!bus.shutdown_requested());
        bus.request_shutdown();
        assert!(bus.shutdown_requested());
        assert!(bus.shutdown_requested());
    }

    #[test]
    fn status_board_reports_changes() {
        let mut board = StatusBoard::default();
        assert_eq!(board.status(ProcessName::Telemetry), Status::Searching);
        assert!(board.update(ProcessName::AbortController, Status::On));
        assert!(!board.update(ProcessName::AbortController, Status::On));
        assert_eq!(board.status(ProcessName::AbortController), Status::On);
    }

    #[test]
    fn startup_failures_reach_the_status_board_as_nok() {
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut board = StatusBoard::default();
        assert!(bus.publish_lcd(ProcessName::MotionController, Status::Nok));
        assert!(bus.publish_lcd(ProcessName::RemoteController, Status::Nok));

        let timeout = Duration::from_millis(1);
        while let Some((process, status)) = block_on(bus.receive_lcd(timeout)) {
            board.update(process, status);
        }
        assert_eq!(board.status(ProcessName::MotionController), Status::Nok);
        assert_eq!(board.status(ProcessName::RemoteController), Status::Nok);
        assert_eq!(board.status(ProcessName::AbortController), Status::Searching);
    }
}
