//! The per-frame motion pipeline.
//!
//! One [`MotionController::tick`] handles the newest controller event, runs the
//! inactivity failsafe, advances the current state and commits the servos. Board
//! failures deactivate the board at once and drive the machine to IDLE on the next tick.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::bus::{AbortCommand, MessageBus, TelemetryFrame};
use crate::config::RobotConfig;
use crate::input::event::ControllerEvent;
use crate::motion::context::MotionContext;
use crate::motion::state_machine::{RobotStateName, StateMachine};
use crate::robot::servo::{ActuatorBoard, BoardError};

/// Fixed rate scheduling with overrun accounting.
///
/// An overrun frame starts the next one immediately and moves the schedule forward;
/// missed frames are never replayed.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    period: Duration,
    frame_start: Instant,
    busy: Duration,
    idle: Duration,
    overruns: u32,
}

impl FrameClock {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            frame_start: now,
            busy: Duration::from_ticks(0),
            idle: Duration::from_ticks(0),
            overruns: 0,
        }
    }

    /// Closes the current frame and returns the instant to sleep until, if any.
    pub fn end_frame(&mut self, now: Instant) -> Option<Instant> {
        let deadline = self.frame_start + self.period;
        self.busy = now.saturating_duration_since(self.frame_start);
        if now >= deadline {
            self.overruns = self.overruns.saturating_add(1);
            self.idle = Duration::from_ticks(0);
            self.frame_start = now;
            None
        } else {
            self.idle = deadline - now;
            self.frame_start = deadline;
            Some(deadline)
        }
    }

    pub fn busy(&self) -> Duration {
        self.busy
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

pub struct MotionController<'a, B, M: RawMutex> {
    ctx: MotionContext<'a, B, M>,
    machine: StateMachine,
    clock: FrameClock,
    inactivity_timeout: Duration,
    last_activity: Instant,
    fault_pending: bool,
    frames: u32,
}

impl<'a, B: ActuatorBoard, M: RawMutex> MotionController<'a, B, M> {
    pub fn new(config: &RobotConfig, board: B, bus: &'a MessageBus<M>, now: Instant) -> Self {
        Self {
            ctx: MotionContext::new(config, board, bus),
            machine: StateMachine::new(),
            clock: FrameClock::new(Duration::from_millis(config.control.frame_period_ms), now),
            inactivity_timeout: Duration::from_millis(config.control.inactivity_timeout_ms),
            last_activity: now,
            fault_pending: false,
            frames: 0,
        }
    }

    pub fn state(&self) -> RobotStateName {
        self.machine.name()
    }

    pub fn context(&self) -> &MotionContext<'a, B, M> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut MotionContext<'a, B, M> {
        &mut self.ctx
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn end_frame(&mut self, now: Instant) -> Option<Instant> {
        self.clock.end_frame(now)
    }

    pub async fn tick(&mut self, now: Instant, event: Option<ControllerEvent>) {
        self.ctx.servos.begin_frame();
        if self.fault_pending {
            self.fault_pending = false;
            if let Err(e) = self.machine.force_idle(&mut self.ctx).await {
                warn!("[MOTION_TASK] returning to IDLE after fault: {e}");
            }
        }

        if let Some(event) = event {
            if event.has_activity(self.ctx.config.input.activity_threshold) {
                self.last_activity = now;
            }
            if let Err(e) = self.machine.handle_event(&mut self.ctx, event).await {
                self.fault(e).await;
                return;
            }
        }

        if self.ctx.servos.is_active()
            && now.saturating_duration_since(self.last_activity) > self.inactivity_timeout
        {
            warn!("[MOTION_TASK] no input for {} ms, resting", self.inactivity_timeout.as_millis());
            if let Err(e) = self.machine.force_idle(&mut self.ctx).await {
                self.fault(e).await;
                return;
            }
        }

        self.machine.update(&mut self.ctx);
        if let Err(e) = self.ctx.servos.commit().await {
            self.fault(e).await;
            return;
        }

        self.frames = self.frames.wrapping_add(1);
        let interval = self.ctx.config.control.telemetry_interval_frames.max(1);
        if self.frames % interval == 0 {
            self.ctx.bus.publish_telemetry(self.telemetry());
        }
    }

    async fn fault(&mut self, error: BoardError) {
        warn!("[MOTION_TASK] actuator board failure: {error}");
        self.ctx.servos.force_deactivate().await;
        self.ctx.bus.publish_abort(AbortCommand::Abort);
        self.fault_pending = true;
    }

    /// Rests the servos, powers the board down and releases the abort line.
    pub async fn shutdown(&mut self) {
        info!("[MOTION_TASK] shutting down");
        let result = if self.machine.name() == RobotStateName::Idle {
            let result = self.ctx.servos.deactivate().await;
            self.ctx.bus.publish_abort(AbortCommand::Abort);
            result
        } else {
            self.machine.force_idle(&mut self.ctx).await
        };
        if let Err(e) = result {
            warn!("[MOTION_TASK] shutdown: {e}");
            self.ctx.servos.force_deactivate().await;
            self.ctx.bus.publish_abort(AbortCommand::Abort);
        }
    }

    pub fn telemetry(&self) -> TelemetryFrame {
        let keyframes = &self.ctx.keyframes;
        let frame = TelemetryFrame {
            state: self.machine.name(),
            activated: self.ctx.servos.is_active(),
            loop_time_us: self.clock.busy().as_micros() as u32,
            idle_time_us: self.clock.idle().as_micros() as u32,
            overruns: self.clock.overruns(),
            forward_factor: keyframes.forward_factor(),
            rotation_factor: keyframes.rotation_factor(),
            lean_factor: keyframes.lean_factor(),
            height_factor: keyframes.height_factor(),
            walking_speed: keyframes.walking_speed(),
            phase_index: self.ctx.gait.phase_index() as u8,
            ratio: keyframes.ratio(),
            feet: self.ctx.filters.body.value().feet,
            servo_angles: *self.ctx.servos.staged(),
        };
        debug!("[MOTION_TASK] telemetry {:?} overruns {}", frame.state, frame.overruns);
        frame
    }
}
