//! Digital abort line.
//!
//! The line is active low: servos may only move while it is driven low. It starts high.
use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::bus::{AbortCommand, ProcessName, Status};

pub struct AbortController<P> {
    pin: P,
    aborted: bool,
}

impl<P: OutputPin> AbortController<P> {
    pub fn new(mut pin: P) -> Self {
        if pin.set_high().is_err() {
            warn!("[ABORT_TASK] could not drive the abort line high");
        }
        Self { pin, aborted: true }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Applies a command and returns the LCD status to publish.
    pub fn handle(&mut self, command: AbortCommand) -> (ProcessName, Status) {
        let result = match command {
            AbortCommand::Activate => self.pin.set_low(),
            AbortCommand::Abort => self.pin.set_high(),
        };
        if result.is_err() {
            warn!("[ABORT_TASK] abort line write failed for {command:?}");
        }
        self.aborted = command == AbortCommand::Abort;
        info!("[ABORT_TASK] {command:?}");
        let status = if self.aborted { Status::Off } else { Status::On };
        (ProcessName::AbortController, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::mock::MockPin;

    #[test]
    fn starts_aborted_with_line_high() {
        let abort = AbortController::new(MockPin::default());
        assert!(abort.is_aborted());
        assert!(abort.pin.high);
    }

    #[test]
    fn commands_drive_the_line_and_report_status() {
        let mut abort = AbortController::new(MockPin::default());
        assert_eq!(
            abort.handle(AbortCommand::Activate),
            (ProcessName::AbortController, Status::On)
        );
        assert!(!abort.pin.high);
        assert!(!abort.is_aborted());
        assert_eq!(
            abort.handle(AbortCommand::Abort),
            (ProcessName::AbortController, Status::Off)
        );
        assert!(abort.pin.high);
        assert_eq!(abort.pin.changes, 3);
    }
}
