//! Test doubles for the actuator board and the abort line.
use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::robot::servo::{ActuatorBoard, BoardError};

/// Records every pulse written while active.
#[derive(Debug, Default)]
pub struct MockBoard {
    pub active: bool,
    pub writes: Vec<(u8, f32)>,
    pub activations: usize,
    pub deactivations: usize,
    pub fail_writes: bool,
}

impl ActuatorBoard for MockBoard {
    async fn set_channel_pulse(&mut self, channel: u8, pulse_us: f32) -> Result<(), BoardError> {
        if self.fail_writes {
            return Err(BoardError::Bus);
        }
        self.writes.push((channel, pulse_us));
        Ok(())
    }

    async fn activate(&mut self) -> Result<(), BoardError> {
        self.active = true;
        self.activations += 1;
        Ok(())
    }

    async fn deactivate(&mut self) -> Result<(), BoardError> {
        self.active = false;
        self.deactivations += 1;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Default)]
pub struct MockPin {
    pub high: bool,
    pub changes: usize,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.changes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.changes += 1;
        Ok(())
    }
}
