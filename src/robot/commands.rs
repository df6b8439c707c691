//! Input link line protocol.
//!
//! Every line is either a control word (`q`, `shutdown`) or a list of whitespace
//! separated `name=value` pairs, e.g. `lx=0.50 ly=-1 start=1 dpad_y=1`. Controls not
//! named on a line keep their previous value.
use core::fmt::{self, Display, Formatter};
use core::ops::ControlFlow;

use heapless::Vec;
use log::warn;

use crate::input::event::{Axis, Button, RawInput, AXES, BUTTONS};

/// Most pairs a single line may carry.
pub const MAX_LINE_PAIRS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Axis(Axis),
    Button(Button),
    DpadX,
    DpadY,
}

impl Control {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "dpad_x" => Some(Control::DpadX),
            "dpad_y" => Some(Control::DpadY),
            _ => AXES
                .into_iter()
                .find(|axis| axis.name() == name)
                .map(Control::Axis)
                .or_else(|| BUTTONS.into_iter().find(|b| b.name() == name).map(Control::Button)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Update(Vec<(Control, f32), MAX_LINE_PAIRS>),
    /// `q`: the client is done, close the connection.
    Close,
    /// `shutdown`: stop the robot gracefully.
    Shutdown,
}

impl InputLine {
    /// Writes the pairs of an update into `raw`.
    pub fn apply(&self, raw: &mut RawInput) {
        let InputLine::Update(pairs) = self else {
            return;
        };
        for (control, value) in pairs {
            match *control {
                Control::Axis(axis) => raw.axes[axis as usize] = value.clamp(-1.0, 1.0),
                Control::Button(button) => raw.buttons[button as usize] = *value != 0.0,
                Control::DpadX => raw.dpad[0] = value.clamp(-1.0, 1.0),
                Control::DpadY => raw.dpad[1] = value.clamp(-1.0, 1.0),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseInputError {
    Empty,
    /// A token is not of the form `name=value`.
    MissingValue,
    UnknownControl,
    InvalidValue,
    TooManyPairs,
}

impl Display for ParseInputError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ParseInputError::Empty => "empty line",
            ParseInputError::MissingValue => "expected name=value",
            ParseInputError::UnknownControl => "unknown control",
            ParseInputError::InvalidValue => "value is not a finite number",
            ParseInputError::TooManyPairs => "too many pairs on one line",
        };
        f.write_str(reason)
    }
}

impl core::error::Error for ParseInputError {}

impl TryFrom<&str> for InputLine {
    type Error = ParseInputError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let line = value.trim();
        match line {
            "" => return Err(ParseInputError::Empty),
            "q" => return Ok(InputLine::Close),
            "shutdown" => return Ok(InputLine::Shutdown),
            _ => {}
        }

        let mut pairs = Vec::new();
        for token in line.split_whitespace() {
            let (name, raw_value) = token.split_once('=').ok_or(ParseInputError::MissingValue)?;
            let control = Control::from_name(name).ok_or(ParseInputError::UnknownControl)?;
            let value = raw_value
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(ParseInputError::InvalidValue)?;
            pairs
                .push((control, value))
                .map_err(|_| ParseInputError::TooManyPairs)?;
        }
        Ok(InputLine::Update(pairs))
    }
}

/// Splits a byte stream into `\n` terminated lines.
///
/// A line longer than `N` bytes is discarded whole, as is one that is not UTF-8.
#[derive(Debug, Default)]
pub struct LineBuffer<const N: usize> {
    buf: Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds received bytes, calling `on_line` for every completed line until it breaks.
    /// Bytes after a break are dropped.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        mut on_line: impl FnMut(&str) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for &byte in bytes {
            if byte != b'\n' {
                if self.buf.push(byte).is_err() {
                    self.overflowed = true;
                }
                continue;
            }
            let flow = if self.overflowed {
                warn!("[NET_TASK] line longer than {N} bytes dropped");
                ControlFlow::Continue(())
            } else {
                match core::str::from_utf8(&self.buf) {
                    Ok(line) => on_line(line),
                    Err(_) => {
                        warn!("[NET_TASK] non UTF-8 line dropped");
                        ControlFlow::Continue(())
                    }
                }
            };
            self.buf.clear();
            self.overflowed = false;
            if flow.is_break() {
                return flow;
            }
        }
        ControlFlow::Continue(())
    }
}
