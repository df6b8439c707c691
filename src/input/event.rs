//! Gamepad snapshots.
use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
    LeftTrigger = 4,
    RightTrigger = 5,
}

pub const AXES: [Axis; 6] = [
    Axis::LeftX,
    Axis::LeftY,
    Axis::RightX,
    Axis::RightY,
    Axis::LeftTrigger,
    Axis::RightTrigger,
];

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::LeftX => "lx",
            Axis::LeftY => "ly",
            Axis::RightX => "rx",
            Axis::RightY => "ry",
            Axis::LeftTrigger => "lt",
            Axis::RightTrigger => "rt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    Start = 4,
    Back = 5,
    L1 = 6,
    R1 = 7,
    /// Left stick click.
    L3 = 8,
    /// Right stick click.
    R3 = 9,
}

pub const BUTTONS: [Button; 10] = [
    Button::A,
    Button::B,
    Button::X,
    Button::Y,
    Button::Start,
    Button::Back,
    Button::L1,
    Button::R1,
    Button::L3,
    Button::R3,
];

impl Button {
    pub fn name(self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::X => "x",
            Button::Y => "y",
            Button::Start => "start",
            Button::Back => "back",
            Button::L1 => "l1",
            Button::R1 => "r1",
            Button::L3 => "l3",
            Button::R3 => "r3",
        }
    }
}

impl Display for Button {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unfiltered controller state as last reported by the input link.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawInput {
    pub axes: [f32; 6],
    pub buttons: [bool; 10],
    pub dpad: [f32; 2],
}

/// Filtered controller state for one tick. Built once and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerEvent {
    axes: [f32; 6],
    buttons: [bool; 10],
    dpad: [i8; 2],
}

impl ControllerEvent {
    pub fn new(axes: [f32; 6], buttons: [bool; 10], dpad: [i8; 2]) -> Self {
        Self {
            axes: axes.map(|v| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }),
            buttons,
            dpad: dpad.map(|v| v.signum()),
        }
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes[axis as usize]
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons[button as usize]
    }

    pub fn dpad_x(&self) -> i8 {
        self.dpad[0]
    }

    pub fn dpad_y(&self) -> i8 {
        self.dpad[1]
    }

    /// Whether any axis exceeds `threshold` or any button or d-pad direction is held.
    pub fn has_activity(&self, threshold: f32) -> bool {
        self.axes.iter().any(|v| libm::fabsf(*v) > threshold)
            || self.buttons.iter().any(|b| *b)
            || self.dpad.iter().any(|d| *d != 0)
    }

    /// Edges between `previous` and this event.
    pub fn edges(&self, previous: &ControllerEvent) -> ButtonEdges {
        let mut pressed = [false; 10];
        for button in BUTTONS {
            pressed[button as usize] = self.button(button) && !previous.button(button);
        }
        let edge = |now: i8, before: i8| if now != before { now } else { 0 };
        ButtonEdges {
            pressed,
            dpad_x: edge(self.dpad_x(), previous.dpad_x()),
            dpad_y: edge(self.dpad_y(), previous.dpad_y()),
        }
    }

    /// Whether an axis moved by at least `threshold` since `previous`.
    pub fn axis_changed(&self, previous: &ControllerEvent, axis: Axis, threshold: f32) -> bool {
        libm::fabsf(self.axis(axis) - previous.axis(axis)) >= threshold
    }
}

/// Buttons that went from released to pressed, and d-pad directions newly held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonEdges {
    pressed: [bool; 10],
    pub dpad_x: i8,
    pub dpad_y: i8,
}

impl ButtonEdges {
    pub fn pressed(&self, button: Button) -> bool {
        self.pressed[button as usize]
    }
}
