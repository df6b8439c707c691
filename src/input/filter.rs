//! Input shaping: deadzone, smoothing, response curve and button debounce.
use embassy_time::{Duration, Instant};
use log::debug;
use micromath::F32Ext;

use crate::config::InputConfig;
use crate::input::event::{Button, ControllerEvent, RawInput, AXES, BUTTONS};

#[derive(Debug, Clone, Copy)]
pub struct FilteredAnalogAxis {
    deadzone: f32,
    smoothing: f32,
    exponent: Option<f32>,
    min_interval: Duration,
    threshold: f32,
    smoothed: f32,
    emitted: f32,
    last_emit: Option<Instant>,
}

impl FilteredAnalogAxis {
    pub fn new(config: &InputConfig) -> Self {
        let exponent = (config.response_exponent != 1.0).then_some(config.response_exponent);
        Self {
            deadzone: config.deadzone,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            exponent,
            min_interval: Duration::from_millis(config.min_update_interval_ms),
            threshold: config.axis_threshold,
            smoothed: 0.0,
            emitted: 0.0,
            last_emit: None,
        }
    }

    pub fn value(&self) -> f32 {
        self.emitted
    }

    pub fn update(&mut self, raw: f32, now: Instant) -> f32 {
        let raw = if raw.is_finite() { raw.clamp(-1.0, 1.0) } else { 0.0 };
        let input = if F32Ext::abs(raw) < self.deadzone { 0.0 } else { raw };
        self.smoothed += self.smoothing * (input - self.smoothed);
        if input == 0.0 && F32Ext::abs(self.smoothed) < self.threshold {
            self.smoothed = 0.0;
        }

        let shaped = match self.exponent {
            Some(exponent) => {
                let magnitude = F32Ext::powf(F32Ext::abs(self.smoothed), exponent);
                if self.smoothed < 0.0 { -magnitude } else { magnitude }
            }
            None => self.smoothed,
        };

        let interval_elapsed = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval);
        let changed = F32Ext::abs(shaped - self.emitted) >= self.threshold
            || (shaped == 0.0 && self.emitted != 0.0);
        if interval_elapsed && changed {
            self.emitted = shaped;
            self.last_emit = Some(now);
        }
        self.emitted
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DebouncedButton {
    window: Duration,
    previous_raw: bool,
    level: bool,
    last_accepted: Option<Instant>,
    callback: Option<fn()>,
}

impl DebouncedButton {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            previous_raw: false,
            level: false,
            last_accepted: None,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: fn()) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn is_pressed(&self) -> bool {
        self.level
    }

    /// Returns the debounced level: set from an accepted press until release.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if pressed && !self.previous_raw {
            let accepted = self
                .last_accepted
                .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
            if accepted {
                self.level = true;
                self.last_accepted = Some(now);
                if let Some(callback) = self.callback {
                    callback();
                }
            }
        } else if !pressed {
            self.level = false;
        }
        self.previous_raw = pressed;
        self.level
    }
}

/// Rebuilds a [`ControllerEvent`] from raw input once per read cycle.
#[derive(Debug, Clone)]
pub struct ControllerEventFilter {
    axes: [FilteredAnalogAxis; 6],
    buttons: [DebouncedButton; 10],
    dpad_deadzone: f32,
}

impl ControllerEventFilter {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            axes: [FilteredAnalogAxis::new(config); 6],
            buttons: [DebouncedButton::new(Duration::from_millis(config.debounce_ms)); 10],
            dpad_deadzone: config.deadzone,
        }
    }

    pub fn set_callback(&mut self, button: Button, callback: fn()) {
        self.buttons[button as usize] = self.buttons[button as usize].with_callback(callback);
    }

    pub fn update(&mut self, raw: &RawInput, now: Instant) -> ControllerEvent {
        let mut axes = [0.0; 6];
        for axis in AXES {
            let index = axis as usize;
            axes[index] = self.axes[index].update(raw.axes[index], now);
        }
        let mut buttons = [false; 10];
        for button in BUTTONS {
            let index = button as usize;
            let was_pressed = self.buttons[index].is_pressed();
            buttons[index] = self.buttons[index].update(raw.buttons[index], now);
            if buttons[index] && !was_pressed {
                debug!("[NET_TASK] {button} pressed");
            }
        }
        let dpad = raw.dpad.map(|v| quantize(v, self.dpad_deadzone));
        ControllerEvent::new(axes, buttons, dpad)
    }
}

fn quantize(value: f32, deadzone: f32) -> i8 {
    if value > deadzone {
        1
    } else if value < -deadzone {
        -1
    } else {
        0
    }
}
