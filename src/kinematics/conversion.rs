//! Joint angle, servo angle and pulse width conversion.
//!
//! Solved joint angles (radians) are mapped to servo horn angles (degrees) through each
//! joint's calibration, then to a pulse width, and finally to PCA9685 ticks.
use crate::config::JointCalibration;
use crate::robot::leg::LEGS;
use crate::robot::state::JointAngles;

// --- Actuator board timing ---
pub const PCA_FREQUENCY_HZ: u32 = 50;
pub const PCA_PERIOD_US: f32 = 1_000_000.0 / PCA_FREQUENCY_HZ as f32; // 20000 µs
const PRESCALE_REG_SIZE: f32 = 4096.0;
const PCA_OSCILLATOR_HZ: f32 = 25_000_000.0;

/// Servo angle for one joint, clamped to the servo's sweep.
pub fn joint_to_servo_angle(joint_rad: f32, calibration: &JointCalibration) -> f32 {
    let angle = calibration.center_angle + calibration.direction * joint_rad.to_degrees();
    angle.clamp(0.0, calibration.range)
}

/// Servo angles of all four legs (shoulder, leg, foot).
pub fn joints_to_servo_angles(
    joints: &[JointAngles; 4],
    calibration: &[[JointCalibration; 3]; 4],
) -> [[f32; 3]; 4] {
    let mut angles = [[0.0; 3]; 4];
    for leg in LEGS {
        let cal = &calibration[leg];
        let joint = &joints[leg];
        angles[leg] = [
            joint_to_servo_angle(joint.th1, &cal[0]),
            joint_to_servo_angle(joint.th2, &cal[1]),
            joint_to_servo_angle(joint.th3, &cal[2]),
        ];
    }
    angles
}

/// Pulse width in microseconds for a servo angle in degrees.
pub fn angle_to_pulse(angle: f32, calibration: &JointCalibration) -> f32 {
    let angle = angle.clamp(0.0, calibration.range);
    calibration.min_pulse_us
        + (angle / calibration.range) * (calibration.max_pulse_us - calibration.min_pulse_us)
}

/// PCA9685 off-tick for a pulse width at 50 Hz.
pub fn pulse_to_ticks(pulse_us: f32) -> u16 {
    let tick = (pulse_us / PCA_PERIOD_US) * PRESCALE_REG_SIZE;
    // Clamp the value to the valid PCA9685 range
    libm::roundf(tick).clamp(0.0, PRESCALE_REG_SIZE - 1.0) as u16
}

/// Prescale register value giving the requested output frequency.
pub fn prescale_for(frequency_hz: u32) -> u8 {
    let prescale = libm::roundf(PCA_OSCILLATOR_HZ / (PRESCALE_REG_SIZE * frequency_hz as f32)) - 1.0;
    prescale.clamp(3.0, 255.0) as u8
}
