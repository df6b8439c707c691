//! PCA9685 actuator board on the ESP32 I2C bus.
use anyhow::anyhow;
use esp_hal::{i2c::master::I2c, Async};
use log::{error, info};
use pwm_pca9685::{Address, Channel, Pca9685};

use crate::kinematics::conversion::{prescale_for, pulse_to_ticks, PCA_FREQUENCY_HZ};
use crate::robot::servo::{ActuatorBoard, BoardError};

const CHANNELS: [Channel; 16] = [
    Channel::C0,
    Channel::C1,
    Channel::C2,
    Channel::C3,
    Channel::C4,
    Channel::C5,
    Channel::C6,
    Channel::C7,
    Channel::C8,
    Channel::C9,
    Channel::C10,
    Channel::C11,
    Channel::C12,
    Channel::C13,
    Channel::C14,
    Channel::C15,
];

pub struct Pca9685Board {
    pwm: Pca9685<I2c<'static, Async>>,
    active: bool,
}

impl Pca9685Board {
    /// Configures the board for 50 Hz servo pulses. Outputs stay disabled.
    pub async fn new(i2c: I2c<'static, Async>) -> anyhow::Result<Self> {
        let mut pwm = Pca9685::new(i2c, Address::default())
            .map_err(|e| anyhow!("PCA9685 init failed: {e:?}"))?;
        pwm.set_prescale(prescale_for(PCA_FREQUENCY_HZ))
            .await
            .map_err(|e| anyhow!("PCA9685 prescale failed: {e:?}"))?;
        pwm.disable()
            .await
            .map_err(|e| anyhow!("PCA9685 disable failed: {e:?}"))?;
        info!("[MOTION_TASK] PCA9685 ready at {PCA_FREQUENCY_HZ} Hz");
        Ok(Self { pwm, active: false })
    }

    fn channel(channel: u8) -> Result<Channel, BoardError> {
        CHANNELS
            .get(channel as usize)
            .copied()
            .ok_or(BoardError::InvalidChannel(channel))
    }
}

impl ActuatorBoard for Pca9685Board {
    async fn set_channel_pulse(&mut self, channel: u8, pulse_us: f32) -> Result<(), BoardError> {
        let target = Self::channel(channel)?;
        self.pwm
            .set_channel_on_off(target, 0, pulse_to_ticks(pulse_us))
            .await
            .map_err(|e| {
                error!("[MOTION_TASK] channel {channel}: {e:?}");
                BoardError::Bus
            })
    }

    async fn activate(&mut self) -> Result<(), BoardError> {
        self.pwm.enable().await.map_err(|e| {
            error!("[MOTION_TASK] enabling PCA9685: {e:?}");
            BoardError::Bus
        })?;
        self.active = true;
        Ok(())
    }

    async fn deactivate(&mut self) -> Result<(), BoardError> {
        // the board counts as off even if the bus fails below
        self.active = false;
        for channel in CHANNELS {
            self.pwm
                .set_channel_full_off(channel)
                .await
                .map_err(|_| BoardError::Bus)?;
        }
        self.pwm.disable().await.map_err(|_| BoardError::Bus)
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
