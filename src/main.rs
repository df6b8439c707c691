#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

#[cfg(target_os = "none")]
extern crate alloc;

#[cfg(target_os = "none")]
mod firmware {
    use alloc::boxed::Box;
    use core::future::pending;

    use embassy_executor::Spawner;
    use embassy_net::{Config as NetConfig, StackResources};
    use esp_backtrace as _;
    use esp_hal::clock::CpuClock;
    use esp_hal::gpio::{Level, Output, OutputConfig};
    use esp_hal::i2c::master::{Config as I2cConfig, I2c};
    use esp_hal::time::Rate;
    use esp_hal::timer::timg::TimerGroup;
    use log::{error, info};
    use spot_robot::bus::{MessageBus, ProcessName, Status};
    use spot_robot::config::RobotConfig;
    use spot_robot::robot::board::Pca9685Board;
    use spot_robot::tasks::abort_task::abort_task;
    use spot_robot::tasks::motion_task::motion_task;
    use spot_robot::tasks::net_task::{configurate_and_start_wifi, net_task, runner_task};
    use spot_robot::tasks::status_task::status_task;

    esp_bootloader_esp_idf::esp_app_desc!();

    macro_rules! mk_static {
        ($t:ty, $val:expr) => {{
            static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
            STATIC_CELL.init_with(|| $val)
        }};
    }

    #[esp_hal_embassy::main]
    async fn main(spawner: Spawner) {
        esp_println::logger::init_logger_from_env();

        let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
        let p = esp_hal::init(config);

        esp_alloc::heap_allocator!(size: 32 * 1024);
        esp_alloc::heap_allocator!(#[unsafe(link_section = ".dram2_uninit")] size: 96 * 1024);

        let timer0 = TimerGroup::new(p.TIMG1);
        esp_hal_embassy::init(timer0.timer0);

        let bus: &'static MessageBus = mk_static!(MessageBus, MessageBus::new());
        let robot = RobotConfig::DEFAULT;
        let robot_valid = match robot.validate() {
            Ok(()) => true,
            Err(e) => {
                error!("Invalid robot configuration, motion disabled: {e}");
                bus.publish_lcd(ProcessName::MotionController, Status::Nok);
                false
            }
        };

        // the abort line comes up high before anything can drive the servos
        let abort_pin = Output::new(p.GPIO23, Level::High, OutputConfig::default());
        spawner
            .spawn(abort_task(abort_pin, bus))
            .expect("Fail spawning abort task");
        spawner
            .spawn(status_task(bus))
            .expect("Fail spawning status task");

        let mut rng = esp_hal::rng::Rng::new(p.RNG);
        let timer1 = TimerGroup::new(p.TIMG0);
        let wifi_init = esp_wifi::init(timer1.timer0, rng, p.RADIO_CLK)
            .expect("Failed to initialize WIFI/BLE controller");
        let wifi_init = Box::leak(Box::new(wifi_init));
        let (mut wifi_controller, interfaces) =
            esp_wifi::wifi::new(wifi_init, p.WIFI).expect("Failed to initialize WIFI controller");

        info!("Starting spot robot...");
        match configurate_and_start_wifi(&mut wifi_controller).await {
            Ok(()) => {
                let seed = (rng.random() as u64) << 32 | rng.random() as u64;
                let net_config = NetConfig::dhcpv4(Default::default());
                let (stack, runner) = embassy_net::new(
                    interfaces.sta,
                    net_config,
                    mk_static!(StackResources<3>, StackResources::new()),
                    seed,
                );
                spawner
                    .spawn(runner_task(runner))
                    .expect("Fail spawning runner task");
                spawner
                    .spawn(net_task(stack, robot.input, bus))
                    .expect("Fail spawning net task");
            }
            Err(e) => {
                error!("Wifi unavailable, no input link: {e}");
                bus.publish_lcd(ProcessName::RemoteController, Status::Nok);
            }
        }

        if robot_valid {
            match I2c::new(p.I2C0, I2cConfig::default().with_frequency(Rate::from_khz(400))) {
                Ok(i2c) => {
                    let i2c = i2c.with_sda(p.GPIO21).with_scl(p.GPIO22).into_async();
                    match Pca9685Board::new(i2c).await {
                        Ok(board) => spawner
                            .spawn(motion_task(robot, board, bus))
                            .expect("Fail spawning motion task"),
                        Err(e) => {
                            error!("Actuator board unavailable: {e}");
                            bus.publish_lcd(ProcessName::MotionController, Status::Nok);
                        }
                    }
                }
                Err(e) => {
                    error!("I2C configuration failed: {e:?}");
                    bus.publish_lcd(ProcessName::MotionController, Status::Nok);
                }
            }
        }

        loop {
            pending::<()>().await;
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
