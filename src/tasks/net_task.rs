//! Networking and the TCP input link.
//!
//! Manages the WiFi connection and accepts one client at a time. Received lines update
//! the raw controller state; the filtered [`ControllerEvent`] is published on MOTION at
//! the configured rate while a client is connected.
extern crate alloc;

use alloc::string::String;
use core::ops::ControlFlow;

use anyhow::anyhow;
use embassy_futures::select::{select, Either};
use embassy_net::{tcp::TcpSocket, IpListenEndpoint, Stack};
use embassy_time::{Duration, Instant, Ticker, Timer};
use embedded_io_async::Read;
use esp_wifi::wifi::{ClientConfiguration, WifiController, WifiDevice};
use log::{error, info, warn};

use crate::bus::{MessageBus, ProcessName, Status};
use crate::config::{InputConfig, LINE_BUF_SIZE, PORT, RX_BUF_SIZE, TX_BUF_SIZE};
use crate::input::event::{ControllerEvent, RawInput};
use crate::input::filter::ControllerEventFilter;
use crate::robot::commands::{InputLine, LineBuffer, ParseInputError};

#[embassy_executor::task]
pub async fn runner_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

#[embassy_executor::task]
pub async fn net_task(stack: Stack<'static>, config: InputConfig, bus: &'static MessageBus) {
    let mut rx_buf = [0u8; RX_BUF_SIZE];
    let mut tx_buf = [0u8; TX_BUF_SIZE];
    let period = Duration::from_millis(1000 / config.publish_rate_hz.max(1) as u64);

    bus.publish_lcd(ProcessName::RemoteController, Status::Searching);
    while !stack.is_link_up() {
        Timer::after_millis(500).await;
    }

    if let Some(config) = stack.config_v4() {
        info!(
            "[NET_TASK] input link listening at {}:{}",
            config.address, PORT
        );
    }

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);

        if let Err(e) = socket
            .accept(IpListenEndpoint {
                port: PORT,
                addr: None,
            })
            .await
        {
            error!("[NET_TASK] accept failed: {e:?}");
            Timer::after_millis(500).await;
            continue;
        }

        info!("[NET_TASK] client connected");
        bus.publish_lcd(ProcessName::RemoteController, Status::On);
        let mut filter = ControllerEventFilter::new(&config);
        handle_connection(&mut socket, &mut filter, period, bus).await;
        socket.close();

        // released controls, so a dropped client cannot leave the robot walking
        bus.publish_motion(ControllerEvent::default());
        bus.publish_lcd(ProcessName::RemoteController, Status::Searching);
        info!("[NET_TASK] client disconnected");
    }
}

pub async fn handle_connection<S: Read>(
    socket: &mut S,
    filter: &mut ControllerEventFilter,
    period: Duration,
    bus: &MessageBus,
) {
    let mut rx_buf = [0u8; RX_BUF_SIZE];
    let mut lines = LineBuffer::<LINE_BUF_SIZE>::new();
    let mut raw = RawInput::default();
    let mut ticker = Ticker::every(period);

    loop {
        match select(socket.read(&mut rx_buf), ticker.next()).await {
            Either::First(Ok(0)) => break,
            Either::First(Ok(n)) => {
                let flow = lines.feed(&rx_buf[..n], |line| match InputLine::try_from(line) {
                    Ok(InputLine::Close) => ControlFlow::Break(()),
                    Ok(InputLine::Shutdown) => {
                        warn!("[NET_TASK] shutdown requested by the client");
                        bus.request_shutdown();
                        ControlFlow::Break(())
                    }
                    Ok(update) => {
                        update.apply(&mut raw);
                        ControlFlow::Continue(())
                    }
                    Err(ParseInputError::Empty) => ControlFlow::Continue(()),
                    Err(e) => {
                        warn!("[NET_TASK] {e}: {}", line.trim());
                        ControlFlow::Continue(())
                    }
                });
                if flow.is_break() {
                    break;
                }
            }
            Either::First(Err(e)) => {
                error!("[NET_TASK] read error: {e:?}");
                break;
            }
            Either::Second(()) => {
                bus.publish_motion(filter.update(&raw, Instant::now()));
            }
        }
    }
}

pub async fn configurate_and_start_wifi(
    wifi_controller: &mut WifiController<'_>,
) -> anyhow::Result<()> {
    let ssid = env!("WIFI_SSID");
    let password = env!("WIFI_PASS");
    let config = esp_wifi::wifi::Configuration::Client(ClientConfiguration {
        ssid: String::from(ssid),
        password: String::from(password),
        ..Default::default()
    });

    info!("[NET_TASK] connecting to wifi: {ssid}");
    wifi_controller
        .set_configuration(&config)
        .map_err(|e| anyhow!("wifi configuration rejected: {e:?}"))?;
    wifi_controller
        .set_power_saving(esp_wifi::config::PowerSaveMode::None)
        .map_err(|e| anyhow!("wifi power mode rejected: {e:?}"))?;
    wifi_controller
        .start()
        .map_err(|e| anyhow!("wifi start failed: {e:?}"))?;
    wifi_controller
        .connect_async()
        .await
        .map_err(|e| anyhow!("wifi connect failed: {e:?}"))?;

    if let Ok(rssi) = wifi_controller.rssi() {
        info!("[NET_TASK] wifi connected, signal: {rssi}");
    }
    Ok(())
}
