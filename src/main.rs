//! blerelay firmware: central-to-peripheral relay on the nRF52840-DK.
//!
//! The central role finds a sensor peripheral, subscribes to its
//! temperature and status characteristics and mirrors them into the local
//! GATT server, which phones and gateways reach through the peripheral
//! role.  Writing the local status characteristic forwards the byte to the
//! remote sensor, and the remote temperature is read back periodically.

#![no_std]
#![no_main]

use defmt::{info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::Priority;
use embassy_time::{Duration, Timer};
use nrf_softdevice::Softdevice;
use panic_probe as _;
use static_cell::StaticCell;

use blerelay::config;
use blerelay::gap::advertising::AdvertisingData;
use blerelay::indicator::PinIndicator;
use blerelay::peripheral::prepare;
use blerelay::relay::Relay;
use blerelay::softdevice::central::run_central;
use blerelay::softdevice::peripheral::run_peripheral;
use blerelay::softdevice::server::Server;
use blerelay::softdevice::{shared, softdevice_config, SharedState};

type Led = PinIndicator<Output<'static>>;
type App = Relay<Led>;

static SERVER: StaticCell<Server> = StaticCell::new();
static STATE: StaticCell<SharedState<App>> = StaticCell::new();
static ADV_DATA: StaticCell<AdvertisingData> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("blerelay starting");

    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    let run_led = led(Output::new(p.P0_13, Level::High, OutputDrive::Standard));
    let central_led = led(Output::new(p.P0_14, Level::High, OutputDrive::Standard));
    let peripheral_led = led(Output::new(p.P0_15, Level::High, OutputDrive::Standard));
    let status_led = led(Output::new(p.P0_16, Level::High, OutputDrive::Standard));

    let sd = Softdevice::enable(&softdevice_config(config::DEVICE_NAME, 1));
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));
    let sd: &'static Softdevice = sd;

    let (relay, adv) = unwrap!(prepare(
        server.attribute_table(),
        config::DEVICE_NAME,
        config::ADV_TX_POWER_DBM,
        |table| Relay::new(table, status_led),
    ));
    let state: &'static SharedState<App> = STATE.init(shared(relay));
    let adv: &'static AdvertisingData = ADV_DATA.init(adv);

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(blink_task(run_led)));
    unwrap!(spawner.spawn(peripheral_task(sd, server, state, adv.as_bytes(), peripheral_led)));
    unwrap!(spawner.spawn(central_task(sd, state, central_led)));

    info!("relay running");
}

fn led(pin: Output<'static>) -> Led {
    PinIndicator::active_low(pin)
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn blink_task(mut led: Led) -> ! {
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(config::RUN_LED_BLINK_INTERVAL_MS)).await;
    }
}

#[embassy_executor::task]
async fn peripheral_task(
    sd: &'static Softdevice,
    server: &'static Server,
    state: &'static SharedState<App>,
    adv_data: &'static [u8],
    led: Led,
) -> ! {
    run_peripheral(sd, server, state, adv_data, led).await
}

#[embassy_executor::task]
async fn central_task(sd: &'static Softdevice, state: &'static SharedState<App>, led: Led) -> ! {
    run_central(sd, state, led).await
}
