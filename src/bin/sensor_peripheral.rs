//! Stand-alone sensor firmware: the die temperature and a status LED,
//! served over GATT on the nRF52840-DK.

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
use blerelay::gatt::dispatch::GattContext;
use blerelay::indicator::PinIndicator;
use blerelay::peripheral::{prepare, Peripheral};
use blerelay::sensor::self_test_reading;
use blerelay::softdevice::peripheral::{run_peripheral, run_refresh};
use blerelay::softdevice::server::Server;
use blerelay::softdevice::temperature::DieTemperature;
use blerelay::softdevice::{shared, softdevice_config, SharedState};

type Led = PinIndicator<Output<'static>>;
type App = Peripheral<DieTemperature, Led>;

static SERVER: StaticCell<Server> = StaticCell::new();
static STATE: StaticCell<SharedState<App>> = StaticCell::new();
static ADV_DATA: StaticCell<AdvertisingData> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("sensor peripheral starting");

    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    let run_led = led(Output::new(p.P0_13, Level::High, OutputDrive::Standard));
    let link_led = led(Output::new(p.P0_14, Level::High, OutputDrive::Standard));
    let status_led = led(Output::new(p.P0_16, Level::High, OutputDrive::Standard));

    let sd = Softdevice::enable(&softdevice_config(config::SENSOR_DEVICE_NAME, 0));
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));
    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice_task(sd)));

    let mut sensor = DieTemperature::new(sd);
    self_test(&mut sensor).await;

    let (app, adv) = unwrap!(prepare(
        server.attribute_table(),
        config::SENSOR_DEVICE_NAME,
        config::ADV_TX_POWER_DBM,
        |table| Peripheral::new(GattContext::new(table, sensor, status_led)),
    ));
    let state: &'static SharedState<App> = STATE.init(shared(app));
    let adv: &'static AdvertisingData = ADV_DATA.init(adv);

    unwrap!(spawner.spawn(blink_task(run_led)));
    unwrap!(spawner.spawn(refresh_task(sd, state)));
    unwrap!(spawner.spawn(peripheral_task(sd, server, state, adv.as_bytes(), link_led)));

    info!("sensor running");
}

fn led(pin: Output<'static>) -> Led {
    PinIndicator::active_low(pin)
}

/// Take a few readings; a sensor that cannot be read halts startup.
async fn self_test(sensor: &mut DieTemperature) {
    for n in 1..=config::SENSOR_SELF_TEST_READINGS {
        unwrap!(self_test_reading(sensor, n));
        Timer::after(Duration::from_millis(config::SENSOR_SELF_TEST_INTERVAL_MS)).await;
    }
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
async fn refresh_task(sd: &'static Softdevice, state: &'static SharedState<App>) -> ! {
    run_refresh(
        sd,
        state,
        Duration::from_millis(config::SENSOR_REFRESH_INTERVAL_MS),
    )
    .await
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
