//! Peripheral role on the SoftDevice: advertise, accept one link, serve
//! GATT events until it drops, repeat.
//!
//! Advertising restarts only when the core asks for it through
//! [`GattHost::start_advertising`](crate::gatt::GattHost::start_advertising),
//! which raises [`ADVERTISE`].

use embassy_time::{Duration, Timer};
use nrf_softdevice::ble::peripheral::{AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::Softdevice;

use super::server::{EnvironmentalSensingServiceEvent, Server, ServerEvent, StatusServiceEvent};
use super::{set_link, with_app, SharedState, ADVERTISE, FORWARD};
use crate::config::ADV_INTERVAL;
use crate::gap::GapEvent;
use crate::gatt::dispatch::AccessOp;
use crate::gatt::{AttrHandle, CharacteristicKind, ConnHandle, CHARACTERISTIC_COUNT};
use crate::indicator::IndicatorSink;
use crate::peripheral::PeripheralApp;

/// Pause before advertising again after the SoftDevice refused.
const ADVERTISE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Last (notify, indicate) CCC bits seen per characteristic.
type CccFlags = [(bool, bool); CHARACTERISTIC_COUNT];

/// Serve `state` in the peripheral role forever.
///
/// `link_led` is lit while a central is connected.
pub async fn run_peripheral<A, L>(
    sd: &'static Softdevice,
    server: &Server,
    state: &SharedState<A>,
    adv_data: &[u8],
    mut link_led: L,
) -> !
where
    A: PeripheralApp,
    L: IndicatorSink,
{
    if let Err(e) = with_app(sd, state, |app, host| app.start(host)) {
        error!("peripheral start failed: {}", e);
    }

    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        ADVERTISE.wait().await;

        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data,
            scan_data: &[],
        };
        let conn = match peripheral::advertise_connectable(sd, adv, &config).await {
            Ok(conn) => conn,
            Err(AdvertiseError::Timeout) => {
                dispatch(sd, state, GapEvent::AdvertiseComplete { reason: 0 });
                continue;
            }
            Err(_) => {
                warn!("advertising refused; retrying");
                Timer::after(ADVERTISE_RETRY_DELAY).await;
                dispatch(sd, state, GapEvent::AdvertiseComplete { reason: 0 });
                continue;
            }
        };

        let Some(handle) = conn.handle().and_then(ConnHandle::from_raw) else {
            warn!("link dropped before it was served");
            dispatch(sd, state, GapEvent::AdvertiseComplete { reason: 0 });
            continue;
        };

        serve(sd, server, state, conn, handle, &mut link_led).await;
    }
}

async fn serve<A, L>(
    sd: &Softdevice,
    server: &Server,
    state: &SharedState<A>,
    conn: Connection,
    handle: ConnHandle,
    link_led: &mut L,
) where
    A: PeripheralApp,
    L: IndicatorSink,
{
    set_link(state, Some(conn.clone()));
    dispatch(sd, state, GapEvent::Connect { conn: handle, status: 0 });
    link_led.set(true);

    let mut ccc: CccFlags = [(false, false); CHARACTERISTIC_COUNT];
    let _ = gatt_server::run(&conn, server, |event| {
        on_server_event(sd, server, state, handle, &mut ccc, event)
    })
    .await;

    link_led.set(false);
    set_link(state, None);
    // gatt_server::run does not surface the HCI reason.
    dispatch(sd, state, GapEvent::Disconnect { conn: handle, reason: 0 });
}

fn on_server_event<A: PeripheralApp>(
    sd: &Softdevice,
    server: &Server,
    state: &SharedState<A>,
    conn: ConnHandle,
    ccc: &mut CccFlags,
    event: ServerEvent,
) {
    match event {
        ServerEvent::Ess(EnvironmentalSensingServiceEvent::TemperatureCccdWrite {
            notifications,
        }) => {
            let attr = server.ess.temperature_value_handle;
            let flags = (notifications, false);
            subscribe(sd, state, conn, ccc, CharacteristicKind::Temperature, attr, flags);
        }
        ServerEvent::Status(StatusServiceEvent::StatusCccdWrite {
            indications,
            notifications,
        }) => {
            let attr = server.status.status_value_handle;
            let flags = (notifications, indications);
            subscribe(sd, state, conn, ccc, CharacteristicKind::Status, attr, flags);
        }
        ServerEvent::Status(StatusServiceEvent::StatusWrite(value)) => {
            let attr = server.status.status_value_handle;
            let forward = with_app(sd, state, |app, host| {
                match app.handle_access(conn, attr, AccessOp::WriteCharacteristic, &[value], host)
                {
                    Ok(_) => app.take_remote_request(),
                    Err(e) => {
                        warn!("status write rejected: {}", e);
                        None
                    }
                }
            });
            if let Some(request) = forward {
                if FORWARD.try_send(request).is_err() {
                    warn!("forward queue full - dropping {}", request);
                }
            }
        }
    }
}

fn subscribe<A: PeripheralApp>(
    sd: &Softdevice,
    state: &SharedState<A>,
    conn: ConnHandle,
    ccc: &mut CccFlags,
    kind: CharacteristicKind,
    attr_handle: AttrHandle,
    (cur_notify, cur_indicate): (bool, bool),
) {
    let (prev_notify, prev_indicate) = ccc[kind.index()];
    ccc[kind.index()] = (cur_notify, cur_indicate);
    dispatch(
        sd,
        state,
        GapEvent::Subscribe {
            conn,
            attr_handle,
            prev_notify,
            cur_notify,
            prev_indicate,
            cur_indicate,
        },
    );
}

fn dispatch<A: PeripheralApp>(sd: &Softdevice, state: &SharedState<A>, event: GapEvent) {
    if let Err(e) = with_app(sd, state, |app, host| app.handle_event(event, host)) {
        error!("GAP event handling failed: {}", e);
    }
}

/// Resample the served values every `interval`.
pub async fn run_refresh<A: PeripheralApp>(
    sd: &'static Softdevice,
    state: &SharedState<A>,
    interval: Duration,
) -> ! {
    loop {
        with_app(sd, state, |app, host| app.refresh(host));
        Timer::after(interval).await;
    }
}
