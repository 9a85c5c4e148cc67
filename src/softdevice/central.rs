//! Central role of the relay on the SoftDevice.
//!
//! Scan for a sensor advertising Environmental Sensing, connect, walk both
//! discovery pipelines, then serve remote reads and writes for the local
//! table until the link drops.  Notifications are relayed from the moment
//! the link is up, so the push a subscription triggers is never missed.
//!
//! The SoftDevice discovers a whole service in one procedure, so the
//! service stage takes a [`ServiceSnapshot`] and the characteristic and
//! descriptor stages are answered from it.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Ticker, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, DiscoverError, HvxType};
use nrf_softdevice::ble::{central, Address, Connection, Uuid as SdUuid};
use nrf_softdevice::{raw, Softdevice};

use super::{with_app, SharedState, FORWARD};
use crate::config::{
    BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT,
    REMOTE_READ_INTERVAL_MS, SCAN_INTERVAL, SCAN_WINDOW,
};
use crate::gap::adv_parser::{contains_service_uuid16, extract_device_name};
use crate::gatt::{
    AttrHandle, CharacteristicKind, ConnHandle, Uuid, ENVIRONMENTAL_SENSING_UUID16,
    STATUS_SERVICE_UUID16,
};
use crate::indicator::IndicatorSink;
use crate::relay::discovery::{DiscoveryEvent, DiscoveryRequest};
use crate::relay::{CentralAction, Relay, RemoteRead, RemoteRequest};

/// Status reported for a discovery procedure that failed below ATT.
const UNLIKELY_ERROR: u16 = 0x010E;

/// Pause before scanning again after the SoftDevice refused.
const SCAN_RETRY_DELAY: Duration = Duration::from_secs(1);

const MAX_CHARACTERISTICS: usize = 4;
const MAX_DESCRIPTORS: usize = 8;

/// Largest notification or read payload we keep (ATT MTU 23 minus the
/// header).
const MAX_NOTIFICATION_LEN: usize = 20;

/// Characteristics and descriptors of one remote service.
#[derive(Default)]
pub struct ServiceSnapshot {
    characteristics: Vec<(Option<SdUuid>, AttrHandle, AttrHandle), MAX_CHARACTERISTICS>,
    descriptors: Vec<(Option<SdUuid>, AttrHandle), MAX_DESCRIPTORS>,
}

impl ServiceSnapshot {
    /// Handle span covered by what was discovered.
    fn range(&self) -> Option<(AttrHandle, AttrHandle)> {
        let start = self.characteristics.iter().map(|c| c.1).min()?;
        let end = self
            .characteristics
            .iter()
            .map(|c| c.2)
            .chain(self.descriptors.iter().map(|d| d.1))
            .max()?;
        Some((start.saturating_sub(1), end))
    }

    fn characteristic(
        &self,
        uuid: SdUuid,
        start: AttrHandle,
        end: AttrHandle,
    ) -> Option<(AttrHandle, AttrHandle)> {
        self.characteristics
            .iter()
            .find(|(u, decl, _)| *u == Some(uuid) && (start..=end).contains(decl))
            .map(|&(_, decl, value)| (decl, value))
    }

    fn descriptor(&self, uuid: SdUuid, start: AttrHandle, end: AttrHandle) -> Option<AttrHandle> {
        self.descriptors
            .iter()
            .find(|(u, h)| *u == Some(uuid) && (start..=end).contains(h))
            .map(|&(_, h)| h)
    }
}

/// Discovery client for the remote service `UUID`.
pub struct SnapshotClient<const UUID: u16> {
    snapshot: ServiceSnapshot,
}

impl<const UUID: u16> gatt_client::Client for SnapshotClient<UUID> {
    type Event = ();

    fn on_hvx(&self, _: &Connection, _: HvxType, _: u16, _: &[u8]) -> Option<Self::Event> {
        None
    }

    fn uuid() -> SdUuid {
        SdUuid::new_16(UUID)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            snapshot: ServiceSnapshot::default(),
        }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &gatt_client::Characteristic,
        descriptors: &[gatt_client::Descriptor],
    ) {
        let entry = (
            characteristic.uuid,
            characteristic.handle_decl,
            characteristic.handle_value,
        );
        if self.snapshot.characteristics.push(entry).is_err() {
            warn!("service {=u16:#x}: characteristic table full", UUID);
        }
        for d in descriptors {
            if self.snapshot.descriptors.push((d.uuid, d.handle)).is_err() {
                warn!("service {=u16:#x}: descriptor table full", UUID);
            }
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

/// A notification received on the central link.
pub struct Notification {
    pub handle: AttrHandle,
    pub data: Vec<u8, MAX_NOTIFICATION_LEN>,
}

/// Hands every notification to the relay; routing happens there.
pub struct NotificationRouter;

impl gatt_client::Client for NotificationRouter {
    type Event = Notification;

    fn on_hvx(
        &self,
        _conn: &Connection,
        type_: HvxType,
        handle: u16,
        data: &[u8],
    ) -> Option<Self::Event> {
        if !matches!(type_, HvxType::Notification) {
            return None;
        }
        let len = data.len().min(MAX_NOTIFICATION_LEN);
        Some(Notification {
            handle,
            data: Vec::from_slice(&data[..len]).ok()?,
        })
    }

    fn uuid() -> SdUuid {
        SdUuid::new_16(ENVIRONMENTAL_SENSING_UUID16)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self
    }

    fn discovered_characteristic(
        &mut self,
        _: &gatt_client::Characteristic,
        _: &[gatt_client::Descriptor],
    ) {
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

/// Run the relay's central role forever.
///
/// `link_led` is lit while connected to a sensor.
pub async fn run_central<I, L>(
    sd: &'static Softdevice,
    state: &SharedState<Relay<I>>,
    mut link_led: L,
) -> !
where
    I: IndicatorSink,
    L: IndicatorSink,
{
    loop {
        let address = match scan_for_sensor(sd).await {
            Ok(address) => address,
            Err(_) => {
                warn!("scan failed; retrying");
                Timer::after(SCAN_RETRY_DELAY).await;
                continue;
            }
        };

        let whitelist = [&address];
        let config = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                interval: SCAN_INTERVAL,
                window: SCAN_WINDOW,
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: BLE_CONN_INTERVAL_MIN,
                max_conn_interval: BLE_CONN_INTERVAL_MAX,
                slave_latency: BLE_SLAVE_LATENCY,
                conn_sup_timeout: BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = match central::connect(sd, &config).await {
            Ok(conn) => conn,
            Err(_) => {
                with_app(sd, state, |relay, _| relay.on_central_connect_failed());
                continue;
            }
        };
        let Some(handle) = conn.handle().and_then(ConnHandle::from_raw) else {
            with_app(sd, state, |relay, _| relay.on_central_connect_failed());
            continue;
        };

        link_led.set(true);
        relay_link(sd, state, &conn, handle).await;
        link_led.set(false);

        // The HCI reason is not surfaced by gatt_client::run.
        let action = with_app(sd, state, |relay, _| relay.on_central_disconnected(handle, 0));
        if action == CentralAction::RestartScan {
            info!("rescanning for a sensor");
        }
    }
}

async fn relay_link<I: IndicatorSink>(
    sd: &Softdevice,
    state: &SharedState<Relay<I>>,
    conn: &Connection,
    handle: ConnHandle,
) {
    let requests = with_app(sd, state, |relay, _| relay.on_central_connected(handle));

    let notifications = gatt_client::run(conn, &NotificationRouter, |n| {
        with_app(sd, state, |relay, host| {
            relay.on_notification(handle, n.handle, &n.data, host)
        })
    });
    let link = async {
        for (kind, first) in CharacteristicKind::ALL.into_iter().zip(requests) {
            run_pipeline(sd, state, conn, kind, first).await;
        }
        if let Some(read) = with_app(sd, state, |relay, _| relay.remote_temperature_read()) {
            read_remote(sd, state, conn, read).await;
        }
        serve_requests(sd, state, conn, handle).await
    };
    match select(notifications, link).await {
        Either::First(_) => info!("central link closed"),
        Either::Second(never) => never,
    }
}

/// Drive one discovery pipeline to a terminal phase.
async fn run_pipeline<I: IndicatorSink>(
    sd: &Softdevice,
    state: &SharedState<Relay<I>>,
    conn: &Connection,
    kind: CharacteristicKind,
    first: DiscoveryRequest,
) {
    let mut snapshot = None;
    let mut next = Some(first);
    while let Some(request) = next {
        let event = execute(conn, request, &mut snapshot).await;
        next = with_app(sd, state, |relay, _| relay.on_discovery(kind, event));
    }
}

async fn execute(
    conn: &Connection,
    request: DiscoveryRequest,
    snapshot: &mut Option<ServiceSnapshot>,
) -> DiscoveryEvent {
    match request {
        DiscoveryRequest::PrimaryService { uuid } => {
            let discovered = match uuid {
                Uuid::Uuid16(ENVIRONMENTAL_SENSING_UUID16) => {
                    discover::<ENVIRONMENTAL_SENSING_UUID16>(conn).await
                }
                Uuid::Uuid16(STATUS_SERVICE_UUID16) => {
                    discover::<STATUS_SERVICE_UUID16>(conn).await
                }
                _ => Err(DiscoverError::ServiceNotFound),
            };
            match discovered {
                Ok(found) => {
                    let range = found.range();
                    *snapshot = Some(found);
                    match range {
                        Some((start, end)) => DiscoveryEvent::ServiceFound { start, end },
                        None => DiscoveryEvent::Exhausted,
                    }
                }
                Err(DiscoverError::ServiceNotFound) => DiscoveryEvent::Exhausted,
                Err(_) => DiscoveryEvent::Failed {
                    status: UNLIKELY_ERROR,
                },
            }
        }
        DiscoveryRequest::Characteristic { uuid, start, end } => snapshot
            .as_ref()
            .and_then(|s| s.characteristic(to_softdevice(uuid), start, end))
            .map_or(DiscoveryEvent::Exhausted, |(declaration, value)| {
                DiscoveryEvent::CharacteristicFound { declaration, value }
            }),
        DiscoveryRequest::Descriptor { uuid, start, end } => snapshot
            .as_ref()
            .and_then(|s| s.descriptor(to_softdevice(uuid), start, end))
            .map_or(DiscoveryEvent::Exhausted, |handle| {
                DiscoveryEvent::DescriptorFound { handle }
            }),
        DiscoveryRequest::Subscribe { ccc_handle, value } => {
            match gatt_client::write(conn, ccc_handle, &value).await {
                Ok(()) => DiscoveryEvent::Subscribed,
                Err(_) => DiscoveryEvent::Failed {
                    status: UNLIKELY_ERROR,
                },
            }
        }
    }
}

async fn discover<const UUID: u16>(conn: &Connection) -> Result<ServiceSnapshot, DiscoverError> {
    let client: SnapshotClient<UUID> = gatt_client::discover(conn).await?;
    Ok(client.snapshot)
}

fn to_softdevice(uuid: Uuid) -> SdUuid {
    match uuid {
        Uuid::Uuid16(u) => SdUuid::new_16(u),
        Uuid::Uuid128(bytes) => SdUuid::new_128(&bytes),
    }
}

/// Passive scan until an advertiser lists Environmental Sensing.
async fn scan_for_sensor(sd: &Softdevice) -> Result<Address, central::ScanError> {
    info!("scanning for a sensor");
    let config = central::ScanConfig {
        active: false,
        interval: SCAN_INTERVAL,
        window: SCAN_WINDOW,
        ..Default::default()
    };

    central::scan(sd, &config, |params| {
        let data =
            unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        if !contains_service_uuid16(data, ENVIRONMENTAL_SENSING_UUID16) {
            return None;
        }
        let name = extract_device_name(data);
        info!("found sensor {} (RSSI {})", name.as_str(), params.rssi);
        Some(Address::from_raw(params.peer_addr))
    })
    .await
}

/// Send queued remote requests, and poll the remote temperature, until
/// cancelled.
///
/// The SoftDevice answers local reads from its own copy, so a local read
/// never asks for a fresh value on target; the poll stands in for it.
async fn serve_requests<I: IndicatorSink>(
    sd: &Softdevice,
    state: &SharedState<Relay<I>>,
    conn: &Connection,
    link: ConnHandle,
) -> ! {
    let mut poll = Ticker::every(Duration::from_millis(REMOTE_READ_INTERVAL_MS));
    loop {
        let request = match select(FORWARD.receive(), poll.next()).await {
            Either::First(request) => request,
            Either::Second(()) => {
                match with_app(sd, state, |relay, _| relay.remote_temperature_read()) {
                    Some(read) => RemoteRequest::Read(read),
                    None => continue,
                }
            }
        };
        if request.conn() != link {
            debug!("dropping {} for stale link", request);
            continue;
        }
        match request {
            RemoteRequest::Read(read) => read_remote(sd, state, conn, read).await,
            RemoteRequest::Write(write) => {
                match gatt_client::write(conn, write.handle, &[write.value]).await {
                    Ok(()) => info!("forwarded status {} to remote", write.value),
                    Err(_) => warn!("forwarding status {} failed", write.value),
                }
            }
        }
    }
}

async fn read_remote<I: IndicatorSink>(
    sd: &Softdevice,
    state: &SharedState<Relay<I>>,
    conn: &Connection,
    read: RemoteRead,
) {
    let mut buf = [0u8; MAX_NOTIFICATION_LEN];
    match gatt_client::read(conn, read.handle, &mut buf).await {
        Ok(len) => with_app(sd, state, |relay, host| {
            relay.on_read_response(read.conn, read.handle, &buf[..len.min(buf.len())], host)
        }),
        Err(_) => warn!("reading remote attr {} failed", read.handle),
    }
}
