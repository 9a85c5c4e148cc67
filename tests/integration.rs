//! Integration tests for blerelay host-testable logic.
//!
//! A sensor [`Peripheral`] and a [`Relay`] are wired together through
//! recording hosts; discovery requests are answered from the sensor's own
//! attribute table.

use blerelay::config::FIRST_APP_HANDLE;
use blerelay::error::{AttError, HostError, SensorError};
use blerelay::gap::adv_parser::{contains_service_uuid16, extract_device_name};
use blerelay::gap::advertising::sensor_advertisement;
use blerelay::gap::router::AdvertisingState;
use blerelay::gap::GapEvent;
use blerelay::gatt::dispatch::{AccessOp, GattContext};
use blerelay::gatt::table::AttributeTable;
use blerelay::gatt::{
    AttrHandle, CharacteristicKind, ConnHandle, GattHost, SubscriptionState,
    ENVIRONMENTAL_SENSING_UUID16,
};
use blerelay::indicator::IndicatorSink;
use blerelay::peripheral::{Peripheral, PeripheralApp};
use blerelay::relay::discovery::{DiscoveryEvent, DiscoveryPhase, DiscoveryRequest, Target};
use blerelay::relay::{Relay, RemoteRequest};
use blerelay::sensor::SensorSource;

struct Thermometer(f32);

impl SensorSource for Thermometer {
    fn enable(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        Ok(self.0)
    }
    fn disable(&mut self) {}
}

#[derive(Default)]
struct Led(bool);

impl IndicatorSink for Led {
    fn set(&mut self, on: bool) {
        self.0 = on;
    }
    fn is_on(&self) -> bool {
        self.0
    }
}

type Push = (ConnHandle, AttrHandle, Vec<u8>);

#[derive(Default)]
struct Recorder {
    adverts: usize,
    notified: Vec<Push>,
    indicated: Vec<Push>,
}

impl GattHost for Recorder {
    fn start_advertising(&mut self) -> Result<(), HostError> {
        self.adverts += 1;
        Ok(())
    }
    fn notify(&mut self, c: ConnHandle, h: AttrHandle, v: &[u8]) -> Result<(), HostError> {
        self.notified.push((c, h, v.to_vec()));
        Ok(())
    }
    fn indicate(&mut self, c: ConnHandle, h: AttrHandle, v: &[u8]) -> Result<(), HostError> {
        self.indicated.push((c, h, v.to_vec()));
        Ok(())
    }
}

/// Relay ↔ sensor link (the same handle on both ends).
const LINK: ConnHandle = ConnHandle(0);
/// Phone ↔ relay link.
const PHONE: ConnHandle = ConnHandle(1);

type Sensor = Peripheral<Thermometer, Led>;

fn sensor(celsius: f32) -> Sensor {
    let table = AttributeTable::standard().unwrap();
    Peripheral::new(GattContext::new(table, Thermometer(celsius), Led::default()))
}

/// Answer one discovery request the way the sensor's host stack would.
fn answer(sensor: &mut Sensor, host: &mut Recorder, request: DiscoveryRequest) -> DiscoveryEvent {
    let table = sensor.context.table().clone();
    match request {
        DiscoveryRequest::PrimaryService { uuid } => table
            .services()
            .iter()
            .find(|s| s.uuid == uuid)
            .map_or(DiscoveryEvent::Exhausted, |s| DiscoveryEvent::ServiceFound {
                start: s.start,
                end: s.end,
            }),
        DiscoveryRequest::Characteristic { uuid, start, end } => CharacteristicKind::ALL
            .into_iter()
            .filter(|k| Target::for_kind(*k).characteristic == uuid)
            .map(|k| table.handles(k))
            .find(|h| (start..=end).contains(&h.declaration))
            .map_or(DiscoveryEvent::Exhausted, |h| DiscoveryEvent::CharacteristicFound {
                declaration: h.declaration,
                value: h.value,
            }),
        DiscoveryRequest::Descriptor { start, end, .. } => CharacteristicKind::ALL
            .into_iter()
            .filter_map(|k| table.cccd_handle(k))
            .find(|h| (start..=end).contains(h))
            .map_or(DiscoveryEvent::Exhausted, |handle| {
                DiscoveryEvent::DescriptorFound { handle }
            }),
        DiscoveryRequest::Subscribe { ccc_handle, value } => {
            match sensor.handle_access(LINK, ccc_handle, AccessOp::WriteDescriptor, &value, host) {
                Ok(_) => DiscoveryEvent::Subscribed,
                Err(e) => DiscoveryEvent::Failed {
                    status: u16::from(e.code()),
                },
            }
        }
    }
}

struct Bench {
    sensor: Sensor,
    sensor_host: Recorder,
    relay: Relay<Led>,
    relay_host: Recorder,
}

impl Bench {
    /// Sensor advertising, relay serving a phone that subscribed to the
    /// temperature notifications.
    fn new(celsius: f32) -> Self {
        let mut bench = Bench {
            sensor: sensor(celsius),
            sensor_host: Recorder::default(),
            relay: Relay::new(AttributeTable::standard().unwrap(), Led::default()),
            relay_host: Recorder::default(),
        };
        bench.sensor.start(&mut bench.sensor_host).unwrap();
        bench.relay.start(&mut bench.relay_host).unwrap();

        bench
            .relay
            .handle_event(GapEvent::Connect { conn: PHONE, status: 0 }, &mut bench.relay_host)
            .unwrap();
        let ccc = bench.local_handle_ccc(CharacteristicKind::Temperature);
        bench
            .relay
            .handle_access(
                PHONE,
                ccc,
                AccessOp::WriteDescriptor,
                &[0x01, 0x00],
                &mut bench.relay_host,
            )
            .unwrap();
        bench.relay_host.notified.clear();
        bench
    }

    fn local_handle_ccc(&self, kind: CharacteristicKind) -> AttrHandle {
        self.relay
            .peripheral()
            .context
            .table()
            .cccd_handle(kind)
            .unwrap()
    }

    fn local_value(&self, kind: CharacteristicKind) -> AttrHandle {
        self.relay.peripheral().context.table().value_handle(kind)
    }

    /// Connect the relay's central role to the sensor and walk discovery.
    fn link_up(&mut self) {
        self.sensor
            .handle_event(GapEvent::Connect { conn: LINK, status: 0 }, &mut self.sensor_host)
            .unwrap();
        let requests = self.relay.on_central_connected(LINK);
        for (kind, first) in CharacteristicKind::ALL.into_iter().zip(requests) {
            let mut next = Some(first);
            while let Some(request) = next {
                let event = answer(&mut self.sensor, &mut self.sensor_host, request);
                next = self.relay.on_discovery(kind, event);
            }
        }
    }

    /// Connect and walk discovery, delivering every sensor notification as
    /// soon as the sensor sends it.
    fn link_up_live(&mut self) {
        self.sensor
            .handle_event(GapEvent::Connect { conn: LINK, status: 0 }, &mut self.sensor_host)
            .unwrap();
        let requests = self.relay.on_central_connected(LINK);
        for (kind, first) in CharacteristicKind::ALL.into_iter().zip(requests) {
            let mut next = Some(first);
            while let Some(request) = next {
                let event = answer(&mut self.sensor, &mut self.sensor_host, request);
                self.pump();
                next = self.relay.on_discovery(kind, event);
            }
        }
    }

    /// Deliver the sensor's queued notifications to the relay.
    fn pump(&mut self) {
        for (conn, handle, value) in self.sensor_host.notified.drain(..) {
            self.relay
                .on_notification(conn, handle, &value, &mut self.relay_host);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Relay end to end
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn relay_subscribes_to_both_sensor_characteristics() {
    let mut bench = Bench::new(22.4);
    bench.link_up();

    for kind in CharacteristicKind::ALL {
        assert_eq!(bench.relay.chain().phase(kind), Some(DiscoveryPhase::Subscribed));
        assert_eq!(
            bench.sensor.context.subscription(kind),
            SubscriptionState::NotifyEnabled
        );
    }
    let remote_temp = bench.sensor.context.table().value_handle(CharacteristicKind::Temperature);
    assert_eq!(
        bench.relay.chain().route_notification(remote_temp),
        Some(CharacteristicKind::Temperature)
    );
}

#[test]
fn sensor_reading_reaches_the_phone() {
    let mut bench = Bench::new(22.4);
    bench.link_up();
    bench.pump();

    let local = bench.local_value(CharacteristicKind::Temperature);
    assert_eq!(bench.relay_host.notified, vec![(PHONE, local, vec![22])]);
    let read = bench
        .relay
        .handle_access(
            PHONE,
            local,
            AccessOp::ReadCharacteristic,
            &[],
            &mut bench.relay_host,
        )
        .unwrap();
    assert_eq!(read.as_slice(), &[22]);
}

#[test]
fn wide_remote_notification_relays_low_byte() {
    let mut bench = Bench::new(20.0);
    bench.link_up();
    bench.pump();
    bench.relay_host.notified.clear();

    let remote_temp = bench.sensor.context.table().value_handle(CharacteristicKind::Temperature);
    bench
        .relay
        .on_notification(LINK, remote_temp, &[0x16, 0x00], &mut bench.relay_host);

    let local = bench.local_value(CharacteristicKind::Temperature);
    assert_eq!(bench.relay_host.notified, vec![(PHONE, local, vec![0x16])]);
}

#[test]
fn phone_status_write_lights_the_sensor_led() {
    let mut bench = Bench::new(20.0);
    bench.link_up();
    bench.pump();

    let local = bench.local_value(CharacteristicKind::Status);
    bench
        .relay
        .handle_access(
            PHONE,
            local,
            AccessOp::WriteCharacteristic,
            &[0x01],
            &mut bench.relay_host,
        )
        .unwrap();
    assert!(bench.relay.peripheral().context.indicator().is_on());

    let Some(RemoteRequest::Write(write)) = bench.relay.take_remote_request() else {
        panic!("status not forwarded");
    };
    bench
        .sensor
        .handle_access(
            write.conn,
            write.handle,
            AccessOp::WriteCharacteristic,
            &[write.value],
            &mut bench.sensor_host,
        )
        .unwrap();
    assert_eq!(bench.sensor.context.status(), 0x01);
    assert!(bench.sensor.context.indicator().is_on());

    // the sensor echoes the change to its subscriber, the relay
    bench.pump();
    assert_eq!(bench.relay.peripheral().context.status(), 0x01);
}

#[test]
fn subscription_push_is_mirrored_before_status_discovery_ends() {
    let mut bench = Bench::new(23.0);
    bench.link_up_live();

    let local = bench.local_value(CharacteristicKind::Temperature);
    assert_eq!(bench.relay.peripheral().context.temperature(), 23);
    assert_eq!(bench.relay_host.notified[0], (PHONE, local, vec![23]));
}

#[test]
fn phone_read_fetches_a_fresh_remote_temperature() {
    let mut bench = Bench::new(21.0);
    bench.link_up();
    bench.pump();

    bench.sensor.context.sensor_mut().0 = 27.6;
    let local = bench.local_value(CharacteristicKind::Temperature);
    let read = bench
        .relay
        .handle_access(PHONE, local, AccessOp::ReadCharacteristic, &[], &mut bench.relay_host)
        .unwrap();
    assert_eq!(read.as_slice(), &[21], "the cached value answers at once");

    let Some(RemoteRequest::Read(remote)) = bench.relay.take_remote_request() else {
        panic!("no remote read");
    };
    let response = bench
        .sensor
        .handle_access(
            remote.conn,
            remote.handle,
            AccessOp::ReadCharacteristic,
            &[],
            &mut bench.sensor_host,
        )
        .unwrap();
    bench
        .relay
        .on_read_response(remote.conn, remote.handle, &response, &mut bench.relay_host);

    assert_eq!(bench.relay.peripheral().context.temperature(), 27);
    assert_eq!(
        bench.relay_host.notified.last(),
        Some(&(PHONE, local, vec![27]))
    );
}

#[test]
fn relay_without_remote_status_still_mirrors_temperature() {
    let mut bench = Bench::new(25.0);
    let requests = bench.relay.on_central_connected(LINK);
    bench
        .sensor
        .handle_event(GapEvent::Connect { conn: LINK, status: 0 }, &mut bench.sensor_host)
        .unwrap();

    // temperature walks normally, the status service is absent
    let mut next = Some(requests[CharacteristicKind::Temperature.index()]);
    while let Some(request) = next {
        let event = answer(&mut bench.sensor, &mut bench.sensor_host, request);
        next = bench.relay.on_discovery(CharacteristicKind::Temperature, event);
    }
    bench
        .relay
        .on_discovery(CharacteristicKind::Status, DiscoveryEvent::Exhausted);
    assert_eq!(
        bench.relay.chain().phase(CharacteristicKind::Status),
        Some(DiscoveryPhase::Exhausted)
    );

    bench.pump();
    assert_eq!(bench.relay.peripheral().context.temperature(), 25);
    assert_eq!(bench.relay.forward_status_write(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// Sensor peripheral lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn sensor_link_cycle() {
    let mut sensor = sensor(30.0);
    let mut host = Recorder::default();
    sensor.start(&mut host).unwrap();
    assert_eq!(sensor.state(), AdvertisingState::Advertising);

    sensor
        .handle_event(GapEvent::Connect { conn: PHONE, status: 0 }, &mut host)
        .unwrap();
    assert_eq!(sensor.state(), AdvertisingState::Connected);

    let status = sensor.context.table().handles(CharacteristicKind::Status);
    let ccc = status.cccd.unwrap();
    sensor
        .handle_access(PHONE, ccc, AccessOp::WriteDescriptor, &[0x02, 0x00], &mut host)
        .unwrap();
    sensor
        .handle_access(PHONE, status.value, AccessOp::WriteCharacteristic, &[0x07], &mut host)
        .unwrap();
    assert_eq!(host.indicated, vec![(PHONE, status.value, vec![0x07])]);

    let adverts = host.adverts;
    sensor
        .handle_event(GapEvent::Disconnect { conn: PHONE, reason: 0x13 }, &mut host)
        .unwrap();
    assert_eq!(host.adverts, adverts + 1);
    assert_eq!(sensor.state(), AdvertisingState::Advertising);

    sensor
        .handle_event(GapEvent::Connect { conn: PHONE, status: 0 }, &mut host)
        .unwrap();
    let read = sensor
        .handle_access(PHONE, ccc, AccessOp::ReadDescriptor, &[], &mut host)
        .unwrap();
    assert_eq!(read.as_slice(), &[0x00, 0x00]);
    let read = sensor
        .handle_access(PHONE, status.value, AccessOp::ReadCharacteristic, &[], &mut host)
        .unwrap();
    assert_eq!(read.as_slice(), &[0x07], "status survives the link");
}

#[test]
fn sensor_rejects_unknown_and_read_only_attributes() {
    let mut sensor = sensor(30.0);
    let mut host = Recorder::default();
    let temp = sensor.context.table().value_handle(CharacteristicKind::Temperature);

    assert_eq!(
        sensor.handle_access(PHONE, 0x0200, AccessOp::ReadCharacteristic, &[], &mut host),
        Err(AttError::InvalidHandle)
    );
    assert_eq!(
        sensor.handle_access(PHONE, temp, AccessOp::WriteCharacteristic, &[1], &mut host),
        Err(AttError::WriteNotPermitted)
    );
    assert!(FIRST_APP_HANDLE < temp);
}

// ═══════════════════════════════════════════════════════════════════════════
// Advertising
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn sensor_advertisement_passes_the_relay_scan_filter() {
    let adv = sensor_advertisement("BLE_Sensor", 0).unwrap();
    let data = adv.as_bytes();
    assert!(data.len() <= 31);
    assert!(contains_service_uuid16(data, ENVIRONMENTAL_SENSING_UUID16));
    assert_eq!(extract_device_name(data).as_str(), "BLE_Sensor");
}

#[test]
fn oversized_name_does_not_fit_the_advertisement() {
    assert!(sensor_advertisement("a-name-far-too-long-for-legacy-adv", 0).is_err());
}
