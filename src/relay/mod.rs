//! Central-to-peripheral relay.
//!
//! The central role connects to a sensor peripheral, discovers and
//! subscribes to its temperature and status characteristics
//! ([`discovery`]), and every notification it receives is mirrored into
//! the local GATT table served by the peripheral role.  A local write to
//! the status characteristic travels the other way as a [`RemoteWrite`],
//! and a local temperature read asks the remote for a fresh value with a
//! [`RemoteRead`].

pub mod discovery;

use crate::error::{AttError, HostError};
use crate::gap::GapEvent;
use crate::gatt::dispatch::{AccessOp, AttValue, GattContext};
use crate::gatt::table::AttributeTable;
use crate::gatt::{AttrHandle, CharacteristicKind, ConnHandle, GattHost, CHARACTERISTIC_COUNT};
use crate::indicator::IndicatorSink;
use crate::peripheral::{Peripheral, PeripheralApp};
use crate::sensor::MirroredSensor;

use discovery::{DiscoveryEvent, DiscoveryRequest, RelayDiscoveryChain};

/// GATT write to send to the remote peer over the central link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteWrite {
    pub conn: ConnHandle,
    pub handle: AttrHandle,
    pub value: u8,
}

/// GATT read of a remote value; the response is mirrored like a
/// notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteRead {
    pub conn: ConnHandle,
    pub handle: AttrHandle,
}

/// Work the peripheral side hands to the central task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoteRequest {
    Read(RemoteRead),
    Write(RemoteWrite),
}

impl RemoteRequest {
    /// Central link the request was issued for.
    pub fn conn(&self) -> ConnHandle {
        match self {
            RemoteRequest::Read(r) => r.conn,
            RemoteRequest::Write(w) => w.conn,
        }
    }
}

/// What the central task does after a link change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CentralAction {
    RestartScan,
    /// The event did not concern our link.
    Ignore,
}

/// The one central-role connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CentralLink {
    conn: Option<ConnHandle>,
}

impl CentralLink {
    pub const fn new() -> Self {
        Self { conn: None }
    }

    pub fn conn(&self) -> Option<ConnHandle> {
        self.conn
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

pub struct Relay<I> {
    peripheral: Peripheral<MirroredSensor, I>,
    chain: RelayDiscoveryChain,
    central: CentralLink,
    outbox: Option<RemoteRequest>,
}

impl<I: IndicatorSink> Relay<I> {
    pub fn new(table: AttributeTable, indicator: I) -> Self {
        Self {
            peripheral: Peripheral::new(GattContext::new(table, MirroredSensor::new(), indicator)),
            chain: RelayDiscoveryChain::new(),
            central: CentralLink::new(),
            outbox: None,
        }
    }

    /// Central link up: open both discovery pipelines.
    pub fn on_central_connected(
        &mut self,
        conn: ConnHandle,
    ) -> [DiscoveryRequest; CHARACTERISTIC_COUNT] {
        info!("central link up; conn={}", conn);
        if let Some(old) = self.central.conn {
            warn!("replacing central link {}", old);
        }
        self.central.conn = Some(conn);
        self.chain.start()
    }

    pub fn on_central_connect_failed(&mut self) -> CentralAction {
        warn!("central connect failed; rescanning");
        self.central.conn = None;
        self.chain.reset();
        CentralAction::RestartScan
    }

    /// Central link down: drop the cursors and scan again.
    pub fn on_central_disconnected(&mut self, conn: ConnHandle, reason: u8) -> CentralAction {
        if self.central.conn != Some(conn) {
            debug!("disconnect of unknown central link {}", conn);
            return CentralAction::Ignore;
        }
        info!("central link down; conn={} reason={}", conn, reason);
        self.central.conn = None;
        self.chain.reset();
        CentralAction::RestartScan
    }

    pub fn on_discovery(
        &mut self,
        kind: CharacteristicKind,
        event: DiscoveryEvent,
    ) -> Option<DiscoveryRequest> {
        self.chain.advance(kind, event)
    }

    /// Mirror a remote notification into the local table.
    ///
    /// The first payload byte becomes the local value; it is then pushed to
    /// the local subscriber, if any.
    pub fn on_notification<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        data: &[u8],
        host: &mut H,
    ) {
        if self.central.conn != Some(conn) {
            debug!("notification from foreign link {}", conn);
            return;
        }
        let Some(kind) = self.chain.route_notification(handle) else {
            debug!("unrouted notification; attr={}", handle);
            return;
        };
        self.mirror(kind, data, host);
    }

    /// Mirror the response to a [`RemoteRead`], exactly as a notification.
    pub fn on_read_response<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        data: &[u8],
        host: &mut H,
    ) {
        if self.central.conn != Some(conn) {
            debug!("read response from foreign link {}", conn);
            return;
        }
        let kind = CharacteristicKind::ALL
            .into_iter()
            .find(|&k| self.chain.remote_value_handle(k) == Some(handle));
        match kind {
            Some(kind) => self.mirror(kind, data, host),
            None => debug!("read response for unknown attr {}", handle),
        }
    }

    fn mirror<H: GattHost>(&mut self, kind: CharacteristicKind, data: &[u8], host: &mut H) {
        let Some(&value) = data.first() else {
            warn!("empty remote {} value", kind);
            return;
        };

        info!("remote {} = {}", kind, value);
        let context = &mut self.peripheral.context;
        match kind {
            CharacteristicKind::Temperature => {
                context.sensor_mut().store(value);
                context.publish(kind, host);
            }
            CharacteristicKind::Status => context.set_status(value, host),
        }
    }

    /// The read that fetches a fresh temperature from the remote, once its
    /// temperature characteristic has been found.
    pub fn remote_temperature_read(&self) -> Option<RemoteRead> {
        let conn = self.central.conn?;
        let handle = self.chain.remote_value_handle(CharacteristicKind::Temperature)?;
        Some(RemoteRead { conn, handle })
    }

    /// The write that propagates the local status byte to the remote, when
    /// the remote status characteristic has been found.
    pub fn forward_status_write(&self) -> Option<RemoteWrite> {
        let conn = self.central.conn?;
        let handle = self.chain.remote_value_handle(CharacteristicKind::Status)?;
        Some(RemoteWrite {
            conn,
            handle,
            value: self.peripheral.context.status(),
        })
    }

    pub fn central(&self) -> CentralLink {
        self.central
    }

    pub fn chain(&self) -> &RelayDiscoveryChain {
        &self.chain
    }

    pub fn peripheral(&self) -> &Peripheral<MirroredSensor, I> {
        &self.peripheral
    }
}

impl<I: IndicatorSink> PeripheralApp for Relay<I> {
    fn start<H: GattHost>(&mut self, host: &mut H) -> Result<(), HostError> {
        self.peripheral.start(host)
    }

    fn handle_event<H: GattHost>(
        &mut self,
        event: GapEvent,
        host: &mut H,
    ) -> Result<(), HostError> {
        self.peripheral.handle_event(event, host)
    }

    fn handle_access<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        op: AccessOp,
        payload: &[u8],
        host: &mut H,
    ) -> Result<AttValue, AttError> {
        let value = self.peripheral.handle_access(conn, handle, op, payload, host)?;

        let table = self.peripheral.context.table();
        let status = table.value_handle(CharacteristicKind::Status);
        let temperature = table.value_handle(CharacteristicKind::Temperature);
        match op {
            AccessOp::WriteCharacteristic if handle == status => {
                self.outbox = self.forward_status_write().map(RemoteRequest::Write);
                if self.outbox.is_none() {
                    debug!("no remote status to forward to");
                }
            }
            // Served from the mirror; the response refreshes it.
            AccessOp::ReadCharacteristic if handle == temperature => {
                self.outbox = self.remote_temperature_read().map(RemoteRequest::Read);
            }
            _ => {}
        }
        Ok(value)
    }

    fn refresh<H: GattHost>(&mut self, host: &mut H) {
        self.peripheral.refresh(host);
    }

    fn take_remote_request(&mut self) -> Option<RemoteRequest> {
        self.outbox.take()
    }
}
