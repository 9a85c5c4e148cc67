//! The peripheral role: a GATT server plus its connection router.
//!
//! [`PeripheralApp`] is what the host-stack adapter drives.  The plain
//! sensor firmware runs a [`Peripheral`]; the relay wraps one to pass
//! status writes and temperature reads on to its remote.

use crate::error::{AttError, Error, HostError, RegistrationError};
use crate::gap::advertising::{sensor_advertisement, AdvertisingData};
use crate::gap::router::{AdvertisingState, ConnectionEventRouter};
use crate::gap::GapEvent;
use crate::gatt::dispatch::{AccessOp, AttValue, GattContext};
use crate::gatt::table::AttributeTable;
use crate::gatt::{AttrHandle, ConnHandle, GattHost};
use crate::indicator::IndicatorSink;
use crate::relay::RemoteRequest;
use crate::sensor::SensorSource;

/// Entry points of an application serving the local GATT table.
pub trait PeripheralApp {
    /// Begin advertising.
    fn start<H: GattHost>(&mut self, host: &mut H) -> Result<(), HostError>;

    fn handle_event<H: GattHost>(&mut self, event: GapEvent, host: &mut H)
        -> Result<(), HostError>;

    fn handle_access<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        op: AccessOp,
        payload: &[u8],
        host: &mut H,
    ) -> Result<AttValue, AttError>;

    /// Resample local values into the host stack.
    fn refresh<H: GattHost>(&mut self, host: &mut H);

    /// A request the central role should send to the remote peer.
    fn take_remote_request(&mut self) -> Option<RemoteRequest> {
        None
    }
}

/// Bind the registered table to the application `build` makes and encode
/// its advertisement.
///
/// Fails when the host stack assigned unexpected handles or `name` does
/// not fit a legacy advertisement.
pub fn prepare<A>(
    table: Result<AttributeTable, RegistrationError>,
    name: &str,
    tx_power_dbm: i8,
    build: impl FnOnce(AttributeTable) -> A,
) -> Result<(A, AdvertisingData), Error> {
    let app = build(table?);
    let adv = sensor_advertisement(name, tx_power_dbm)?;
    Ok((app, adv))
}

pub struct Peripheral<S, I> {
    pub context: GattContext<S, I>,
    pub router: ConnectionEventRouter,
}

impl<S: SensorSource, I: IndicatorSink> Peripheral<S, I> {
    pub fn new(context: GattContext<S, I>) -> Self {
        Self {
            context,
            router: ConnectionEventRouter::new(),
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.router.state()
    }
}

impl<S: SensorSource, I: IndicatorSink> PeripheralApp for Peripheral<S, I> {
    fn start<H: GattHost>(&mut self, host: &mut H) -> Result<(), HostError> {
        self.router.start(host)
    }

    fn handle_event<H: GattHost>(
        &mut self,
        event: GapEvent,
        host: &mut H,
    ) -> Result<(), HostError> {
        self.router.handle_event(&mut self.context, event, host)
    }

    fn handle_access<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        op: AccessOp,
        payload: &[u8],
        host: &mut H,
    ) -> Result<AttValue, AttError> {
        self.context.handle_access(conn, handle, op, payload, host)
    }

    fn refresh<H: GattHost>(&mut self, host: &mut H) {
        self.context.refresh(host);
    }
}
