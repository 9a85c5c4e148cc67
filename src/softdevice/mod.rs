//! SoftDevice S140 adapter.
//!
//! Binds the host-independent core to `nrf-softdevice`:
//!
//! - [`server`]: the generated GATT server and its handle check.
//! - [`peripheral`]: advertise / accept / serve loop feeding a
//!   [`PeripheralApp`](crate::peripheral::PeripheralApp).
//! - [`central`]: scan, connect, discover and relay (relay firmware only).
//! - [`temperature`]: the nRF die temperature sensor.
//!
//! Application state lives in one [`SharedState`] cell.  Every SoftDevice
//! callback locks it for one synchronous call and releases it before the
//! next `.await`.

pub mod central;
pub mod peripheral;
pub mod server;
pub mod temperature;

use core::cell::RefCell;
use core::mem;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::{gatt_server, Connection};
use nrf_softdevice::{raw, Softdevice};

use crate::config::{ATT_MTU, FORWARD_QUEUE_DEPTH};
use crate::error::HostError;
use crate::gatt::{AttrHandle, ConnHandle, GattHost};
use crate::relay::RemoteRequest;

/// Application plus the peripheral-role link it serves.
pub struct Shared<T> {
    pub app: T,
    pub link: Option<Connection>,
}

pub type SharedState<T> = Mutex<CriticalSectionRawMutex, RefCell<Shared<T>>>;

pub fn shared<T>(app: T) -> SharedState<T> {
    Mutex::new(RefCell::new(Shared { app, link: None }))
}

/// Raised by the core whenever it wants advertising (re)started.
pub static ADVERTISE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Remote reads and writes travelling from the peripheral task to the
/// central task.
pub static FORWARD: Channel<CriticalSectionRawMutex, RemoteRequest, FORWARD_QUEUE_DEPTH> =
    Channel::new();

/// Run `f` on the application with a host bound to the current link.
pub fn with_app<T, R>(
    sd: &Softdevice,
    state: &SharedState<T>,
    f: impl FnOnce(&mut T, &mut SoftdeviceHost<'_>) -> R,
) -> R {
    state.lock(|cell| {
        let mut shared = cell.borrow_mut();
        let Shared { app, link } = &mut *shared;
        let mut host = SoftdeviceHost {
            sd,
            link: link.as_ref(),
        };
        f(app, &mut host)
    })
}

pub(crate) fn set_link<T>(state: &SharedState<T>, link: Option<Connection>) {
    state.lock(|cell| cell.borrow_mut().link = link);
}

/// [`GattHost`] backed by the SoftDevice GATTS API.
pub struct SoftdeviceHost<'a> {
    sd: &'a Softdevice,
    link: Option<&'a Connection>,
}

impl<'a> SoftdeviceHost<'a> {
    fn connection(&self, conn: ConnHandle) -> Result<&'a Connection, HostError> {
        self.link
            .filter(|c| c.handle().and_then(ConnHandle::from_raw) == Some(conn))
            .ok_or(HostError::NotConnected)
    }
}

impl GattHost for SoftdeviceHost<'_> {
    fn start_advertising(&mut self) -> Result<(), HostError> {
        ADVERTISE.signal(());
        Ok(())
    }

    fn notify(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), HostError> {
        let link = self.connection(conn)?;
        gatt_server::notify_value(link, handle, value).map_err(|_| {
            warn!("notify on attr {} failed", handle);
            HostError::NotifyFailed
        })
    }

    fn indicate(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), HostError> {
        let link = self.connection(conn)?;
        gatt_server::indicate_value(link, handle, value).map_err(|_| {
            warn!("indicate on attr {} failed", handle);
            HostError::IndicateFailed
        })
    }

    fn set_value(&mut self, handle: AttrHandle, value: &[u8]) -> Result<(), HostError> {
        debug!("set attr {} = {}", handle, value);
        gatt_server::set_value(self.sd, handle, value).map_err(|_| HostError::SetValueFailed)
    }
}

/// SoftDevice configuration for a firmware with `central_links` central
/// connections next to its one peripheral connection.
pub fn softdevice_config(name: &'static str, central_links: u8) -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1 + central_links,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: ATT_MTU }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: central_links,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: name.as_ptr() as _,
            current_len: name.len() as u16,
            max_len: name.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}
