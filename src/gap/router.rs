//! Peripheral-role connection state machine.
//!
//! ```text
//!        start                Connect(ok)
//!  Idle ───────▶ Advertising ─────────────▶ Connected
//!                 ▲   │  ▲                      │
//!                 └───┘  └──────────────────────┘
//!   AdvertiseComplete /         Disconnect
//!   Connect(failed)
//! ```
//!
//! Every transition back to `Advertising` makes exactly one
//! [`GattHost::start_advertising`] call.

use crate::error::HostError;
use crate::gatt::dispatch::GattContext;
use crate::gatt::{GattHost, SubscriptionState};
use crate::indicator::IndicatorSink;
use crate::sensor::SensorSource;

use super::GapEvent;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingState {
    #[default]
    Idle,
    Advertising,
    Connected,
}

/// Routes GAP events into the [`GattContext`].
#[derive(Debug, Default)]
pub struct ConnectionEventRouter {
    state: AdvertisingState,
}

impl ConnectionEventRouter {
    pub const fn new() -> Self {
        Self {
            state: AdvertisingState::Idle,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    /// Begin advertising.
    pub fn start<H: GattHost>(&mut self, host: &mut H) -> Result<(), HostError> {
        self.advertise(host)
    }

    pub fn handle_event<S, I, H>(
        &mut self,
        ctx: &mut GattContext<S, I>,
        event: GapEvent,
        host: &mut H,
    ) -> Result<(), HostError>
    where
        S: SensorSource,
        I: IndicatorSink,
        H: GattHost,
    {
        match event {
            GapEvent::Connect { conn, status: 0 } => {
                info!("connection established; conn={}", conn);
                if self.state != AdvertisingState::Advertising {
                    warn!("connect while {}", self.state);
                }
                ctx.set_connection(Some(conn));
                self.state = AdvertisingState::Connected;
                Ok(())
            }
            GapEvent::Connect { status, .. } => {
                warn!("connection failed; status={}", status);
                self.advertise(host)
            }
            GapEvent::Disconnect { conn, reason } => {
                if ctx.connection().is_some_and(|c| c != conn) {
                    debug!("disconnect of foreign link {}", conn);
                    return Ok(());
                }
                info!("disconnect; conn={} reason={}", conn, reason);
                ctx.reset_subscriptions();
                ctx.set_connection(None);
                self.advertise(host)
            }
            GapEvent::AdvertiseComplete { reason } => {
                info!("advertise complete; reason={}", reason);
                self.advertise(host)
            }
            GapEvent::Subscribe {
                conn,
                attr_handle,
                prev_notify,
                cur_notify,
                prev_indicate,
                cur_indicate,
            } => {
                debug!(
                    "subscribe; conn={} attr={} notify {}->{} indicate {}->{}",
                    conn, attr_handle, prev_notify, cur_notify, prev_indicate, cur_indicate
                );
                let Some(kind) = ctx.table().kind_for_value_handle(attr_handle) else {
                    warn!("subscribe for unknown attr {}", attr_handle);
                    return Ok(());
                };
                let state = SubscriptionState::from_flags(cur_notify, cur_indicate);
                ctx.apply_subscription(conn, kind, state, host);
                Ok(())
            }
            GapEvent::NotifyTx {
                conn,
                attr_handle,
                status,
                indication,
            } => {
                debug!(
                    "notify tx; conn={} attr={} status={} indication={}",
                    conn, attr_handle, status, indication
                );
                Ok(())
            }
        }
    }

    fn advertise<H: GattHost>(&mut self, host: &mut H) -> Result<(), HostError> {
        match host.start_advertising() {
            Ok(()) => {
                self.state = AdvertisingState::Advertising;
                Ok(())
            }
            Err(e) => {
                error!("error enabling advertisement: {}", e);
                self.state = AdvertisingState::Idle;
                Err(e)
            }
        }
    }
}
