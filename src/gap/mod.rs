//! Generic Access Profile: advertising data in and out, and the
//! peripheral-role connection state machine.
//!
//! - [`advertising`] builds the legacy advertising payload.
//! - [`adv_parser`] inspects advertising reports seen while scanning.
//! - [`router`] reacts to connection and subscription events.

pub mod adv_parser;
pub mod advertising;
pub mod router;

use crate::gatt::{AttrHandle, ConnHandle};

/// AD structure types we emit or look at.
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_UUID16_LIST: u8 = 0x02;
    pub const COMPLETE_UUID16_LIST: u8 = 0x03;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
}

/// Bits of the Flags AD structure.
pub mod ad_flags {
    pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
    pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;
}

/// Peripheral-role events reported by the host stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GapEvent {
    /// A connection was established (`status == 0`) or the attempt failed.
    Connect { conn: ConnHandle, status: u8 },
    /// The link is gone.
    Disconnect { conn: ConnHandle, reason: u8 },
    /// Advertising stopped on its own (timeout or cancellation).
    AdvertiseComplete { reason: u8 },
    /// The peer changed the CCC descriptor of the characteristic whose
    /// value handle is `attr_handle`.
    Subscribe {
        conn: ConnHandle,
        attr_handle: AttrHandle,
        prev_notify: bool,
        cur_notify: bool,
        prev_indicate: bool,
        cur_indicate: bool,
    },
    /// A notification or indication left the stack (or failed to).
    NotifyTx {
        conn: ConnHandle,
        attr_handle: AttrHandle,
        status: u8,
        indication: bool,
    },
}
