//! GATT attribute exposure.
//!
//! - [`table`] declares the two services and resolves every attribute
//!   handle to a {characteristic, role, properties} binding.
//! - [`dispatch`] owns the characteristic values and per-characteristic
//!   subscription state, and serves every read/write the host stack
//!   forwards to us.
//!
//! Nothing here talks to a radio.  Outbound traffic (notifications,
//! indications, advertising) goes through the [`GattHost`] trait so the
//! logic runs unchanged on the SoftDevice and in host tests.

pub mod dispatch;
pub mod table;

use crate::error::HostError;

/// Attribute handle as assigned by the host stack.
pub type AttrHandle = u16;

/// Opaque connection identifier, valid between Connect and Disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

impl ConnHandle {
    /// Sentinel the host stacks use for "no connection".
    pub const NONE: u16 = 0xFFFF;

    /// Convert a raw host-stack handle, mapping the sentinel to `None`.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        if raw == Self::NONE {
            None
        } else {
            Some(Self(raw))
        }
    }
}

/// 16- or 128-bit attribute type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Uuid16(u16),
    /// Little-endian, as carried on air.
    Uuid128([u8; 16]),
}

/// Environmental Sensing service, as listed in advertising data.
pub const ENVIRONMENTAL_SENSING_UUID16: u16 = 0x181A;
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = Uuid::Uuid16(ENVIRONMENTAL_SENSING_UUID16);
/// Temperature characteristic.
pub const TEMPERATURE_CHARACTERISTIC: Uuid = Uuid::Uuid16(0x2A6E);
/// Custom service carrying the status characteristic.
pub const STATUS_SERVICE_UUID16: u16 = 0x1234;
pub const STATUS_SERVICE: Uuid = Uuid::Uuid16(STATUS_SERVICE_UUID16);
/// Status (LED) characteristic.
pub const STATUS_CHARACTERISTIC: Uuid = Uuid::Uuid16(0x5678);
/// Client Characteristic Configuration descriptor.
pub const CCC_DESCRIPTOR: Uuid = Uuid::Uuid16(0x2902);

/// Characteristic properties (the bits of the characteristic declaration).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Properties(u8);

impl Properties {
    pub const READ: Self = Self(0x02);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether a CCC descriptor has to be registered for this characteristic.
    pub const fn subscribable(self) -> bool {
        self.contains(Self::NOTIFY) || self.contains(Self::INDICATE)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// The characteristics this firmware exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CharacteristicKind {
    /// Truncated Celsius temperature, read + notify.
    Temperature,
    /// LED status byte, read + write + notify + indicate.
    Status,
}

impl CharacteristicKind {
    pub const ALL: [CharacteristicKind; CHARACTERISTIC_COUNT] =
        [CharacteristicKind::Temperature, CharacteristicKind::Status];

    pub const fn index(self) -> usize {
        match self {
            CharacteristicKind::Temperature => 0,
            CharacteristicKind::Status => 1,
        }
    }
}

pub const CHARACTERISTIC_COUNT: usize = 2;

/// Client Characteristic Configuration state of one characteristic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscriptionState {
    #[default]
    Disabled,
    NotifyEnabled,
    IndicateEnabled,
}

impl SubscriptionState {
    /// Decode a CCC descriptor value.
    pub const fn from_ccc(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(SubscriptionState::Disabled),
            0x0001 => Some(SubscriptionState::NotifyEnabled),
            0x0002 => Some(SubscriptionState::IndicateEnabled),
            _ => None,
        }
    }

    /// CCC descriptor value.
    pub const fn ccc_value(self) -> u16 {
        match self {
            SubscriptionState::Disabled => 0x0000,
            SubscriptionState::NotifyEnabled => 0x0001,
            SubscriptionState::IndicateEnabled => 0x0002,
        }
    }

    /// Little-endian CCC descriptor bytes.
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.ccc_value().to_le_bytes()
    }

    /// Subscription state from a host-stack subscribe event.
    ///
    /// Notify wins if a (non-conforming) peer sets both bits.
    pub const fn from_flags(notify: bool, indicate: bool) -> Self {
        if notify {
            SubscriptionState::NotifyEnabled
        } else if indicate {
            SubscriptionState::IndicateEnabled
        } else {
            SubscriptionState::Disabled
        }
    }
}

/// Host stack services the GATT core calls into.
///
/// Implemented by the SoftDevice adapter on target and by recording mocks
/// in tests.
pub trait GattHost {
    /// (Re)start connectable advertising.
    fn start_advertising(&mut self) -> Result<(), HostError>;

    /// Queue an unacknowledged notification.
    fn notify(&mut self, conn: ConnHandle, handle: AttrHandle, value: &[u8])
        -> Result<(), HostError>;

    /// Queue an acknowledged indication.
    fn indicate(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), HostError>;

    /// Update the value the host stack serves on its own (reads it answers
    /// without calling back into [`dispatch`]).
    fn set_value(&mut self, _handle: AttrHandle, _value: &[u8]) -> Result<(), HostError> {
        Ok(())
    }
}
