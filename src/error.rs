//! Unified error types for blerelay.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! With the `defmt` feature every type implements `defmt::Format` for
//! efficient on-target logging.

/// Startup failure of a firmware (fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The temperature sensor failed its self-test.
    Sensor(SensorError),

    /// The attribute table could not be registered.
    Registration(RegistrationError),

    /// The advertising payload could not be built.
    Advertising(AdvertisingError),
}

/// ATT protocol errors returned to the peer.
///
/// The discriminants are the on-air error codes (Core Spec Vol 3 Part F 3.4.1.1
/// and the common profile error codes of CSS Part B 1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AttError {
    /// The attribute handle is not part of our table.
    InvalidHandle = 0x01,
    /// The attribute cannot be read.
    ReadNotPermitted = 0x02,
    /// The attribute cannot be written.
    WriteNotPermitted = 0x03,
    /// The payload length does not match the attribute.
    InvalidAttributeValueLength = 0x0D,
    /// The request could not be completed (sensor fault).
    Unlikely = 0x0E,
    /// The CCC descriptor value is not 0x0000, 0x0001 or 0x0002.
    CccdImproperlyConfigured = 0xFD,
}

impl AttError {
    /// On-air ATT error code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Temperature sensor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The conversion did not complete.
    ReadFailed,
    /// Raw driver error code.
    Raw(u32),
}

/// Host stack request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// Advertising could not be (re)started.
    AdvertiseFailed,
    /// The notification could not be queued.
    NotifyFailed,
    /// The indication could not be queued.
    IndicateFailed,
    /// The stored attribute value could not be updated.
    SetValueFailed,
    /// The connection handle is not the active link.
    NotConnected,
}

/// Attribute table registration failure (fatal at startup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    /// Two services or two characteristics share a UUID.
    DuplicateUuid,
    /// A characteristic kind is declared twice.
    DuplicateCharacteristic,
    /// A characteristic kind is not declared at all.
    MissingCharacteristic,
    /// The attribute handle space (or our binding table) ran out.
    ResourceExhausted,
    /// The host stack assigned handles other than the declared layout.
    LayoutMismatch,
}

/// Advertising payload construction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingError {
    /// The AD structures do not fit the 31-byte legacy payload.
    PayloadTooLong,
}

// Convenience conversions

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Error::Sensor(e)
    }
}

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        Error::Registration(e)
    }
}

impl From<AdvertisingError> for Error {
    fn from(e: AdvertisingError) -> Self {
        Error::Advertising(e)
    }
}
