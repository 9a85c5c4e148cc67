//! Legacy advertising payload.

use heapless::Vec;

use super::{ad_flags, ad_type};
use crate::error::AdvertisingError;
use crate::gatt::ENVIRONMENTAL_SENSING_UUID16;

/// Legacy (non-extended) advertising PDUs carry at most 31 bytes of AD data.
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Raw AD structures, ready for the host stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvertisingData {
    buf: Vec<u8, MAX_ADV_DATA_LEN>,
}

impl AdvertisingData {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one `[len, type, data..]` structure.
    pub fn push(&mut self, ty: u8, data: &[u8]) -> Result<&mut Self, AdvertisingError> {
        let len =
            u8::try_from(data.len() + 1).map_err(|_| AdvertisingError::PayloadTooLong)?;
        if self.buf.len() + data.len() + 2 > MAX_ADV_DATA_LEN {
            return Err(AdvertisingError::PayloadTooLong);
        }
        // Capacity checked above.
        let _ = self.buf.push(len);
        let _ = self.buf.push(ty);
        let _ = self.buf.extend_from_slice(data);
        Ok(self)
    }

    pub fn flags(&mut self, flags: u8) -> Result<&mut Self, AdvertisingError> {
        self.push(ad_type::FLAGS, &[flags])
    }

    pub fn complete_name(&mut self, name: &str) -> Result<&mut Self, AdvertisingError> {
        self.push(ad_type::COMPLETE_LOCAL_NAME, name.as_bytes())
    }

    pub fn complete_uuid16_list(&mut self, uuids: &[u16]) -> Result<&mut Self, AdvertisingError> {
        let mut raw: Vec<u8, MAX_ADV_DATA_LEN> = Vec::new();
        for uuid in uuids {
            raw.extend_from_slice(&uuid.to_le_bytes())
                .map_err(|_| AdvertisingError::PayloadTooLong)?;
        }
        self.push(ad_type::COMPLETE_UUID16_LIST, &raw)
    }

    pub fn tx_power(&mut self, dbm: i8) -> Result<&mut Self, AdvertisingError> {
        self.push(ad_type::TX_POWER_LEVEL, &dbm.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// The payload both firmwares advertise: general discoverable, LE only,
/// `name`, the Environmental Sensing service and our TX power.
pub fn sensor_advertisement(
    name: &str,
    tx_power_dbm: i8,
) -> Result<AdvertisingData, AdvertisingError> {
    let mut adv = AdvertisingData::new();
    adv.flags(ad_flags::LE_GENERAL_DISCOVERABLE | ad_flags::BR_EDR_NOT_SUPPORTED)?
        .complete_name(name)?
        .complete_uuid16_list(&[ENVIRONMENTAL_SENSING_UUID16])?
        .tx_power(tx_power_dbm)?;
    Ok(adv)
}
