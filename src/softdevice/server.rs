//! GATT server registered with the SoftDevice.
//!
//! The SoftDevice owns the attribute storage; [`Server::attribute_table`]
//! rebuilds our handle bindings from the handles it assigned.

use crate::error::RegistrationError;
use crate::gatt::table::{AssignedHandles, AttributeTable};
use crate::gatt::CharacteristicKind;

/// Environmental Sensing service (0x181A).
#[nrf_softdevice::gatt_service(uuid = "181a")]
pub struct EnvironmentalSensingService {
    /// Temperature (0x2A6E), whole degrees Celsius.
    #[characteristic(uuid = "2a6e", read, notify)]
    pub temperature: u8,
}

/// Custom status (LED) service.
#[nrf_softdevice::gatt_service(uuid = "1234")]
pub struct StatusService {
    #[characteristic(uuid = "5678", read, write, notify, indicate)]
    pub status: u8,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub ess: EnvironmentalSensingService,
    pub status: StatusService,
}

impl Server {
    pub fn assigned_handles(&self) -> [AssignedHandles; 2] {
        [
            AssignedHandles {
                kind: CharacteristicKind::Temperature,
                value: self.ess.temperature_value_handle,
                cccd: Some(self.ess.temperature_cccd_handle),
            },
            AssignedHandles {
                kind: CharacteristicKind::Status,
                value: self.status.status_value_handle,
                cccd: Some(self.status.status_cccd_handle),
            },
        ]
    }

    /// Attribute table matching the registered services.
    pub fn attribute_table(&self) -> Result<AttributeTable, RegistrationError> {
        let table = AttributeTable::match_assigned(&self.assigned_handles())?;
        info!(
            "GATT table registered; temperature={} status={}",
            self.ess.temperature_value_handle, self.status.status_value_handle
        );
        Ok(table)
    }
}
