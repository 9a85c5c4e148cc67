//! nRF die temperature sensor, read through the SoftDevice.

use nrf_softdevice::{raw, Softdevice};

use crate::error::SensorError;
use crate::sensor::SensorSource;

/// The on-chip TEMP peripheral.
///
/// While the SoftDevice is enabled it owns TEMP, so reads go through
/// `sd_temp_get`, which reports in 0.25 °C steps.
pub struct DieTemperature {
    _private: (),
}

impl DieTemperature {
    /// Takes the SoftDevice to prove it is enabled.
    pub fn new(_sd: &Softdevice) -> Self {
        Self { _private: () }
    }
}

impl SensorSource for DieTemperature {
    // TEMP is powered per conversion by the SoftDevice.
    fn enable(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let mut quarter_degrees: i32 = 0;
        let ret = unsafe { raw::sd_temp_get(&mut quarter_degrees) };
        if ret != raw::NRF_SUCCESS {
            warn!("sd_temp_get failed: {}", ret);
            return Err(SensorError::Raw(ret));
        }
        Ok(quarter_degrees as f32 / 4.0)
    }

    fn disable(&mut self) {}
}
