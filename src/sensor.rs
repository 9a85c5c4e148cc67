//! Temperature sensor collaborator.
//!
//! The GATT core only needs three operations from the hardware: power the
//! sensor up, take one Celsius reading, power it down again.  Everything
//! below that (ADC, calibration, the SoftDevice TEMP peripheral) lives in
//! the board-specific implementation.

use crate::config::{
    SENSOR_ALARM_HIGH_C, SENSOR_ALARM_LOW_C, SENSOR_RANGE_MAX_C, SENSOR_RANGE_MIN_C,
};
use crate::error::{Error, SensorError};

/// A physical (or mirrored) temperature source.
pub trait SensorSource {
    /// Power the sensor up ahead of a conversion.
    fn enable(&mut self) -> Result<(), SensorError>;

    /// Take one reading in degrees Celsius.
    fn read_celsius(&mut self) -> Result<f32, SensorError>;

    /// Power the sensor down.
    fn disable(&mut self);
}

/// Truncate a Celsius reading to the one-byte wire representation.
///
/// The fraction is dropped and the value saturates to `0..=255`, so
/// negative temperatures read as 0.  NaN maps to 0.
pub fn truncate_celsius(celsius: f32) -> u8 {
    celsius as u8
}

/// Enable, read and disable the sensor.
///
/// The sensor is disabled even when the reading fails.
pub fn sample_celsius<S: SensorSource + ?Sized>(sensor: &mut S) -> Result<f32, SensorError> {
    sensor.enable()?;
    let reading = sensor.read_celsius();
    sensor.disable();

    let celsius = reading?;
    debug!("temperature sample: {} C", celsius);
    Ok(celsius)
}

/// [`sample_celsius`], truncated to the wire byte.
pub fn sample_wire_byte<S: SensorSource + ?Sized>(sensor: &mut S) -> Result<u8, SensorError> {
    sample_celsius(sensor).map(truncate_celsius)
}

/// Reading `n` of the startup self-test.
///
/// A failed reading is an error; one outside the installed range is only
/// reported.
pub fn self_test_reading<S: SensorSource + ?Sized>(
    sensor: &mut S,
    n: usize,
) -> Result<f32, Error> {
    let celsius = sample_celsius(sensor)?;
    let range = f32::from(SENSOR_RANGE_MIN_C)..=f32::from(SENSOR_RANGE_MAX_C);
    if range.contains(&celsius) {
        info!("self-test {}: {} C", n, celsius);
    } else {
        warn!("self-test {}: {} C outside the installed range", n, celsius);
    }
    Ok(celsius)
}

/// Side of the alarm window a reading fell out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm {
    Low,
    High,
}

/// Absolute alarm thresholds in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmThresholds {
    pub low: f32,
    pub high: f32,
}

impl AlarmThresholds {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// `None` while `celsius` is inside `low..=high`.
    pub fn check(&self, celsius: f32) -> Option<Alarm> {
        if celsius < self.low {
            Some(Alarm::Low)
        } else if celsius > self.high {
            Some(Alarm::High)
        } else {
            None
        }
    }
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self::new(f32::from(SENSOR_ALARM_LOW_C), f32::from(SENSOR_ALARM_HIGH_C))
    }
}

/// Sensor stand-in for the relay: holds the last value received from the
/// remote peripheral.
///
/// Starts at 0 °C until the first notification arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MirroredSensor {
    latest: u8,
}

impl MirroredSensor {
    pub const fn new() -> Self {
        Self { latest: 0 }
    }

    /// Store the latest relayed wire byte.
    pub fn store(&mut self, value: u8) {
        self.latest = value;
    }

    pub fn latest(&self) -> u8 {
        self.latest
    }
}

impl SensorSource for MirroredSensor {
    fn enable(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        Ok(f32::from(self.latest))
    }

    fn disable(&mut self) {}
}
