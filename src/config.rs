//! Application-wide constants and compile-time configuration.
//!
//! Advertising, connection and timing parameters plus the board wiring
//! live here so they can be tuned in one place.

// GAP

/// Complete local name carried in advertising data and the GAP service.
pub const DEVICE_NAME: &str = "BLE_Relay";

/// Local name used by the stand-alone sensor peripheral.
pub const SENSOR_DEVICE_NAME: &str = "BLE_Sensor";

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL: u32 = 160;

/// Advertised TX power level (dBm). The SoftDevice transmits at 0 dBm by default.
pub const ADV_TX_POWER_DBM: i8 = 0;

/// BLE connection interval range (in 1.25 ms units). 24..40 = 30..50 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Passive scan interval / window (in 0.625 ms units).
pub const SCAN_INTERVAL: u32 = 160;
pub const SCAN_WINDOW: u32 = 80;

// GATT

/// First attribute handle available to application services.
///
/// Handles 1..=11 are taken by the GAP and GATT services the host stack
/// registers before ours.
pub const FIRST_APP_HANDLE: u16 = 12;

/// ATT MTU negotiated on both roles. Our values fit in the default.
pub const ATT_MTU: u16 = 23;

// Sensor

/// Range the temperature sensor is installed for (°C).
pub const SENSOR_RANGE_MIN_C: i8 = 10;
pub const SENSOR_RANGE_MAX_C: i8 = 50;

/// Readings taken during the startup self-test, one per second.
pub const SENSOR_SELF_TEST_READINGS: usize = 3;
pub const SENSOR_SELF_TEST_INTERVAL_MS: u64 = 1000;

/// How often the served temperature value is resampled (ms).
pub const SENSOR_REFRESH_INTERVAL_MS: u64 = 1000;

/// Absolute alarm thresholds (°C). Samples outside raise a warning.
pub const SENSOR_ALARM_LOW_C: i8 = -10;
pub const SENSOR_ALARM_HIGH_C: i8 = 50;

// Relay

/// How often the relay reads the remote temperature while linked (ms).
pub const REMOTE_READ_INTERVAL_MS: u64 = 2000;

// Board LEDs (nRF52840-DK, active-low)
//
//   LED1 → P0.13  run status (blinks)
//   LED2 → P0.14  central link up (relay), peripheral link up (sensor)
//   LED3 → P0.15  peripheral link up (relay)
//   LED4 → P0.16  status characteristic

/// Blink period of the run status LED (ms).
pub const RUN_LED_BLINK_INTERVAL_MS: u64 = 1000;

/// Depth of the remote request queue (peripheral task → central task).
pub const FORWARD_QUEUE_DEPTH: usize = 4;
