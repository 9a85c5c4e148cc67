//! Attribute access dispatcher.
//!
//! [`GattContext`] is the single owner of everything the GATT server
//! mutates at runtime: both characteristic values, the subscription state
//! of each characteristic, the sensor and indicator drivers, and the
//! handle of the peripheral-role connection.  The host stack serializes
//! all callbacks, so the context is plain data; on target it sits behind
//! one blocking mutex.

use heapless::Vec;

use super::table::{AttributeRole, AttributeTable};
use super::{
    AttrHandle, CharacteristicKind, ConnHandle, GattHost, Properties, SubscriptionState,
    CHARACTERISTIC_COUNT,
};
use crate::error::{AttError, SensorError};
use crate::indicator::IndicatorSink;
use crate::sensor::{sample_celsius, truncate_celsius, Alarm, AlarmThresholds, SensorSource};

/// Longest attribute value we serve (the CCC descriptor).
pub const MAX_ATTRIBUTE_LEN: usize = 2;

/// Bytes returned by a read (empty for writes).
pub type AttValue = Vec<u8, MAX_ATTRIBUTE_LEN>;

/// Attribute operation forwarded by the host stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessOp {
    ReadCharacteristic,
    WriteCharacteristic,
    ReadDescriptor,
    WriteDescriptor,
}

/// Runtime state of the GATT server.
pub struct GattContext<S, I> {
    table: AttributeTable,
    sensor: S,
    indicator: I,
    temperature: u8,
    status: u8,
    subscriptions: [SubscriptionState; CHARACTERISTIC_COUNT],
    connection: Option<ConnHandle>,
    thresholds: AlarmThresholds,
    alarm: Option<Alarm>,
}

impl<S: SensorSource, I: IndicatorSink> GattContext<S, I> {
    /// The status byte starts out as the indicator's current state.
    pub fn new(table: AttributeTable, sensor: S, indicator: I) -> Self {
        let status = u8::from(indicator.is_on());
        Self {
            table,
            sensor,
            indicator,
            temperature: 0,
            status,
            subscriptions: [SubscriptionState::Disabled; CHARACTERISTIC_COUNT],
            connection: None,
            thresholds: AlarmThresholds::default(),
            alarm: None,
        }
    }

    /// Serve one attribute access.
    ///
    /// Reads return the attribute bytes, writes return an empty value.
    /// Rejections carry the ATT error code for the peer and leave all
    /// state untouched.
    ///
    /// # Panics
    ///
    /// If the host stack dispatches a descriptor operation to a value
    /// handle or a characteristic operation to a descriptor handle.
    pub fn handle_access<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        handle: AttrHandle,
        op: AccessOp,
        payload: &[u8],
        host: &mut H,
    ) -> Result<AttValue, AttError> {
        debug!(
            "GATT access; conn={} attr={} op={} len={}",
            conn,
            handle,
            op,
            payload.len()
        );

        let Some(binding) = self.table.lookup(handle) else {
            warn!("access to unmapped handle {}", handle);
            return Err(AttError::InvalidHandle);
        };

        match (binding.role, op) {
            (AttributeRole::Value, AccessOp::ReadCharacteristic) => {
                if !binding.properties.contains(Properties::READ) {
                    return Err(AttError::ReadNotPermitted);
                }
                self.read_characteristic(binding.kind)
            }
            (AttributeRole::Value, AccessOp::WriteCharacteristic) => {
                if !binding.properties.contains(Properties::WRITE) {
                    return Err(AttError::WriteNotPermitted);
                }
                self.write_characteristic(binding.kind, payload, host)?;
                Ok(AttValue::new())
            }
            (AttributeRole::Cccd, AccessOp::ReadDescriptor) => {
                Ok(ccc_value(self.subscription(binding.kind)))
            }
            (AttributeRole::Cccd, AccessOp::WriteDescriptor) => {
                self.write_descriptor(conn, binding.kind, payload, host)?;
                Ok(AttValue::new())
            }
            (role, op) => unreachable!(
                "host stack dispatched {:?} to a {:?} attribute (handle {})",
                op, role, handle
            ),
        }
    }

    fn read_characteristic(&mut self, kind: CharacteristicKind) -> Result<AttValue, AttError> {
        let value = match kind {
            CharacteristicKind::Temperature => self
                .sample_temperature()
                .map_err(|_| AttError::Unlikely)?,
            CharacteristicKind::Status => self.status,
        };
        Ok(single(value))
    }

    fn write_characteristic<H: GattHost>(
        &mut self,
        kind: CharacteristicKind,
        payload: &[u8],
        host: &mut H,
    ) -> Result<(), AttError> {
        let &[value] = payload else {
            return Err(AttError::InvalidAttributeValueLength);
        };
        match kind {
            CharacteristicKind::Status => {
                info!("status write: {}", value);
                self.set_status(value, host);
                Ok(())
            }
            // Only the status characteristic declares WRITE.
            CharacteristicKind::Temperature => Err(AttError::WriteNotPermitted),
        }
    }

    fn write_descriptor<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        kind: CharacteristicKind,
        payload: &[u8],
        host: &mut H,
    ) -> Result<(), AttError> {
        let &[lo, hi] = payload else {
            return Err(AttError::InvalidAttributeValueLength);
        };
        let state = SubscriptionState::from_ccc(u16::from_le_bytes([lo, hi]))
            .ok_or(AttError::CccdImproperlyConfigured)?;
        self.apply_subscription(conn, kind, state, host);
        Ok(())
    }

    /// Record a new subscription state for `kind`.
    ///
    /// Enabling notifications pushes the current value to `conn` once.
    /// Indications are paced by the host stack's acknowledgement queue and
    /// get no immediate push.
    pub fn apply_subscription<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        kind: CharacteristicKind,
        state: SubscriptionState,
        host: &mut H,
    ) {
        info!("{} subscription -> {}", kind, state);
        self.subscriptions[kind.index()] = state;

        if state == SubscriptionState::NotifyEnabled {
            if let Some(value) = self.current_value(kind) {
                self.send(conn, kind, value, host);
            }
        }
    }

    /// Store a new status byte, drive the indicator and push the value to
    /// the subscriber (fire and forget).
    pub fn set_status<H: GattHost>(&mut self, value: u8, host: &mut H) {
        self.status = value;
        self.indicator.set(value != 0);
        self.publish(CharacteristicKind::Status, host);
    }

    /// Mirror the current value of `kind` into the host stack and push it
    /// to the connected subscriber, if any.
    ///
    /// Send failures are logged and dropped.
    pub fn publish<H: GattHost>(&mut self, kind: CharacteristicKind, host: &mut H) {
        let Some(value) = self.current_value(kind) else {
            return;
        };
        self.store(kind, value, host);
        if let Some(conn) = self.connection {
            self.send(conn, kind, value, host);
        }
    }

    /// Resample the sensor and mirror both values into the host stack
    /// without pushing anything.
    pub fn refresh<H: GattHost>(&mut self, host: &mut H) {
        for kind in CharacteristicKind::ALL {
            if let Some(value) = self.current_value(kind) {
                self.store(kind, value, host);
            }
        }
    }

    fn current_value(&mut self, kind: CharacteristicKind) -> Option<u8> {
        match kind {
            CharacteristicKind::Temperature => self.sample_temperature().ok(),
            CharacteristicKind::Status => Some(self.status),
        }
    }

    fn store<H: GattHost>(&mut self, kind: CharacteristicKind, value: u8, host: &mut H) {
        let handle = self.table.value_handle(kind);
        if let Err(e) = host.set_value(handle, &[value]) {
            warn!("{} set_value failed: {}", kind, e);
        }
    }

    fn send<H: GattHost>(
        &mut self,
        conn: ConnHandle,
        kind: CharacteristicKind,
        value: u8,
        host: &mut H,
    ) {
        let state = self.subscription(kind);
        let handle = self.table.value_handle(kind);
        let result = match state {
            SubscriptionState::Disabled => return,
            SubscriptionState::NotifyEnabled => host.notify(conn, handle, &[value]),
            SubscriptionState::IndicateEnabled => host.indicate(conn, handle, &[value]),
        };
        match result {
            Ok(()) => debug!("{} pushed {} ({})", kind, value, state),
            Err(e) => warn!("{} push failed: {}", kind, e),
        }
    }

    fn sample_temperature(&mut self) -> Result<u8, SensorError> {
        let celsius = sample_celsius(&mut self.sensor).map_err(|e| {
            error!("temperature read failed: {}", e);
            e
        })?;
        self.track_alarm(celsius);
        self.temperature = truncate_celsius(celsius);
        Ok(self.temperature)
    }

    /// Warn when a sample leaves the alarm window; note when it returns.
    fn track_alarm(&mut self, celsius: f32) {
        let alarm = self.thresholds.check(celsius);
        if alarm == self.alarm {
            return;
        }
        match alarm {
            Some(side) => warn!("temperature alarm ({}): {} C", side, celsius),
            None => info!("temperature back in range: {} C", celsius),
        }
        self.alarm = alarm;
    }

    pub fn subscription(&self, kind: CharacteristicKind) -> SubscriptionState {
        self.subscriptions[kind.index()]
    }

    /// Drop every subscription (a fresh connection must subscribe again).
    pub fn reset_subscriptions(&mut self) {
        self.subscriptions = [SubscriptionState::Disabled; CHARACTERISTIC_COUNT];
    }

    pub fn connection(&self) -> Option<ConnHandle> {
        self.connection
    }

    pub fn set_connection(&mut self, conn: Option<ConnHandle>) {
        self.connection = conn;
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    /// Current status byte.
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Last temperature byte sampled.
    pub fn temperature(&self) -> u8 {
        self.temperature
    }

    /// Alarm raised by the last sample, if any.
    pub fn alarm(&self) -> Option<Alarm> {
        self.alarm
    }

    pub fn set_alarm_thresholds(&mut self, thresholds: AlarmThresholds) {
        self.thresholds = thresholds;
        self.alarm = None;
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}

fn single(value: u8) -> AttValue {
    let mut out = AttValue::new();
    // Capacity is MAX_ATTRIBUTE_LEN >= 1.
    let _ = out.push(value);
    out
}

fn ccc_value(state: SubscriptionState) -> AttValue {
    let mut out = AttValue::new();
    let _ = out.extend_from_slice(&state.to_le_bytes());
    out
}
