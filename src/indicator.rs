//! Single-pixel indicator (LED) collaborator.

use embedded_hal::digital::OutputPin;

/// An on/off indicator with a readable cached state.
pub trait IndicatorSink {
    /// Drive the indicator.
    fn set(&mut self, on: bool);

    /// Last state passed to [`IndicatorSink::set`].
    fn is_on(&self) -> bool;
}

/// LED on a GPIO pin.
///
/// Development-kit LEDs are usually wired active-low, so the polarity is
/// configurable.  Pin errors are swallowed: on the nRF GPIO they are
/// `Infallible`.
pub struct PinIndicator<P: OutputPin> {
    pin: P,
    active_low: bool,
    on: bool,
}

impl<P: OutputPin> PinIndicator<P> {
    /// Wrap `pin` and switch the LED off.
    pub fn new(pin: P, active_low: bool) -> Self {
        let mut indicator = Self {
            pin,
            active_low,
            on: true,
        };
        indicator.set(false);
        indicator
    }

    pub fn active_low(pin: P) -> Self {
        Self::new(pin, true)
    }

    /// Flip the LED.
    pub fn toggle(&mut self) {
        let on = !self.on;
        self.set(on);
    }
}

impl<P: OutputPin> IndicatorSink for PinIndicator<P> {
    fn set(&mut self, on: bool) {
        let level_high = on != self.active_low;
        let result = if level_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("indicator pin write failed");
        }
        self.on = on;
    }

    fn is_on(&self) -> bool {
        self.on
    }
}
