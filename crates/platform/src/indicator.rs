//! Status indicators (board LEDs)
//!
//! The bench toggles the success indicator after every verified cycle and
//! blinks the error indicator forever after a fatal error. Pin errors are
//! ignored: an indicator that cannot be driven must not mask the fault it is
//! trying to report.

use embedded_hal::digital::OutputPin;

/// Discrete on/off/toggle signal.
pub trait StatusIndicator {
    /// Drive the indicator on.
    fn on(&mut self);
    /// Drive the indicator off.
    fn off(&mut self);
    /// Invert the indicator.
    fn toggle(&mut self);
}

impl<T: StatusIndicator + ?Sized> StatusIndicator for &mut T {
    fn on(&mut self) {
        (**self).on();
    }

    fn off(&mut self) {
        (**self).off();
    }

    fn toggle(&mut self) {
        (**self).toggle();
    }
}

/// Whether the LED is driven active-high or active-low on the board wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    /// Pin high lights the LED.
    High,
    /// Pin low lights the LED (STM32H745I-DISCO user LEDs).
    Low,
}

/// LED on a GPIO output that remembers its logical state.
pub struct Led<P: OutputPin> {
    pin: P,
    active: ActiveLevel,
    is_on: bool,
}

impl<P: OutputPin> Led<P> {
    /// Wrap `pin` and drive the LED off.
    pub fn new(pin: P, active: ActiveLevel) -> Self {
        let mut led = Self {
            pin,
            active,
            is_on: false,
        };
        led.set(false);
        led
    }

    /// LED lit by driving the pin high.
    pub fn active_high(pin: P) -> Self {
        Self::new(pin, ActiveLevel::High)
    }

    /// LED lit by driving the pin low.
    pub fn active_low(pin: P) -> Self {
        Self::new(pin, ActiveLevel::Low)
    }

    /// Drive the LED logically on (`true`) or off (`false`).
    pub fn set(&mut self, on: bool) {
        let high = match self.active {
            ActiveLevel::High => on,
            ActiveLevel::Low => !on,
        };
        // ok: best-effort, see module docs
        let _ = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        self.is_on = on;
    }

    /// Last commanded logical state.
    #[inline]
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Release the pin.
    pub fn free(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> StatusIndicator for Led<P> {
    fn on(&mut self) {
        self.set(true);
    }

    fn off(&mut self) {
        self.set(false);
    }

    fn toggle(&mut self) {
        self.set(!self.is_on);
    }
}
