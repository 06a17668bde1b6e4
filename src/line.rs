//! Data line direction handling.
//!
//! The AM2321 shares one bidirectional data line between the driver and the
//! sensor. The driver drives it while sending and releases it while sampling
//! acknowledges and response bits. [`DataLine`] keeps track of which of the
//! two the line is currently doing.

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// Current role of the data line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A GPIO pin that can be switched between input and output at runtime.
pub trait DataPin: InputPin + OutputPin {
    /// Stop driving the line so the sensor can pull it low.
    fn set_as_input(&mut self) -> Result<(), Self::Error>;

    /// Start driving the line.
    fn set_as_output(&mut self) -> Result<(), Self::Error>;
}

/// Adapter for a pin configured as an open-drain output with input enabled.
///
/// Releasing an open-drain line means writing it high and letting the
/// pull-up hold it there, so no real mode switch is needed.
pub struct OpenDrain<P>(P);

impl<P> OpenDrain<P> {
    pub fn new(pin: P) -> Self {
        OpenDrain(pin)
    }
}

impl<P: ErrorType> ErrorType for OpenDrain<P> {
    type Error = P::Error;
}

impl<P: InputPin> InputPin for OpenDrain<P> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

impl<P: OutputPin> OutputPin for OpenDrain<P> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

impl<P: InputPin + OutputPin> DataPin for OpenDrain<P> {
    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Data line with an explicit direction state.
///
/// Direction changes reach the pin only on an actual transition. Levels may
/// only be written while the line is an output and sampled while it is an
/// input.
pub(crate) struct DataLine<P> {
    pin: P,
    direction: Direction,
}

impl<P: DataPin> DataLine<P> {
    pub(crate) fn new(pin: P) -> Self {
        DataLine {
            pin,
            direction: Direction::Input,
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn output(&mut self) -> Result<(), P::Error> {
        if self.direction != Direction::Output {
            self.pin.set_as_output()?;
            self.direction = Direction::Output;
        }
        Ok(())
    }

    pub(crate) fn input(&mut self) -> Result<(), P::Error> {
        if self.direction != Direction::Input {
            self.pin.set_as_input()?;
            self.direction = Direction::Input;
        }
        Ok(())
    }

    pub(crate) fn set_high(&mut self) -> Result<(), P::Error> {
        self.set_level(true)
    }

    pub(crate) fn set_low(&mut self) -> Result<(), P::Error> {
        self.set_level(false)
    }

    pub(crate) fn set_level(&mut self, high: bool) -> Result<(), P::Error> {
        debug_assert_eq!(self.direction, Direction::Output, "driving an input line");
        if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }

    pub(crate) fn is_high(&mut self) -> Result<bool, P::Error> {
        debug_assert_eq!(self.direction, Direction::Input, "sampling an output line");
        self.pin.is_high()
    }

    pub(crate) fn is_low(&mut self) -> Result<bool, P::Error> {
        debug_assert_eq!(self.direction, Direction::Input, "sampling an output line");
        self.pin.is_low()
    }
}
