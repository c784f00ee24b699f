//! Hardware seams between the control core and the board.
//!
//! The core never touches registers. It samples channels, drives the
//! indicator, the discharge gate, the bleed switches and the charge PWM, and
//! asks for clock changes through the traits below. The firmware binary
//! implements them on the STM32 peripherals; tests implement them on a
//! simulated board.

use embassy_time::Duration;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::watchdog::Watchdog;

/// Number of series cells in the pack.
pub const CELL_COUNT: usize = 4;

/// Logical analog channel.
///
/// Cell channels are stacked taps: `Cell2` measures cells one and two
/// together, and so on up to `Cell4` which is the whole battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum Channel {
    Cell1,
    Cell2,
    Cell3,
    Cell4,
    Panel,
    Fuse,
    Temperature,
}

impl Channel {
    /// Cell taps in stacking order.
    pub const CELLS: [Channel; CELL_COUNT] =
        [Channel::Cell1, Channel::Cell2, Channel::Cell3, Channel::Cell4];

    /// Position of the channel in per-channel state arrays.
    pub const fn index(self) -> usize {
        match self {
            Channel::Cell1 => 0,
            Channel::Cell2 => 1,
            Channel::Cell3 => 2,
            Channel::Cell4 => 3,
            Channel::Panel => 4,
            Channel::Fuse => 5,
            Channel::Temperature => 6,
        }
    }
}

/// Reads one analog channel.
///
/// Blocks until the conversion completes. There is no error path: the
/// converter is part of the MCU and is assumed present.
pub trait AnalogFrontEnd {
    fn sample(&mut self, channel: Channel) -> u16;
}

/// Indicator colour. Yellow is red and green together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum Colour {
    #[default]
    Off,
    Red,
    Yellow,
    Green,
}

/// A blocking flash sequence: `on` for `on_time`, then `off` for
/// `off_time`, repeated `repeats` times. The indicator is left showing `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashPattern {
    pub on: Colour,
    pub off: Colour,
    pub on_time: Duration,
    pub off_time: Duration,
    pub repeats: u16,
}

impl FlashPattern {
    /// Builds a pattern from durations counted in blink units (1/8 s).
    pub const fn in_units(on: Colour, off: Colour, on_units: u64, off_units: u64, repeats: u16) -> Self {
        Self {
            on,
            off,
            on_time: Duration::from_millis(crate::config::BLINK_UNIT_MS * on_units),
            off_time: Duration::from_millis(crate::config::BLINK_UNIT_MS * off_units),
            repeats,
        }
    }
}

/// Tri-colour indicator driver.
pub trait Indicator {
    fn set_colour(&mut self, colour: Colour);

    /// Runs `pattern` to completion. Implementations must feed the watchdog
    /// on every toggle.
    fn flash(&mut self, pattern: &FlashPattern);
}

/// State of the discharge MOSFET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum Gate {
    Open,
    Closed,
}

/// Charge and discharge switching elements.
pub trait PowerStage {
    fn set_gate(&mut self, gate: Gate);

    /// Switches the bleed resistor across cell `cell` (0-based).
    fn set_bleed(&mut self, cell: usize, on: bool);

    /// Sets the shunt regulator compare value. Higher values pull the
    /// charging voltage down.
    fn set_duty(&mut self, duty: u16);

    /// Connects or disconnects the PWM output. Disconnected means no charging.
    fn enable_regulator(&mut self, enabled: bool);
}

/// Clock tree and power mode control.
pub trait Clocks {
    /// Clock and ADC only: enough to check the panel after a wake.
    fn init_minimal(&mut self);

    /// Everything else: outputs at their safe levels and the PWM timer.
    fn init_full(&mut self);

    /// Reduced clock and ADC speed with the regulator disconnected.
    fn snooze(&mut self);

    /// Back to full speed with the regulator reconnected.
    fn wake(&mut self);

    /// Drives every output to its reset level and powers down the timer and
    /// the ADC ahead of a halt.
    fn shutdown(&mut self);

    /// Stops the core in its lowest-power mode. Only a watchdog reset ends it.
    fn halt(&mut self) -> !;
}

/// Everything the control loop needs from the board.
pub trait Board: AnalogFrontEnd + Indicator + PowerStage + Clocks + Watchdog + DelayUs<u32> {}

impl<T> Board for T where T: AnalogFrontEnd + Indicator + PowerStage + Clocks + Watchdog + DelayUs<u32> {}
