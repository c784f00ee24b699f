//! Tri-colour charge level indicator.
//!
//! The LED shows how much energy is left, judged by the lowest cell:
//!
//! ```text
//! Off    → Red     battery became Normal
//! Red    → Yellow  min cell >= thresh2 + hysteresis
//! Red    → Off     battery Empty (after a red/off flash sequence)
//! Yellow → Green   min cell >= thresh1 + hysteresis, and Full or bleeding
//! Yellow → Red     min cell < thresh2
//! Green  → Yellow  min cell < thresh1
//! ```
//!
//! Only the rules of the current level are checked, so the indicator moves
//! at most one level per cycle. Both rules of a level are applied: a red
//! indicator that qualifies for yellow while the battery reads Empty still
//! flashes and ends the cycle red.

use crate::battery::BatteryState;
use crate::board::{Colour, FlashPattern, Indicator};
use crate::calibration::Thresholds;
use crate::config::{LOW_BATTERY_BLINK_UNITS, STANDARD_BLINK_COUNT};
use crate::readings::Readings;

/// Red/off flashing when the battery runs empty.
pub const LOW_BATTERY_FLASH: FlashPattern = FlashPattern::in_units(
    Colour::Red,
    Colour::Off,
    LOW_BATTERY_BLINK_UNITS,
    LOW_BATTERY_BLINK_UNITS,
    STANDARD_BLINK_COUNT,
);

/// Level shown by the indicator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum IndicatorState {
    /// Nothing to show yet, or the battery is empty
    #[default]
    Off,
    /// Low
    Red,
    /// Medium
    Yellow,
    /// Full, or charged far enough that cells are bleeding
    Green,
}

impl IndicatorState {
    pub fn colour(self) -> Colour {
        match self {
            IndicatorState::Off => Colour::Off,
            IndicatorState::Red => Colour::Red,
            IndicatorState::Yellow => Colour::Yellow,
            IndicatorState::Green => Colour::Green,
        }
    }

    fn up(self) -> Self {
        match self {
            IndicatorState::Off => IndicatorState::Red,
            IndicatorState::Red => IndicatorState::Yellow,
            IndicatorState::Yellow | IndicatorState::Green => IndicatorState::Green,
        }
    }

    fn down(self) -> Self {
        match self {
            IndicatorState::Off | IndicatorState::Red => IndicatorState::Off,
            IndicatorState::Yellow => IndicatorState::Red,
            IndicatorState::Green => IndicatorState::Yellow,
        }
    }
}

/// Drives the LED from the battery level with hysteresis.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndicatorController {
    state: IndicatorState,
}

impl IndicatorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Applies the transition rules and shows the resulting colour.
    ///
    /// # Arguments
    ///
    /// * `readings` - Current filtered readings, only the lowest cell is used
    /// * `battery` - Battery state from this cycle
    /// * `bleeding` - Whether any cell is being balanced
    /// * `thresholds` - Calibrated thresholds
    /// * `indicator` - LED driver
    pub fn refresh(
        &mut self,
        readings: &Readings,
        battery: BatteryState,
        bleeding: bool,
        thresholds: &Thresholds,
        indicator: &mut impl Indicator,
    ) {
        let min_cell = readings.min_cell_voltage();
        let hysteresis = thresholds.led_hysteresis;

        self.state = match self.state {
            IndicatorState::Off if battery == BatteryState::Normal => IndicatorState::Red,
            IndicatorState::Off => IndicatorState::Off,
            IndicatorState::Red => {
                let mut next = IndicatorState::Red;
                if min_cell >= thresholds.led_thresh2.saturating_add(hysteresis) {
                    next = next.up();
                }
                if battery == BatteryState::Empty {
                    indicator.flash(&LOW_BATTERY_FLASH);
                    next = next.down();
                }
                next
            }
            IndicatorState::Yellow => {
                let mut next = IndicatorState::Yellow;
                if min_cell >= thresholds.led_thresh1.saturating_add(hysteresis)
                    && (battery == BatteryState::Full || bleeding)
                {
                    next = next.up();
                }
                if min_cell < thresholds.led_thresh2 {
                    next = next.down();
                }
                next
            }
            IndicatorState::Green if min_cell < thresholds.led_thresh1 => IndicatorState::Yellow,
            IndicatorState::Green => IndicatorState::Green,
        };

        indicator.set_colour(self.state.colour());
    }
}
