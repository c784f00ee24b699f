//! Battery state machine.
//!
//! The rules run every cycle in a fixed order and later rules override
//! earlier ones:
//!
//! ```text
//! 1. min cell <= min_cell                      -> Empty
//! 2. Empty and min cell >= restart_discharge   -> Normal
//! 3. every cell >= stop_charge                 -> Full
//! 4. Full and min cell < restart_charge        -> Normal
//! 5. fuse < min_fuse                           -> ShortCircuit
//! ```
//!
//! The gaps between `min_cell`/`restart_discharge` and
//! `restart_charge`/`stop_charge` are the hysteresis bands. No state is
//! terminal.

use crate::calibration::Thresholds;
use crate::readings::Readings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
#[repr(u8)]
pub enum BatteryState {
    #[default]
    Normal = 0,
    Full = 1,
    Empty = 2,
    ShortCircuit = 3,
}

impl BatteryState {
    /// State a freshly booted unit assumes: discharge stays off until the
    /// lowest cell has recovered past `restart_discharge`.
    pub const AT_BOOT: BatteryState = BatteryState::Empty;

    /// Applies the transition rules to the current filtered readings.
    pub fn next(self, readings: &Readings, thresholds: &Thresholds) -> BatteryState {
        let min_cell = readings.min_cell_voltage();
        let mut state = self;

        if min_cell <= thresholds.min_cell {
            state = BatteryState::Empty;
        }
        if state == BatteryState::Empty && min_cell >= thresholds.restart_discharge {
            state = BatteryState::Normal;
        }
        if readings.cells().iter().all(|&cell| cell >= thresholds.stop_charge) {
            state = BatteryState::Full;
        }
        if state == BatteryState::Full && min_cell < thresholds.restart_charge {
            state = BatteryState::Normal;
        }
        if readings.fuse() < thresholds.min_fuse {
            state = BatteryState::ShortCircuit;
        }

        state
    }

    /// Advances `self` in place.
    pub fn refresh(&mut self, readings: &Readings, thresholds: &Thresholds) {
        let next = self.next(readings, thresholds);

        #[cfg(feature = "debug-mode")]
        if next != *self {
            defmt::info!("Battery {} -> {}", *self, next);
        }

        *self = next;
    }
}
