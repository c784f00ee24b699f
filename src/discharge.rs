//! Discharge gate control and short-circuit containment.

use crate::battery::BatteryState;
use crate::board::{Colour, FlashPattern, Gate, Indicator, PowerStage};
use crate::charge::ChargeRegulator;
use crate::config::{SHORT_CIRCUIT_BLINK_UNITS, STANDARD_BLINK_COUNT};

/// Red/off flashing while a short circuit is contained.
pub const SHORT_CIRCUIT_FLASH: FlashPattern = FlashPattern::in_units(
    Colour::Red,
    Colour::Off,
    SHORT_CIRCUIT_BLINK_UNITS,
    SHORT_CIRCUIT_BLINK_UNITS,
    STANDARD_BLINK_COUNT,
);

/// Sets the discharge gate for the current battery state.
///
/// A short circuit is handled here rather than computed: charging stops,
/// the gate closes for the duration of a blocking flash sequence, then the
/// state is forced back to `Normal` and the gate reopens. If the fault is
/// still present the next cycle detects it again.
pub fn refresh<B>(battery: &mut BatteryState, regulator: &mut ChargeRegulator, board: &mut B)
where
    B: PowerStage + Indicator,
{
    match battery {
        BatteryState::Normal | BatteryState::Full => board.set_gate(Gate::Open),
        BatteryState::Empty => board.set_gate(Gate::Closed),
        BatteryState::ShortCircuit => {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Short circuit: discharge closed");

            board.set_gate(Gate::Closed);
            regulator.force_ceiling(board);
            board.flash(&SHORT_CIRCUIT_FLASH);
            *battery = BatteryState::Normal;
            board.set_gate(Gate::Open);
        }
    }
}
