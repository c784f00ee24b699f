//! Power mode management for the battery block.
//!
//! This module decides how much of the MCU stays awake. There are two
//! running modes and one terminal action:
//!
//! - **Active**: full clock, fast ADC, charge PWM running.
//! - **Snoozing**: entered when the panel drops below `low_panel`. Clock and
//!   ADC slow down, the PWM is disconnected, and an idle countdown starts.
//!   The panel coming back returns the unit to Active.
//! - **Sleep**: the processor halts in its lowest-power mode with the ADC
//!   off. Nothing but the watchdog timeout ends it, and execution restarts
//!   from boot. Taken when the idle countdown runs out, or straight from
//!   Active when there is no panel and the battery is empty.
//!
//! # Wake path
//!
//! After every watchdog restart the panel is checked against the nominal
//! (uncalibrated) `low_panel` with only the clock and ADC initialised. A dark
//! panel sends the unit straight back to sleep without paying for full
//! initialisation.

use crate::battery::BatteryState;
use crate::board::{AnalogFrontEnd, Channel, Clocks};
use crate::config::NOMINAL;

/// Current running mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum PowerMode {
    /// Full speed, charging possible
    #[default]
    Active,
    /// Reduced clock, no charging, counting down to sleep
    Snoozing,
}

/// Outcome of a power decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum PowerDecision {
    /// Keep running the control loop
    Continue,
    /// Halt until the watchdog restarts the unit
    Sleep,
}

/// Tracks the running mode and the idle countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerController {
    mode: PowerMode,
    /// Cycles left before snoozing becomes sleep
    idle_countdown: u32,
    /// Countdown start value
    max_snooze_cycles: u32,
}

impl PowerController {
    /// Creates a controller in Active mode.
    ///
    /// # Arguments
    ///
    /// * `max_snooze_cycles` - Cycles spent snoozing before going to sleep
    pub fn new(max_snooze_cycles: u32) -> Self {
        Self {
            mode: PowerMode::default(),
            idle_countdown: 0,
            max_snooze_cycles,
        }
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == PowerMode::Active
    }

    pub fn idle_countdown(&self) -> u32 {
        self.idle_countdown
    }

    /// Sleep straight from any mode when there is neither generation nor
    /// permitted discharge.
    pub fn consider_sleep(&self, panel: u16, low_panel: u16, battery: BatteryState) -> PowerDecision {
        if panel < low_panel && battery == BatteryState::Empty {
            PowerDecision::Sleep
        } else {
            PowerDecision::Continue
        }
    }

    /// Handles snooze entry, the idle countdown and snooze exit.
    ///
    /// The countdown ticks on the entry cycle too, so `max_snooze_cycles`
    /// consecutive dark cycles end in sleep.
    pub fn consider_snooze(&mut self, panel: u16, low_panel: u16, clocks: &mut impl Clocks) -> PowerDecision {
        if self.mode == PowerMode::Active && panel < low_panel {
            self.snooze(clocks);
        }

        if self.mode == PowerMode::Snoozing {
            self.idle_countdown = self.idle_countdown.saturating_sub(1);
            if self.idle_countdown == 0 {
                #[cfg(feature = "debug-mode")]
                defmt::info!("Snoozed too long, going to sleep");

                return PowerDecision::Sleep;
            }
            if panel >= low_panel {
                self.wake(clocks);
            }
        }

        PowerDecision::Continue
    }

    /// Slows everything down and restarts the idle countdown.
    pub fn snooze(&mut self, clocks: &mut impl Clocks) {
        #[cfg(feature = "debug-mode")]
        defmt::info!("Snoozing");

        clocks.snooze();
        self.mode = PowerMode::Snoozing;
        self.idle_countdown = self.max_snooze_cycles;
    }

    /// Back to full speed.
    pub fn wake(&mut self, clocks: &mut impl Clocks) {
        #[cfg(feature = "debug-mode")]
        defmt::info!("Waking from snooze");

        clocks.wake();
        self.mode = PowerMode::Active;
    }
}

/// Fast-reject check on the minimal initialisation tier.
///
/// Uses the nominal threshold so it does not depend on calibration.
pub fn panel_worth_waking(afe: &mut impl AnalogFrontEnd) -> bool {
    afe.sample(Channel::Panel) >= NOMINAL.low_panel
}
