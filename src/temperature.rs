//! Maximum temperature log and thermal shutdown.
//!
//! Every `temp_log_interval` cycles, and only while Active, the die
//! temperature is sampled into a fast rolling average. The highest average
//! ever seen is kept in durable storage for field diagnosis. Reaching the
//! shutdown level stops charging and discharging for a long slow flash so the
//! unit can cool down.

use crate::board::{AnalogFrontEnd, Channel, Clocks, Colour, FlashPattern, Gate, Indicator, PowerStage};
use crate::config::{SHUTDOWN_TEMP_C, TEMP_CAL_HIGH_C, TEMP_CAL_LOW_C, THERMAL_BLINK_COUNT, THERMAL_BLINK_UNITS};
use crate::filter::TemperatureAverage;
use crate::power::PowerController;
use crate::store::{DurableStore, ERASED_WORD, StorageKey};

/// Slow red/off flashing while cooling down.
pub const THERMAL_FLASH: FlashPattern = FlashPattern::in_units(
    Colour::Red,
    Colour::Off,
    THERMAL_BLINK_UNITS,
    THERMAL_BLINK_UNITS,
    THERMAL_BLINK_COUNT,
);

/// Converts the shutdown temperature into a sensor code by interpolating
/// between the two factory calibration points.
pub fn shutdown_level(cal_low: u16, cal_high: u16) -> u16 {
    let span = f32::from(cal_high) - f32::from(cal_low);
    let above_low = (SHUTDOWN_TEMP_C - TEMP_CAL_LOW_C) * span / (TEMP_CAL_HIGH_C - TEMP_CAL_LOW_C);
    (above_low + f32::from(cal_low) + 0.5) as u16
}

pub struct TemperatureLog {
    countdown: u16,
    interval: u16,
    /// Highest average seen, 0 until loaded from storage
    max: u16,
    average: TemperatureAverage,
    shutdown_level: u16,
}

impl TemperatureLog {
    /// Reads the calibration words and arms the countdown.
    pub fn new(interval: u16, store: &mut impl DurableStore) -> Self {
        let level = shutdown_level(store.read(StorageKey::TempCalLow), store.read(StorageKey::TempCalHigh));

        #[cfg(feature = "debug-mode")]
        defmt::info!("Thermal shutdown at code {}", level);

        Self {
            countdown: interval,
            interval,
            max: 0,
            average: TemperatureAverage::new(),
            shutdown_level: level,
        }
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn average(&self) -> u16 {
        self.average.value()
    }

    pub fn shutdown_level(&self) -> u16 {
        self.shutdown_level
    }

    /// Called once per control cycle. Returns `true` if a thermal shutdown
    /// ran.
    pub fn refresh<B>(&mut self, power: &mut PowerController, store: &mut impl DurableStore, board: &mut B) -> bool
    where
        B: AnalogFrontEnd + Indicator + PowerStage + Clocks,
    {
        if self.countdown != 0 {
            self.countdown -= 1;
            return false;
        }
        if !power.is_active() {
            return false;
        }

        self.load_max(store);

        let average = self.average.update(board.sample(Channel::Temperature));
        if average > self.max {
            self.max = average;
            persist(store, average);
        }

        let overheated = average >= self.shutdown_level;
        if overheated {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Thermal shutdown: {} >= {}", average, self.shutdown_level);

            power.snooze(board);
            board.set_gate(Gate::Closed);
            board.flash(&THERMAL_FLASH);
            board.set_gate(Gate::Open);
            power.wake(board);
        }

        self.countdown = self.interval;
        overheated
    }

    /// Recovers the persisted maximum after a reset. An erased record is
    /// reseeded to 1 in both copies.
    fn load_max(&mut self, store: &mut impl DurableStore) {
        if self.max != 0 {
            return;
        }
        self.max = store.read(StorageKey::MaxTemperature);
        if self.max == ERASED_WORD {
            self.max = 1;
            persist(store, 1);
        }
    }
}

fn persist(store: &mut impl DurableStore, value: u16) {
    if let Err(_error) = store.write(StorageKey::MaxTemperature, value) {
        #[cfg(feature = "debug-mode")]
        defmt::error!("Failed to store max temperature: {}", _error);
    }
}
