//! Boot sequence and control loop.
//!
//! # Boot
//!
//! ```text
//! feed watchdog → minimal init → panel dark? → sleep
//!               → full init → load trims → calibrate thresholds
//!               → self-test pending? → run it, flash the result, sleep
//!               → control loop
//! ```
//!
//! # Cycle
//!
//! ```text
//! feed → acquire → temperature log → battery state → discharge
//!      → charge (Active only) → indicator → consider sleep → consider snooze
//! ```
//!
//! Sleep never returns: the board is shut down and halted until the
//! watchdog restarts the firmware from boot.

use crate::battery::BatteryState;
use crate::board::Board;
use crate::calibration::{Calibration, Thresholds, TrimConstants};
use crate::charge::ChargeRegulator;
use crate::config::{NOMINAL, Tuning};
use crate::discharge;
use crate::indicator::{IndicatorController, IndicatorState};
use crate::power::{self, PowerController, PowerDecision, PowerMode};
use crate::readings::Readings;
use crate::store::DurableStore;
#[cfg(feature = "first-run-test")]
use crate::store::{StorageKey, TestResult};
#[cfg(feature = "max-temp-log")]
use crate::temperature::TemperatureLog;

/// The whole battery block: board, storage and every state machine.
pub struct Controller<B, S> {
    board: B,
    store: S,
    tuning: Tuning,
    thresholds: Thresholds,
    readings: Readings,
    battery: BatteryState,
    regulator: ChargeRegulator,
    power: PowerController,
    indicator: IndicatorController,
    #[cfg(feature = "max-temp-log")]
    temperature: TemperatureLog,
}

impl<B: Board, S: DurableStore> Controller<B, S> {
    /// Assembles the controller. Nothing is driven until [`boot`](Self::boot).
    pub fn new(board: B, mut store: S, tuning: Tuning) -> Self {
        #[cfg(feature = "max-temp-log")]
        let temperature = TemperatureLog::new(tuning.temp_log_interval, &mut store);

        Self {
            board,
            store,
            tuning,
            thresholds: NOMINAL,
            readings: Readings::seeded(NOMINAL.min_cell),
            battery: BatteryState::AT_BOOT,
            regulator: ChargeRegulator::new(tuning.max_duty),
            power: PowerController::new(tuning.max_snooze_cycles),
            indicator: IndicatorController::new(),
            #[cfg(feature = "max-temp-log")]
            temperature,
        }
    }

    /// Brings the board up after a reset.
    ///
    /// Returns [`PowerDecision::Sleep`] when the panel is dark or a self-test
    /// has just run, [`PowerDecision::Continue`] when the loop should start.
    pub fn boot(&mut self) -> PowerDecision {
        self.board.feed();
        self.board.init_minimal();

        if !power::panel_worth_waking(&mut self.board) {
            #[cfg(feature = "debug-mode")]
            defmt::info!("Panel dark at wake, back to sleep");

            return PowerDecision::Sleep;
        }

        self.board.init_full();

        let trim = TrimConstants::load(&mut self.store);
        self.thresholds = NOMINAL.calibrated(&Calibration::from_trim(&trim));

        #[cfg(feature = "debug-mode")]
        defmt::info!("Calibrated thresholds: {}", self.thresholds);

        self.readings = Readings::seeded(self.thresholds.min_cell);
        self.battery = BatteryState::AT_BOOT;
        self.regulator = ChargeRegulator::new(self.tuning.max_duty);
        self.regulator.force_ceiling(&mut self.board);

        #[cfg(feature = "first-run-test")]
        if TestResult::from_word(self.store.read(StorageKey::TestResult)) != TestResult::Passed {
            self.first_run_test();
            return PowerDecision::Sleep;
        }

        PowerDecision::Continue
    }

    #[cfg(feature = "first-run-test")]
    fn first_run_test(&mut self) {
        use crate::self_test::{SelfTest, result_flash};

        let result = SelfTest {
            readings: &mut self.readings,
            regulator: &mut self.regulator,
            thresholds: &self.thresholds,
            tuning: &self.tuning,
        }
        .run(&mut self.store, &mut self.board);

        if let Some(pattern) = result_flash(result) {
            self.board.flash(&pattern);
        }
    }

    /// One pass of the control loop.
    pub fn step(&mut self) -> PowerDecision {
        self.board.feed();

        self.readings.refresh(&mut self.board);

        #[cfg(feature = "max-temp-log")]
        self.temperature
            .refresh(&mut self.power, &mut self.store, &mut self.board);

        self.battery.refresh(&self.readings, &self.thresholds);

        discharge::refresh(&mut self.battery, &mut self.regulator, &mut self.board);

        if self.power.is_active() {
            self.regulator
                .refresh(&self.readings, self.battery, &self.thresholds, &mut self.board);
        }

        self.indicator.refresh(
            &self.readings,
            self.battery,
            self.regulator.any_bleeding(),
            &self.thresholds,
            &mut self.board,
        );

        let panel = self.readings.panel();
        let low_panel = self.thresholds.low_panel;

        if self.power.consider_sleep(panel, low_panel, self.battery) == PowerDecision::Sleep {
            #[cfg(feature = "debug-mode")]
            defmt::info!("No panel and battery empty, going to sleep");

            return PowerDecision::Sleep;
        }

        let was_active = self.power.is_active();
        let decision = self.power.consider_snooze(panel, low_panel, &mut self.board);
        if was_active && !self.power.is_active() {
            self.regulator.force_ceiling(&mut self.board);
        }
        decision
    }

    /// Boots and runs the loop until the unit goes to sleep.
    pub fn run(mut self) -> ! {
        if self.boot() == PowerDecision::Continue {
            while self.step() == PowerDecision::Continue {}
        }
        self.sleep()
    }

    /// Shuts the board down and halts until the watchdog fires.
    pub fn sleep(&mut self) -> ! {
        self.board.shutdown();
        self.board.feed();
        self.board.halt()
    }

    /// Hands back the board and the store, dropping all RAM state.
    pub fn release(self) -> (B, S) {
        (self.board, self.store)
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn battery(&self) -> BatteryState {
        self.battery
    }

    pub fn regulator(&self) -> &ChargeRegulator {
        &self.regulator
    }

    pub fn power_mode(&self) -> PowerMode {
        self.power.mode()
    }

    pub fn indicator(&self) -> IndicatorState {
        self.indicator.state()
    }
}
