//! Charge regulation and cell balancing.
//!
//! The regulator is a shunt element driven by PWM. A higher duty cycle pulls
//! the charging voltage down, so "throttle" means one step up. Regulation
//! moves the duty by at most one step per cycle and never leaves
//! `0..=ceiling`. Two events jump straight to the ceiling through
//! [`ChargeRegulator::force_ceiling`]: short-circuit containment and snooze
//! entry.
//!
//! Balancing switches a bleed resistor across any cell that reaches
//! `max_cell` while the panel is delivering power, and releases it once the
//! cell has dropped below `min_bleed`, the panel has gone, or the battery is
//! full.

use crate::battery::BatteryState;
use crate::board::{CELL_COUNT, PowerStage};
use crate::calibration::Thresholds;
use crate::readings::Readings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRegulator {
    duty: u16,
    ceiling: u16,
    bleeding: [bool; CELL_COUNT],
}

impl ChargeRegulator {
    /// Starts at the ceiling: charging voltage at its minimum.
    pub fn new(ceiling: u16) -> Self {
        Self {
            duty: ceiling,
            ceiling,
            bleeding: [false; CELL_COUNT],
        }
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }

    pub fn bleeding(&self) -> &[bool; CELL_COUNT] {
        &self.bleeding
    }

    pub fn any_bleeding(&self) -> bool {
        self.bleeding.iter().any(|&on| on)
    }

    /// One regulation cycle: duty step, then balancing.
    pub fn refresh(
        &mut self,
        readings: &Readings,
        battery: BatteryState,
        thresholds: &Thresholds,
        stage: &mut impl PowerStage,
    ) {
        self.step_duty(readings, battery, thresholds);
        stage.set_duty(self.duty);
        self.balance(readings, battery, thresholds, stage);
    }

    fn step_duty(&mut self, readings: &Readings, battery: BatteryState, thresholds: &Thresholds) {
        let throttle = readings.max_cell_voltage() >= thresholds.max_cell
            || readings.panel() < thresholds.panel_mpp
            || battery == BatteryState::Full;

        self.duty = if throttle {
            self.duty.saturating_add(1).min(self.ceiling)
        } else {
            self.duty.saturating_sub(1)
        };
    }

    fn balance(
        &mut self,
        readings: &Readings,
        battery: BatteryState,
        thresholds: &Thresholds,
        stage: &mut impl PowerStage,
    ) {
        let panel_present = readings.panel() >= thresholds.low_panel;

        for (cell, on) in self.bleeding.iter_mut().enumerate() {
            let voltage = readings.cell(cell);

            if !*on && voltage >= thresholds.max_cell && panel_present {
                *on = true;
                stage.set_bleed(cell, true);
            }

            if *on && (voltage < thresholds.min_bleed || !panel_present || battery == BatteryState::Full) {
                *on = false;
                stage.set_bleed(cell, false);
            }
        }
    }

    /// Pins the duty at the ceiling: stops charging without touching bleeds.
    pub fn force_ceiling(&mut self, stage: &mut impl PowerStage) {
        self.duty = self.ceiling;
        stage.set_duty(self.duty);
    }
}
