//! Compile-time knobs for the battery block firmware.
//! Edit these constants and rebuild.
//!
//! Voltages are 10-bit ADC codes behind the board's dividers, before
//! calibration. Cell codes use the 1:2 cell divider, panel and fuse codes the
//! 35.2:2.2 panel divider, both against the 2.5 V reference.

use crate::calibration::Thresholds;

/// Nominal thresholds as designed. Calibrated once per boot.
pub const NOMINAL: Thresholds = Thresholds {
    // 17.5 V: panel maximum power point after the diode drop
    panel_mpp: 442,
    // 10 V: panel turn-on/turn-off and minimum for bleeding
    low_panel: 256,
    // 3.65 V: cell voltage where throttling starts
    max_cell: 136,
    // 2.70 V: cell voltage where discharge stops
    min_cell: 104,
    // 5.0 V after the fuse: anything lower is a short
    min_fuse: 186,
    // 3.50 V: bleeding never takes a cell below this
    min_bleed: 130,
    // 3.50 V: all cells above this means full
    stop_charge: 130,
    // 3.35 V: lowest cell below this restarts charging
    restart_charge: 123,
    // 3.05 V: lowest cell above this restarts discharging
    restart_discharge: 113,
    // 3.35 V: green/yellow boundary
    led_thresh1: 123,
    // 3.15 V: yellow/red boundary
    led_thresh2: 115,
    // 0.15 V: extra margin on the way up
    led_hysteresis: 7,
};

/// Top value of the PWM counter.
pub const PWM_PERIOD: u16 = 0xFFFF;

/// Start-up duty and the highest value the regulator may reach. Pulls the
/// charging voltage to its minimum, which also speeds up initial settling.
pub const MAX_DUTY: u16 = 0x6E14;

/// One blink unit, in milliseconds.
pub const BLINK_UNIT_MS: u64 = 125;

/// Toggles in the short-circuit and low-battery flash sequences.
pub const STANDARD_BLINK_COUNT: u16 = 30;

/// Blink units per toggle when a short circuit is contained.
pub const SHORT_CIRCUIT_BLINK_UNITS: u64 = 2;

/// Blink units per toggle when the battery runs empty.
pub const LOW_BATTERY_BLINK_UNITS: u64 = 1;

/// Cycles without charge before snoozing turns into sleep (about 48 hours).
pub const MAX_SNOOZE_CYCLES: u32 = 2_928_814;

/// Watchdog timeout. Every code path feeds more often than this.
pub const WATCHDOG_TIMEOUT_US: u32 = 11_000_000;

/// Cycles between temperature log updates.
pub const TEMP_LOG_INTERVAL: u16 = 0xFFFF;

/// Die temperature that forces a thermal shutdown, in degrees Celsius.
pub const SHUTDOWN_TEMP_C: f32 = 75.0;

/// Temperatures at which the factory temperature calibration words were taken.
pub const TEMP_CAL_LOW_C: f32 = 30.0;
pub const TEMP_CAL_HIGH_C: f32 = 130.0;

/// Blink units per toggle and toggles during a thermal shutdown.
pub const THERMAL_BLINK_UNITS: u64 = 8;
pub const THERMAL_BLINK_COUNT: u16 = 150;

/// Samples per channel when acquiring self-test baselines.
pub const BASELINE_LOOPS: u32 = 20_000;

/// Acquisition and regulation rounds in the self-test charge phase.
pub const CHARGE_TEST_LOOPS: u32 = 40_000;

/// Settling delay between discharge-phase samples.
pub const DISCHARGE_SETTLE_US: u32 = 250;

/// Expected open-circuit panel code (20 V) and the allowed deviation.
pub const PV_OPEN_CIRCUIT: u16 = 524;
pub const PV_TOLERANCE: u16 = 38;

/// Minimum rise of the battery code during the self-test charge phase.
pub const TEST_CHARGE_MARGIN: u16 = 1;

/// Maximum drop across the fuse while discharging in the self-test.
pub const MAX_FUSE_DROP: u16 = 20;

/// Blink units per toggle for test results, and toggle counts.
pub const TEST_BLINK_UNITS: u64 = 8;
pub const TEST_FAIL_BLINK_COUNT: u16 = 15;
pub const TEST_SUCCESS_BLINK_COUNT: u16 = 300;

/// Runtime tunables. `Default` is what the firmware ships with; tests
/// shrink the long counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub max_duty: u16,
    pub max_snooze_cycles: u32,
    pub temp_log_interval: u16,
    pub baseline_loops: u32,
    pub charge_test_loops: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_duty: MAX_DUTY,
            max_snooze_cycles: MAX_SNOOZE_CYCLES,
            temp_log_interval: TEMP_LOG_INTERVAL,
            baseline_loops: BASELINE_LOOPS,
            charge_test_loops: CHARGE_TEST_LOOPS,
        }
    }
}
