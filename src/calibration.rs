//! Factory trim correction of nominal thresholds.
//!
//! Rather than correcting every sample, the thresholds are moved into the
//! device's own ADC domain once per boot:
//!
//! ```text
//! coefficient = (REF / reference_factor) * (REF / gain_factor)
//! calibrated  = round((nominal - offset) * coefficient)
//! ```
//!
//! Unprogrammed trims (all ones) are not detected and yield meaningless
//! thresholds.

use crate::store::{DurableStore, StorageKey};

/// Unity value of the trim factors.
pub const REFERENCE: f32 = 32768.0;

/// Raw factory trim words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub struct TrimConstants {
    pub reference_factor: u16,
    pub gain_factor: u16,
    pub offset: i16,
}

impl TrimConstants {
    pub fn load(store: &mut impl DurableStore) -> Self {
        Self {
            reference_factor: store.read(StorageKey::TrimReference),
            gain_factor: store.read(StorageKey::TrimGain),
            offset: store.read(StorageKey::TrimOffset) as i16,
        }
    }
}

/// Linear correction derived from the trims. Computed once per boot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    coefficient: f32,
    offset: i16,
}

impl Calibration {
    pub fn from_trim(trim: &TrimConstants) -> Self {
        let reference = REFERENCE / f32::from(trim.reference_factor);
        let gain = REFERENCE / f32::from(trim.gain_factor);
        Self {
            coefficient: reference * gain,
            offset: trim.offset,
        }
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    /// Corrects one nominal code, rounding half up.
    pub fn apply(&self, nominal: u16) -> u16 {
        let shifted = f32::from(nominal) - f32::from(self.offset);
        // `as` saturates, so a negative result clamps to zero
        (shifted * self.coefficient + 0.5) as u16
    }
}

/// Threshold set in ADC codes. Used both for the nominal design values and
/// for the calibrated copy every comparison uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub struct Thresholds {
    /// Panel maximum power point.
    pub panel_mpp: u16,
    pub low_panel: u16,
    pub max_cell: u16,
    pub min_cell: u16,
    pub min_fuse: u16,
    pub min_bleed: u16,
    pub stop_charge: u16,
    pub restart_charge: u16,
    pub restart_discharge: u16,
    pub led_thresh1: u16,
    pub led_thresh2: u16,
    pub led_hysteresis: u16,
}

impl Thresholds {
    pub fn calibrated(&self, calibration: &Calibration) -> Self {
        let c = |nominal| calibration.apply(nominal);
        Self {
            panel_mpp: c(self.panel_mpp),
            low_panel: c(self.low_panel),
            max_cell: c(self.max_cell),
            min_cell: c(self.min_cell),
            min_fuse: c(self.min_fuse),
            min_bleed: c(self.min_bleed),
            stop_charge: c(self.stop_charge),
            restart_charge: c(self.restart_charge),
            restart_discharge: c(self.restart_discharge),
            led_thresh1: c(self.led_thresh1),
            led_thresh2: c(self.led_thresh2),
            led_hysteresis: c(self.led_hysteresis),
        }
    }
}
