//! Typed durable storage on NOR flash.
//!
//! The firmware persists very little: the self-test result, the highest
//! temperature seen, and a handful of read-only factory trims. Each value is
//! a single 16-bit word addressed by [`StorageKey`].
//!
//! # Flash layout
//!
//! ```text
//! base + 0 * page   TestResult       (own page)
//! base + 1 * page   MaxTemperature   (own page)
//! base + 2 * page   factory trims    (one record per key, never written)
//! ```
//!
//! Rewriting a word means erasing its page first. Giving each writable key a
//! page of its own keeps one key's erase from wiping another; a reset between
//! the erase and the write leaves that key reading `0xFFFF`.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

/// Value of a word that has been erased and never written.
pub const ERASED_WORD: u16 = 0xFFFF;

/// Largest record the store handles. Covers every STM32 flash write size up
/// to double words.
const MAX_RECORD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum StorageKey {
    /// Outcome of the factory self-test
    TestResult,
    /// Highest filtered temperature code seen
    MaxTemperature,
    /// ADC reference trim, 32768 is unity
    TrimReference,
    /// ADC gain trim, 32768 is unity
    TrimGain,
    /// ADC offset trim in codes, signed
    TrimOffset,
    /// Temperature sensor code at the low calibration point
    TempCalLow,
    /// Temperature sensor code at the high calibration point
    TempCalHigh,
}

impl StorageKey {
    pub const fn is_writable(self) -> bool {
        matches!(self, StorageKey::TestResult | StorageKey::MaxTemperature)
    }

    /// Erase page holding the key, counted from the store base.
    pub const fn page(self) -> u32 {
        match self {
            StorageKey::TestResult => 0,
            StorageKey::MaxTemperature => 1,
            _ => 2,
        }
    }

    /// Record index inside the key's page.
    pub const fn slot(self) -> u32 {
        match self {
            StorageKey::TestResult | StorageKey::MaxTemperature | StorageKey::TrimReference => 0,
            StorageKey::TrimGain => 1,
            StorageKey::TrimOffset => 2,
            StorageKey::TempCalLow => 3,
            StorageKey::TempCalHigh => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Factory trims cannot be rewritten in the field
    ReadOnly(StorageKey),
    /// The flash write granularity is larger than a record
    Unaligned,
    /// The flash driver failed
    Flash(NorFlashErrorKind),
}

#[cfg(feature = "debug-mode")]
impl defmt::Format for StoreError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            StoreError::ReadOnly(key) => defmt::write!(f, "ReadOnly({})", key),
            StoreError::Unaligned => defmt::write!(f, "Unaligned"),
            StoreError::Flash(NorFlashErrorKind::NotAligned) => defmt::write!(f, "Flash(NotAligned)"),
            StoreError::Flash(NorFlashErrorKind::OutOfBounds) => defmt::write!(f, "Flash(OutOfBounds)"),
            StoreError::Flash(_) => defmt::write!(f, "Flash(Other)"),
        }
    }
}

fn flash_error<E: NorFlashError>(error: E) -> StoreError {
    StoreError::Flash(error.kind())
}

/// Word-addressed persistent storage.
pub trait DurableStore {
    /// Reads a key. Failures read as [`ERASED_WORD`].
    fn read(&mut self, key: StorageKey) -> u16;

    fn write(&mut self, key: StorageKey, value: u16) -> Result<(), StoreError>;
}

/// Stored outcome of the factory self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub enum TestResult {
    Passed,
    /// Open-circuit panel voltage out of range
    PanelFault,
    /// A cell outside the usable window
    CellFault,
    /// Battery did not rise while charging
    ChargeFault,
    /// Too much drop across the discharge fuse
    DischargeFault,
    /// Erased or unrecognised
    NotRun,
}

impl TestResult {
    pub fn from_word(word: u16) -> Self {
        match word {
            0 => TestResult::Passed,
            3 => TestResult::PanelFault,
            4 => TestResult::CellFault,
            5 => TestResult::ChargeFault,
            7 => TestResult::DischargeFault,
            _ => TestResult::NotRun,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            TestResult::Passed => 0,
            TestResult::PanelFault => 3,
            TestResult::CellFault => 4,
            TestResult::ChargeFault => 5,
            TestResult::DischargeFault => 7,
            TestResult::NotRun => ERASED_WORD,
        }
    }
}

/// [`DurableStore`] on top of any `embedded-storage` NOR flash.
pub struct NorFlashStore<F> {
    flash: F,
    base: u32,
}

impl<F: NorFlash> NorFlashStore<F> {
    /// Uses three erase pages of `flash` starting at `base`, which must be
    /// page aligned.
    pub fn new(flash: F, base: u32) -> Self {
        Self { flash, base }
    }

    pub fn release(self) -> F {
        self.flash
    }

    /// Bytes per stored word: one write unit, at least two bytes.
    fn record_len() -> usize {
        F::WRITE_SIZE.max(F::READ_SIZE).max(2)
    }

    fn page_offset(&self, key: StorageKey) -> u32 {
        self.base + key.page() * F::ERASE_SIZE as u32
    }

    fn offset(&self, key: StorageKey) -> u32 {
        self.page_offset(key) + key.slot() * Self::record_len() as u32
    }

    fn try_read(&mut self, key: StorageKey) -> Result<u16, StoreError> {
        let len = Self::record_len();
        if len > MAX_RECORD {
            return Err(StoreError::Unaligned);
        }
        let mut record = [0u8; MAX_RECORD];
        self.flash
            .read(self.offset(key), &mut record[..len])
            .map_err(flash_error)?;
        Ok(u16::from_le_bytes([record[0], record[1]]))
    }
}

impl<F: NorFlash> DurableStore for NorFlashStore<F> {
    fn read(&mut self, key: StorageKey) -> u16 {
        self.try_read(key).unwrap_or(ERASED_WORD)
    }

    fn write(&mut self, key: StorageKey, value: u16) -> Result<(), StoreError> {
        if !key.is_writable() {
            return Err(StoreError::ReadOnly(key));
        }
        let len = Self::record_len();
        if len > MAX_RECORD {
            return Err(StoreError::Unaligned);
        }
        if self.try_read(key)? == value {
            return Ok(());
        }

        let page = self.page_offset(key);
        self.flash
            .erase(page, page + F::ERASE_SIZE as u32)
            .map_err(flash_error)?;

        let mut record = [0xFFu8; MAX_RECORD];
        record[..2].copy_from_slice(&value.to_le_bytes());
        self.flash
            .write(self.offset(key), &record[..len])
            .map_err(flash_error)?;
        Ok(())
    }
}

/// Factory calibration words the STM32L0 keeps in system memory, with the
/// VREFINT reading taken at start-up.
///
/// All three words are 12-bit codes taken at VDDA = 3.0 V. The board samples
/// at 10 bits against the live VDDA, so the words are rescaled through the
/// VREFINT reading before they stand in for the trim keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-mode", derive(defmt::Format))]
pub struct SystemCalibration {
    /// VREFINT_CAL
    pub vrefint_cal: u16,
    /// TS_CAL1, sensor code at 30 degC
    pub ts_cal1: u16,
    /// TS_CAL2, sensor code at 130 degC
    pub ts_cal2: u16,
    /// Averaged 10-bit VREFINT sample
    pub vrefint_code: u16,
}

impl SystemCalibration {
    /// Trim reference factor: 32768 when VDDA is exactly 3.0 V, larger when
    /// VDDA is lower and every code reads high.
    pub fn reference_factor(&self) -> u16 {
        let measured = u32::from(self.vrefint_code) * 4;
        (32768 * u32::from(self.vrefint_cal))
            .checked_div(measured)
            .map_or(32768, |factor| factor.min(u32::from(u16::MAX)) as u16)
    }

    /// A 12-bit 3.0 V temperature code as this board's 10-bit reading.
    fn scale_temperature(&self, ts_cal: u16) -> u16 {
        (u32::from(ts_cal) * u32::from(self.vrefint_code))
            .checked_div(u32::from(self.vrefint_cal))
            .map_or(ERASED_WORD, |code| code.min(u32::from(u16::MAX)) as u16)
    }

    /// Value of a trim key, `None` for keys kept in durable storage.
    pub fn word(&self, key: StorageKey) -> Option<u16> {
        match key {
            StorageKey::TrimReference => Some(self.reference_factor()),
            // the ADC self-calibrates gain and offset when it is enabled
            StorageKey::TrimGain => Some(32768),
            StorageKey::TrimOffset => Some(0),
            StorageKey::TempCalLow => Some(self.scale_temperature(self.ts_cal1)),
            StorageKey::TempCalHigh => Some(self.scale_temperature(self.ts_cal2)),
            StorageKey::TestResult | StorageKey::MaxTemperature => None,
        }
    }
}

/// Serves the read-only trim keys from [`SystemCalibration`] and everything
/// else from `store`.
pub struct FactoryTrimStore<S> {
    store: S,
    calibration: SystemCalibration,
}

impl<S: DurableStore> FactoryTrimStore<S> {
    pub fn new(store: S, calibration: SystemCalibration) -> Self {
        #[cfg(feature = "debug-mode")]
        defmt::info!("Factory calibration: {}", calibration);

        Self { store, calibration }
    }

    pub fn release(self) -> S {
        self.store
    }
}

impl<S: DurableStore> DurableStore for FactoryTrimStore<S> {
    fn read(&mut self, key: StorageKey) -> u16 {
        match self.calibration.word(key) {
            Some(word) => word,
            None => self.store.read(key),
        }
    }

    fn write(&mut self, key: StorageKey, value: u16) -> Result<(), StoreError> {
        if self.calibration.word(key).is_some() {
            return Err(StoreError::ReadOnly(key));
        }
        self.store.write(key, value)
    }
}
