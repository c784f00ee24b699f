//! Simulated board, RAM store and RAM flash for the unit tests.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::watchdog::Watchdog;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::board::{
    AnalogFrontEnd, CELL_COUNT, Channel, Clocks, Colour, FlashPattern, Gate, Indicator, PowerStage,
};
use crate::readings::Readings;
use crate::store::{DurableStore, ERASED_WORD, StorageKey, StoreError};

/// Something the control core asked the board to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Gate(Gate),
    Duty(u16),
    Bleed(usize, bool),
    Colour(Colour),
    Flash(FlashPattern),
    Regulator(bool),
    Snooze,
    Wake,
    InitMinimal,
    InitFull,
    Shutdown,
}

/// Board whose analog inputs are plain fields.
///
/// Output changes are recorded in `events`, but only when they change
/// something, so a loop that keeps the gate open does not flood the log.
#[derive(Debug, Clone)]
pub struct SimBoard {
    pub cells: [u16; CELL_COUNT],
    /// Overrides the tap voltages derived from `cells`
    pub taps: Option<[u16; CELL_COUNT]>,
    pub panel: u16,
    pub fuse: u16,
    pub temperature: u16,
    pub events: Vec<Event>,
    pub colour: Colour,
    pub gate: Gate,
    pub bleeds: [bool; CELL_COUNT],
    pub duty: u16,
    pub regulator: bool,
    pub snoozing: bool,
    pub feeds: u32,
    pub delays_us: u64,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self {
            cells: [120; CELL_COUNT],
            taps: None,
            panel: 0,
            fuse: 0,
            temperature: 0,
            events: Vec::new(),
            colour: Colour::Off,
            gate: Gate::Closed,
            bleeds: [false; CELL_COUNT],
            duty: 0,
            regulator: false,
            snoozing: false,
            feeds: 0,
            delays_us: 0,
        }
    }
}

impl SimBoard {
    pub fn with_cells(cells: [u16; CELL_COUNT]) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    fn tap(&self, index: usize) -> u16 {
        match self.taps {
            Some(taps) => taps[index],
            None => self.cells[..=index].iter().sum(),
        }
    }

    pub fn flashes(&self) -> Vec<FlashPattern> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Flash(pattern) => Some(*pattern),
                _ => None,
            })
            .collect()
    }
}

impl AnalogFrontEnd for SimBoard {
    fn sample(&mut self, channel: Channel) -> u16 {
        match channel {
            Channel::Cell1 | Channel::Cell2 | Channel::Cell3 | Channel::Cell4 => self.tap(channel.index()),
            Channel::Panel => self.panel,
            Channel::Fuse => self.fuse,
            Channel::Temperature => self.temperature,
        }
    }
}

impl Indicator for SimBoard {
    fn set_colour(&mut self, colour: Colour) {
        if self.colour != colour {
            self.colour = colour;
            self.events.push(Event::Colour(colour));
        }
    }

    fn flash(&mut self, pattern: &FlashPattern) {
        self.events.push(Event::Flash(*pattern));
        self.feeds += u32::from(pattern.repeats) * 2;
        self.colour = pattern.off;
    }
}

impl PowerStage for SimBoard {
    fn set_gate(&mut self, gate: Gate) {
        if self.gate != gate {
            self.gate = gate;
            self.events.push(Event::Gate(gate));
        }
    }

    fn set_bleed(&mut self, cell: usize, on: bool) {
        if self.bleeds[cell] != on {
            self.bleeds[cell] = on;
            self.events.push(Event::Bleed(cell, on));
        }
    }

    fn set_duty(&mut self, duty: u16) {
        if self.duty != duty {
            self.duty = duty;
            self.events.push(Event::Duty(duty));
        }
    }

    fn enable_regulator(&mut self, enabled: bool) {
        if self.regulator != enabled {
            self.regulator = enabled;
            self.events.push(Event::Regulator(enabled));
        }
    }
}

impl Clocks for SimBoard {
    fn init_minimal(&mut self) {
        self.events.push(Event::InitMinimal);
    }

    fn init_full(&mut self) {
        self.regulator = true;
        self.events.push(Event::InitFull);
    }

    fn snooze(&mut self) {
        self.snoozing = true;
        self.regulator = false;
        self.events.push(Event::Snooze);
    }

    fn wake(&mut self) {
        self.snoozing = false;
        self.regulator = true;
        self.events.push(Event::Wake);
    }

    fn shutdown(&mut self) {
        self.events.push(Event::Shutdown);
    }

    fn halt(&mut self) -> ! {
        panic!("halted");
    }
}

impl Watchdog for SimBoard {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

impl DelayUs<u32> for SimBoard {
    fn delay_us(&mut self, us: u32) {
        self.delays_us += u64::from(us);
    }
}

/// Filtered readings that have converged on `cells` with a healthy panel.
pub fn settled_readings(cells: [u16; CELL_COUNT], fuse: u16) -> Readings {
    settle(SimBoard {
        fuse,
        panel: 500,
        ..SimBoard::with_cells(cells)
    })
}

/// Converged readings with the fuse intact and the given panel voltage.
pub fn settled_readings_with_panel(cells: [u16; CELL_COUNT], panel: u16) -> Readings {
    settle(SimBoard {
        fuse: 470,
        panel,
        ..SimBoard::with_cells(cells)
    })
}

fn settle(mut board: SimBoard) -> Readings {
    let mut readings = Readings::seeded(0);
    for _ in 0..2_000 {
        readings.refresh(&mut board);
    }
    readings
}

/// Key/value store backed by a map, for code that only needs the trait.
#[derive(Debug, Clone, Default)]
pub struct RamStore {
    pub words: std::collections::HashMap<StorageKey, u16>,
    pub writes: Vec<(StorageKey, u16)>,
}

impl RamStore {
    pub fn erased() -> Self {
        Self::default()
    }

    /// Store holding the given ADC trims.
    pub fn with_trims(reference: u16, gain: u16, offset: i16) -> Self {
        let mut store = Self::erased();
        store.words.insert(StorageKey::TrimReference, reference);
        store.words.insert(StorageKey::TrimGain, gain);
        store.words.insert(StorageKey::TrimOffset, offset as u16);
        store
    }

    /// Store holding unity ADC trims.
    pub fn unity() -> Self {
        Self::with_trims(32768, 32768, 0)
    }

    pub fn set(&mut self, key: StorageKey, value: u16) {
        self.words.insert(key, value);
    }
}

impl DurableStore for RamStore {
    fn read(&mut self, key: StorageKey) -> u16 {
        self.words.get(&key).copied().unwrap_or(ERASED_WORD)
    }

    fn write(&mut self, key: StorageKey, value: u16) -> Result<(), StoreError> {
        if !key.is_writable() {
            return Err(StoreError::ReadOnly(key));
        }
        self.words.insert(key, value);
        self.writes.push((key, value));
        Ok(())
    }
}

/// Injected flash misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFlashFault {
    /// The next write is lost as if power failed right after the erase
    LoseNextWrite,
    FailReads,
}

const FLASH_PAGE: usize = 128;

/// Three pages of NOR flash with STM32L0 geometry.
#[derive(Debug, Clone)]
pub struct RamFlash {
    pub bytes: [u8; FLASH_PAGE * 3],
    pub fault: Option<RamFlashFault>,
    pub erases: u32,
}

impl RamFlash {
    pub const PAGE: usize = FLASH_PAGE;

    pub fn erased() -> Self {
        Self {
            bytes: [0xFF; FLASH_PAGE * 3],
            fault: None,
            erases: 0,
        }
    }

    /// Factory programming: writes bytes without any checks.
    pub fn program(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, NorFlashErrorKind> {
        let start = offset as usize;
        let end = start + len;
        if end > self.bytes.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if self.fault == Some(RamFlashFault::FailReads) {
            return Err(NorFlashErrorKind::Other);
        }
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = FLASH_PAGE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let range = self.range(from, (to - from) as usize)?;
        self.bytes[range].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fault == Some(RamFlashFault::LoseNextWrite) {
            self.fault = None;
            return Err(NorFlashErrorKind::Other);
        }
        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let range = self.range(offset, bytes.len())?;
        for (cell, byte) in self.bytes[range].iter_mut().zip(bytes) {
            // programming can only clear bits
            *cell &= *byte;
        }
        Ok(())
    }
}
