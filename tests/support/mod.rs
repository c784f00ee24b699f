//! Bench rig for the scenario tests: a board driven from plain fields and a
//! RAM copy of the three storage pages with factory trims programmed.

#![allow(dead_code)]

use battery_block::board::{AnalogFrontEnd, Channel, Clocks, Colour, FlashPattern, Gate, Indicator, PowerStage};
use battery_block::config::{MAX_DUTY, Tuning};
use battery_block::store::{NorFlashStore, StorageKey};
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::watchdog::Watchdog;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

pub const TUNING: Tuning = Tuning {
    max_duty: MAX_DUTY,
    max_snooze_cycles: 50,
    temp_log_interval: 0,
    baseline_loops: 200,
    charge_test_loops: 100,
};

pub const PAGE: usize = 128;
const WORD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Gate(Gate),
    Duty(u16),
    Colour(Colour),
    Flash(FlashPattern),
    Bleed(usize, bool),
    InitMinimal,
    InitFull,
    Snooze,
    Wake,
    Shutdown,
}

/// Cells, panel and fuse as the ADC would see them. Records every output
/// change.
#[derive(Debug, Clone)]
pub struct BenchBoard {
    pub cells: [u16; 4],
    pub panel: u16,
    pub fuse: u16,
    pub temperature: u16,
    pub gate: Gate,
    pub duty: u16,
    pub colour: Colour,
    pub actions: Vec<Action>,
    pub feeds: u64,
}

impl BenchBoard {
    /// Healthy cells in sunshine with an intact fuse.
    pub fn sunny(cells: [u16; 4]) -> Self {
        Self {
            cells,
            panel: 500,
            fuse: 470,
            temperature: 600,
            gate: Gate::Closed,
            duty: 0,
            colour: Colour::Off,
            actions: Vec::new(),
            feeds: 0,
        }
    }

    pub fn count(&self, wanted: impl Fn(&Action) -> bool) -> usize {
        self.actions.iter().filter(|action| wanted(action)).count()
    }

    fn record(&mut self, action: Action) {
        self.actions.push(action);
    }
}

impl AnalogFrontEnd for BenchBoard {
    fn sample(&mut self, channel: Channel) -> u16 {
        match channel {
            Channel::Cell1 => self.cells[0],
            Channel::Cell2 => self.cells[..2].iter().sum(),
            Channel::Cell3 => self.cells[..3].iter().sum(),
            Channel::Cell4 => self.cells.iter().sum(),
            Channel::Panel => self.panel,
            Channel::Fuse => self.fuse,
            Channel::Temperature => self.temperature,
        }
    }
}

impl Indicator for BenchBoard {
    fn set_colour(&mut self, colour: Colour) {
        if colour != self.colour {
            self.colour = colour;
            self.record(Action::Colour(colour));
        }
    }

    fn flash(&mut self, pattern: &FlashPattern) {
        self.feeds += u64::from(pattern.repeats);
        self.colour = pattern.off;
        self.record(Action::Flash(*pattern));
    }
}

impl PowerStage for BenchBoard {
    fn set_gate(&mut self, gate: Gate) {
        if gate != self.gate {
            self.gate = gate;
            self.record(Action::Gate(gate));
        }
    }

    fn set_bleed(&mut self, cell: usize, on: bool) {
        self.record(Action::Bleed(cell, on));
    }

    fn set_duty(&mut self, duty: u16) {
        if duty != self.duty {
            self.duty = duty;
            self.record(Action::Duty(duty));
        }
    }

    fn enable_regulator(&mut self, _enabled: bool) {}
}

impl Clocks for BenchBoard {
    fn init_minimal(&mut self) {
        self.record(Action::InitMinimal);
    }

    fn init_full(&mut self) {
        self.record(Action::InitFull);
    }

    fn snooze(&mut self) {
        self.record(Action::Snooze);
    }

    fn wake(&mut self) {
        self.record(Action::Wake);
    }

    fn shutdown(&mut self) {
        self.record(Action::Shutdown);
    }

    fn halt(&mut self) -> ! {
        panic!("halted");
    }
}

impl Watchdog for BenchBoard {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

impl DelayUs<u32> for BenchBoard {
    fn delay_us(&mut self, _us: u32) {}
}

/// The storage pages of the MCU flash, word-programmed, page-erased.
#[derive(Debug, Clone)]
pub struct BenchFlash {
    pub bytes: Vec<u8>,
    /// Fails the next program operation, as if power dropped after the erase
    pub lose_next_write: bool,
}

impl BenchFlash {
    /// Fresh from the factory: unity ADC trims, nothing else written.
    pub fn factory() -> Self {
        let mut flash = Self {
            bytes: vec![0xFF; PAGE * 3],
            lose_next_write: false,
        };
        flash.program(StorageKey::TrimReference, 32768);
        flash.program(StorageKey::TrimGain, 32768);
        flash.program(StorageKey::TrimOffset, 0);
        flash
    }

    /// A unit that has already passed its self-test.
    pub fn tested() -> Self {
        let mut flash = Self::factory();
        flash.program(StorageKey::TestResult, 0);
        flash
    }

    pub fn program(&mut self, key: StorageKey, value: u16) {
        let at = Self::offset(key);
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn word(&self, key: StorageKey) -> u16 {
        let at = Self::offset(key);
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    fn offset(key: StorageKey) -> usize {
        key.page() as usize * PAGE + key.slot() as usize * WORD
    }
}

impl ErrorType for BenchFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for BenchFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let source = self
            .bytes
            .get(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        bytes.copy_from_slice(source);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl NorFlash for BenchFlash {
    const WRITE_SIZE: usize = WORD;
    const ERASE_SIZE: usize = PAGE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.bytes
            .get_mut(from as usize..to as usize)
            .ok_or(NorFlashErrorKind::OutOfBounds)?
            .fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if std::mem::take(&mut self.lose_next_write) {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        let target = self
            .bytes
            .get_mut(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        for (cell, byte) in target.iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

pub type BenchStore = NorFlashStore<BenchFlash>;

pub fn store(flash: BenchFlash) -> BenchStore {
    NorFlashStore::new(flash, 0)
}
