//! Hardware abstraction and peripheral initialization.
//!
//! This module defines the pin mappings of the battery block PCB and
//! implements the control core's board traits on the STM32L031 peripherals.
//!
//! # Pin Assignments
//!
//! ## Analog inputs (ADC, 10-bit, VDDA reference)
//! - **PA0**: IN0 - Cell 1 tap
//! - **PA1**: IN1 - Cell 2 tap (cells 1 and 2)
//! - **PA2**: IN2 - Cell 3 tap (cells 1 to 3)
//! - **PA3**: IN3 - Cell 4 tap (whole battery)
//! - **PA4**: IN4 - Panel voltage after the blocking diode
//! - **PA5**: IN5 - Output voltage after the discharge fuse
//! - Internal: IN18 - Die temperature sensor
//!
//! ## Charge and discharge
//! - **PA15**: TIM2_CH1 - Shunt regulator PWM (high = no charging)
//! - **PA8**: GATE - Discharge MOSFET gate (high = open)
//! - **PB5**: BLEED1_N - Cell 1 bleed resistor, active-low
//! - **PB6**: BLEED2 - Cell 2 bleed resistor
//! - **PB7**: BLEED3 - Cell 3 bleed resistor
//! - **PA9**: BLEED4 - Cell 4 bleed resistor
//!
//! ## Indicator
//! - **PB3**: LED_RED
//! - **PB4**: LED_GREEN (both on shows yellow)
//!
//! ## Debug (SWD)
//! - **PA13**: SWDIO
//! - **PA14**: SWCLK

use battery_block::board::{AnalogFrontEnd, Channel, Clocks, Colour, FlashPattern, Gate, Indicator, PowerStage};
use battery_block::config::{PWM_PERIOD, WATCHDOG_TIMEOUT_US};
use battery_block::store::{FactoryTrimStore, NorFlashStore, SystemCalibration};
use cortex_m::asm;
use embassy_futures::block_on;
use embassy_stm32::adc::{self, Adc, AdcChannel, AnyAdcChannel, Resolution, SampleTime};
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{Level, Output, OutputType, Speed};
use embassy_stm32::peripherals::{ADC1, TIM2};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, pac};
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::watchdog::Watchdog;

bind_interrupts!(struct Irqs {
    ADC1_COMP => adc::InterruptHandler<ADC1>;
});

/// Flash offset of the first storage page: the last three 128-byte pages of
/// the 32 KiB array. The third (trim) page stays unused on this MCU.
pub const STORE_BASE: u32 = 0x8000 - 3 * 128;

/// Factory calibration words in system memory.
const VREFINT_CAL: *const u16 = 0x1FF8_0078 as *const u16;
const TS_CAL1: *const u16 = 0x1FF8_007A as *const u16;
const TS_CAL2: *const u16 = 0x1FF8_007E as *const u16;

/// VREFINT samples averaged for the reference trim.
const VREFINT_SAMPLES: u32 = 16;

/// Test result and temperature log on the internal flash, trims from the
/// factory calibration words.
pub type FlashStore = FactoryTrimStore<NorFlashStore<Flash<'static, Blocking>>>;

/// MSI frequency while active (range 5).
const ACTIVE_HZ: u32 = 2_097_152;

/// MSI frequency while snoozing (range 0).
const SNOOZE_HZ: u32 = 65_536;

/// PWM frequency giving a counter period close to `PWM_PERIOD` at `ACTIVE_HZ`.
const PWM_HZ: u32 = 32;

/// Top-level peripheral container for the battery block.
pub struct Peripherals {
    /// Everything the control loop drives
    pub board: BoardIo,
    /// Test result, temperature log and factory trims
    pub store: FlashStore,
}

impl Peripherals {
    /// Initializes all peripherals from the STM32 peripheral singleton.
    ///
    /// # Initial GPIO States
    ///
    /// - PA8 (GATE): Low (discharge closed)
    /// - PB5 (BLEED1_N): High (bleed off)
    /// - PB6, PB7, PA9 (BLEED2-4): Low (bleed off)
    /// - PB3, PB4 (LEDs): Low
    /// - PA15: PWM at 100 % (no charging) until `init_full`
    ///
    /// The watchdog is started here and must be fed from now on.
    pub fn new(p: embassy_stm32::Peripherals) -> Self {
        let mut watchdog = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_US);
        watchdog.unleash();

        let mut adc = Adc::new(p.ADC1, Irqs);
        adc.set_resolution(Resolution::BITS10);
        let temperature = adc.enable_temperature();
        let calibration = read_system_calibration(&mut adc);

        let pwm = SimplePwm::new(
            p.TIM2,
            Some(PwmPin::new(p.PA15, OutputType::PushPull)),
            None,
            None,
            None,
            Hertz(PWM_HZ),
            CountingMode::EdgeAlignedUp,
        );

        let mut board = BoardIo {
            adc,
            channels: [
                p.PA0.degrade_adc(),
                p.PA1.degrade_adc(),
                p.PA2.degrade_adc(),
                p.PA3.degrade_adc(),
                p.PA4.degrade_adc(),
                p.PA5.degrade_adc(),
                temperature.degrade_adc(),
            ],
            pwm,
            regulator_enabled: false,
            gate: Output::new(p.PA8, Level::Low, Speed::Low),
            bleeds: [
                Output::new(p.PB5, Level::High, Speed::Low),
                Output::new(p.PB6, Level::Low, Speed::Low),
                Output::new(p.PB7, Level::Low, Speed::Low),
                Output::new(p.PA9, Level::Low, Speed::Low),
            ],
            red: Output::new(p.PB3, Level::Low, Speed::Low),
            green: Output::new(p.PB4, Level::Low, Speed::Low),
            watchdog,
            cpu_hz: ACTIVE_HZ,
        };
        board.disconnect_regulator();

        Self {
            board,
            store: FactoryTrimStore::new(
                NorFlashStore::new(Flash::new_blocking(p.FLASH), STORE_BASE),
                calibration,
            ),
        }
    }
}

/// Reads the factory words and measures VREFINT against the current VDDA.
fn read_system_calibration(adc: &mut Adc<'static, ADC1>) -> SystemCalibration {
    let mut vref = adc.enable_vref();
    adc.set_sample_time(SampleTime::CYCLES160_5);
    // VREFINT buffer start-up, about 3 ms
    asm::delay(ACTIVE_HZ / 300);

    let total: u32 = (0..VREFINT_SAMPLES)
        .map(|_| u32::from(block_on(adc.read(&mut vref))))
        .sum();
    adc.set_sample_time(SampleTime::CYCLES1_5);

    // SAFETY: fixed, always-readable addresses in system memory
    let (vrefint_cal, ts_cal1, ts_cal2) = unsafe {
        (
            core::ptr::read_volatile(VREFINT_CAL),
            core::ptr::read_volatile(TS_CAL1),
            core::ptr::read_volatile(TS_CAL2),
        )
    };

    SystemCalibration {
        vrefint_cal,
        ts_cal1,
        ts_cal2,
        vrefint_code: (total / VREFINT_SAMPLES) as u16,
    }
}

/// Board traits on the STM32 peripherals.
pub struct BoardIo {
    adc: Adc<'static, ADC1>,
    /// Indexed by [`Channel::index`]
    channels: [AnyAdcChannel<ADC1>; 7],
    pwm: SimplePwm<'static, TIM2>,
    regulator_enabled: bool,
    gate: Output<'static>,
    bleeds: [Output<'static>; 4],
    red: Output<'static>,
    green: Output<'static>,
    watchdog: IndependentWatchdog<'static, embassy_stm32::peripherals::IWDG>,
    /// Current core clock, for busy-wait delays
    cpu_hz: u32,
}

impl BoardIo {
    /// Holds the PWM output high: the shunt takes all the panel current.
    fn disconnect_regulator(&mut self) {
        self.regulator_enabled = false;
        let mut ch1 = self.pwm.ch1();
        ch1.set_duty_cycle_fully_on();
        ch1.enable();
    }

    fn wait(&mut self, duration: embassy_time::Duration) {
        let cycles = duration.as_micros() * u64::from(self.cpu_hz) / 1_000_000;
        asm::delay(cycles.min(u64::from(u32::MAX)) as u32);
    }

    fn set_msi(&mut self, range: pac::rcc::vals::Msirange, hz: u32) {
        pac::RCC.icscr().modify(|w| w.set_msirange(range));
        self.cpu_hz = hz;
    }

    fn leds_off(&mut self) {
        self.red.set_low();
        self.green.set_low();
    }
}

impl AnalogFrontEnd for BoardIo {
    fn sample(&mut self, channel: Channel) -> u16 {
        block_on(self.adc.read(&mut self.channels[channel.index()]))
    }
}

impl Indicator for BoardIo {
    fn set_colour(&mut self, colour: Colour) {
        let (red, green) = match colour {
            Colour::Off => (false, false),
            Colour::Red => (true, false),
            Colour::Yellow => (true, true),
            Colour::Green => (false, true),
        };
        self.red.set_level(red.into());
        self.green.set_level(green.into());
    }

    fn flash(&mut self, pattern: &FlashPattern) {
        for _ in 0..pattern.repeats {
            self.set_colour(pattern.on);
            self.watchdog.pet();
            self.wait(pattern.on_time);
            self.set_colour(pattern.off);
            self.watchdog.pet();
            self.wait(pattern.off_time);
        }
    }
}

impl PowerStage for BoardIo {
    fn set_gate(&mut self, gate: Gate) {
        match gate {
            Gate::Open => self.gate.set_high(),
            Gate::Closed => self.gate.set_low(),
        }
    }

    fn set_bleed(&mut self, cell: usize, on: bool) {
        // cell 1 switch is active-low
        let high = if cell == 0 { !on } else { on };
        if let Some(pin) = self.bleeds.get_mut(cell) {
            pin.set_level(high.into());
        }
    }

    fn set_duty(&mut self, duty: u16) {
        if !self.regulator_enabled {
            return;
        }
        let max = u32::from(self.pwm.max_duty_cycle());
        let scaled = u32::from(duty) * max / u32::from(PWM_PERIOD);
        self.pwm.ch1().set_duty_cycle(scaled as u16);
    }

    fn enable_regulator(&mut self, enabled: bool) {
        if enabled {
            self.regulator_enabled = true;
        } else {
            self.disconnect_regulator();
        }
    }
}

impl Clocks for BoardIo {
    fn init_minimal(&mut self) {
        self.set_msi(pac::rcc::vals::Msirange::RANGE5, ACTIVE_HZ);
        self.adc.set_sample_time(SampleTime::CYCLES1_5);
    }

    fn init_full(&mut self) {
        self.set_gate(Gate::Closed);
        for cell in 0..self.bleeds.len() {
            self.set_bleed(cell, false);
        }
        self.leds_off();
        self.enable_regulator(true);
    }

    fn snooze(&mut self) {
        self.disconnect_regulator();
        self.set_msi(pac::rcc::vals::Msirange::RANGE0, SNOOZE_HZ);
        self.adc.set_sample_time(SampleTime::CYCLES160_5);
    }

    fn wake(&mut self) {
        self.set_msi(pac::rcc::vals::Msirange::RANGE5, ACTIVE_HZ);
        self.adc.set_sample_time(SampleTime::CYCLES1_5);
        self.enable_regulator(true);
    }

    fn shutdown(&mut self) {
        self.leds_off();
        self.set_gate(Gate::Closed);
        for cell in 0..self.bleeds.len() {
            self.set_bleed(cell, false);
        }
        self.pwm.ch1().disable();
        pac::ADC1.cr().modify(|w| w.set_addis(true));
    }

    fn halt(&mut self) -> ! {
        // Stop mode with the low-power regulator. The IWDG keeps counting on
        // LSI and resets the core when it expires.
        pac::RCC.apb1enr().modify(|w| w.set_pwren(true));
        pac::PWR.cr().modify(|w| {
            w.set_lpsdsr(true);
            w.set_ulp(true);
        });
        let mut core = unsafe { cortex_m::Peripherals::steal() };
        core.SCB.set_sleepdeep();
        loop {
            asm::wfi();
        }
    }
}

impl Watchdog for BoardIo {
    fn feed(&mut self) {
        self.watchdog.pet();
    }
}

impl DelayUs<u32> for BoardIo {
    fn delay_us(&mut self, us: u32) {
        self.wait(embassy_time::Duration::from_micros(u64::from(us)));
    }
}
