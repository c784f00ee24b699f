//! Firmware for the Battery 100 block: a standalone solar charge controller
//! for a four-cell LiFePO4 pack.
//!
//! # Overview
//!
//! A panel charges the pack through a PWM-driven shunt regulator and the
//! pack feeds a load through a fused discharge MOSFET. The firmware:
//! - keeps every cell between its empty and full voltages
//! - balances cells with bleed resistors while the sun is out
//! - cuts the load on a short circuit and retries after a flash sequence
//! - shows the charge level on a red/green LED
//! - runs a one-shot factory self-test on first power-up
//!
//! # Hardware
//!
//! - **MCU**: STM32L031G6U6 (Cortex-M0+, ultra-low-power)
//! - **Battery**: 4x LiFePO4 cells in series, each tap on an ADC input
//! - **Charge**: shunt regulator on TIM2 PWM
//! - **Discharge**: MOSFET gate behind a fuse
//! - **Indicator**: red and green LEDs
//!
//! # Low Power Operation
//!
//! - MSI oscillator at 2.097 MHz while charging, 65.5 kHz while snoozing
//! - STOP mode for sleep, ended only by the independent watchdog
//! - A dark panel at wake sends the unit straight back to sleep
//!
//! # Module Organization
//!
//! - [`hardware`] - Pin mappings and board trait implementations
//! - `battery_block` - Control core (state machines, calibration, storage)

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod hardware;

#[cfg(target_os = "none")]
mod firmware {
    use battery_block::config::Tuning;
    use battery_block::controller::Controller;
    use embassy_executor::Spawner;
    use embassy_stm32::{
        Config,
        rcc::{LsConfig, mux::ClockMux},
    };
    #[cfg(feature = "debug-mode")]
    use embassy_time::Timer;
    use {defmt_rtt as _, panic_probe as _};

    use crate::hardware::Peripherals;

    /// Creates the clock configuration for the STM32L031.
    ///
    /// # Clock Settings
    ///
    /// - **MSI**: 2.097 MHz, fast enough for a stable charge loop
    /// - **System clock**: MSI (no PLL)
    /// - **LSI**: on, clocks the independent watchdog
    /// - **Voltage scale**: Range 1
    ///
    /// The snooze path later drops MSI to its lowest range directly through
    /// the RCC registers.
    fn create_clock_config() -> embassy_stm32::rcc::Config {
        embassy_stm32::rcc::Config {
            msi: Some(embassy_stm32::rcc::MSIRange::RANGE2M),
            hsi: false,
            hse: None,
            pll: None,
            sys: embassy_stm32::rcc::Sysclk::MSI,
            ahb_pre: embassy_stm32::rcc::AHBPrescaler::DIV1,
            apb1_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
            apb2_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
            ls: LsConfig {
                rtc: embassy_stm32::rcc::RtcClockSource::LSI,
                lsi: true,
                lse: None,
            },
            voltage_scale: embassy_stm32::rcc::VoltageScale::RANGE1,
            mux: ClockMux::default(),
        }
    }

    /// Main entry point.
    ///
    /// # Initialization Sequence
    ///
    /// 1. Configure clocks
    /// 2. Initialize STM32 peripherals and start the watchdog
    /// 3. Hand the board and flash store to the controller
    /// 4. Boot, then run the control loop until the unit sleeps
    ///
    /// Every sleep ends in a watchdog reset, so execution always comes back
    /// through here.
    #[embassy_executor::main]
    async fn main(_spawner: Spawner) {
        let mut config = Config::default();
        config.rcc = create_clock_config();

        let p = embassy_stm32::init(config);

        #[cfg(feature = "debug-mode")]
        {
            defmt::info!("Battery block firmware starting...");

            // Give a debugger time to attach before the first STOP.
            defmt::info!("Waiting 3 seconds for debugger connection...");
            Timer::after_secs(3).await;
        }

        let peripherals = Peripherals::new(p);

        #[cfg(feature = "debug-mode")]
        defmt::info!("Peripherals ready, booting controller...");

        Controller::new(peripherals.board, peripherals.store, Tuning::default()).run()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
