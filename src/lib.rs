//! Control core for the Battery 100 block: a standalone solar charge
//! controller for a four-cell battery pack.
//!
//! # Overview
//!
//! Every cycle of the control loop:
//! - samples the four stacked cell taps, the panel voltage and the voltage
//!   downstream of the discharge fuse
//! - classifies the battery (normal, full, empty, short circuit)
//! - opens or closes the discharge gate
//! - nudges the charge regulator PWM and bleeds overcharged cells
//! - updates the tri-colour indicator
//! - decides whether to stay active, snooze or go to sleep
//!
//! The only recovery mechanism is the independent watchdog. Sleep is a halt
//! that ends with a watchdog reset, so every code path leaves durable storage
//! in a state a cold start can resume from.
//!
//! # Module Organization
//!
//! - [`board`] - Hardware seam traits implemented by the firmware binary
//! - [`filter`] - Rolling average with carried remainder
//! - [`readings`] - Channel acquisition and stacked-tap to cell conversion
//! - [`calibration`] - Factory trim correction of nominal thresholds
//! - [`battery`] - Battery state machine
//! - [`charge`] - Duty cycle control and cell balancing
//! - [`discharge`] - Discharge gate and short-circuit containment
//! - [`power`] - Active / snoozing / sleep decisions
//! - [`indicator`] - Hysteretic indicator colour state machine
//! - [`self_test`] - One-shot factory test
//! - [`temperature`] - Maximum temperature log and thermal shutdown
//! - [`store`] - Typed durable key/value storage on NOR flash
//! - [`controller`] - Boot sequence and main loop orchestration

#![cfg_attr(not(test), no_std)]

pub mod battery;
pub mod board;
pub mod calibration;
pub mod charge;
pub mod config;
pub mod controller;
pub mod discharge;
pub mod filter;
pub mod indicator;
pub mod power;
pub mod readings;
pub mod store;
#[cfg(feature = "max-temp-log")]
pub mod temperature;

#[cfg(test)]
pub(crate) mod testing;
