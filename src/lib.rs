//! Data Acquisition Firmware Library
//!
//! This library provides register-level drivers for the GPIO, ADC and
//! UART peripherals of an STM32F446, plus the millisecond timebase they
//! are paced by. There is no operating system: every driver manipulates
//! memory-mapped peripheral registers directly.
//!
//! # Architecture
//!
//! The firmware is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │     Acquisition loop  │  Console  │  Status LEDs             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      DRIVER LAYER                            │
//! │  Pin Abstraction  │  ADC Engine  │  UART Engine  │  Timebase │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   REGISTER ACCESS                            │
//! │       RegisterBlock trait  │  MMIO backend  │  RCC           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **One owner per peripheral**: handles wrap their register block and
//!   the MMIO-backed set is handed out once by [`hal::mmio::Peripherals::take`]
//! - **Hardware is the source of truth**: pin configuration is never
//!   cached, every query re-reads the register
//! - **Contract violations halt**: invalid usage panics, waiting is not an error
//! - **No unsafe outside the MMIO backend**
//! - **Host testable**: drivers are generic over [`hal::reg::RegisterBlock`]

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

/// Hardware Abstraction Layer
///
/// Register-level drivers for RCC, GPIO, ADC, USART and SysTick.
pub mod hal;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    pub use crate::hal::adc::{Adc, AdcState, AdcUnit, ConversionMode, LatchedResults};
    pub use crate::hal::gpio::{Gpio, OutputSpeed, OutputType, PinMode, Pull};
    pub use crate::hal::reg::RegisterBlock;
    pub use crate::hal::timer::{RateLimiter, TickCounter, Timebase, Timeout, SYSTEM_TICKS};
    pub use crate::hal::uart::{Uart, UartUnit, WordLength};

    #[cfg(feature = "embedded")]
    pub use crate::hal::mmio::{Mmio, Peripherals};

    // Common traits
    pub use embedded_hal::delay::DelayNs;
    pub use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};

    // Logging
    #[cfg(feature = "embedded")]
    pub use defmt::{debug, error, info, trace, warn};
}
