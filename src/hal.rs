//! Hardware Abstraction Layer
//!
//! Register-level drivers for the STM32F446 peripherals the data
//! acquisition firmware uses. Every driver is generic over
//! [`reg::RegisterBlock`], so the same code runs against the MMIO
//! backend on target and against simulated registers on the host.

pub mod adc;
pub mod gpio;
#[cfg(feature = "embedded")]
pub mod mmio;
pub mod rcc;
pub mod reg;
pub mod timer;
pub mod uart;
