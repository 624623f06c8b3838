//! Memory-mapped register backend
//!
//! The only module allowed to touch raw addresses. [`Peripherals::take`]
//! hands out the MMIO-backed driver handles once per boot; every other
//! path to them is `unsafe`.

#![allow(unsafe_code)]

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{memory_map, NUM_PORTS};
use crate::hal::adc::{Adc, AdcUnit};
use crate::hal::gpio::Gpio;
use crate::hal::rcc::Rcc;
use crate::hal::reg::RegisterBlock;
use crate::hal::timer::{Timebase, SYSTEM_TICKS};
use crate::hal::uart::{Uart, UartUnit};

/// A register block at a fixed physical address
#[derive(Debug)]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Wrap the register block at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the address of a peripheral register block valid for
    /// 32-bit volatile access, and no other live handle may drive the same
    /// block.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Base address of the block
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    fn ptr(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }
}

impl RegisterBlock for Mmio {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `new` guarantees a valid register block at `base`
        unsafe { core::ptr::read_volatile(self.ptr(offset)) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(self.ptr(offset), value) }
    }
}

static TAKEN: AtomicBool = AtomicBool::new(false);

/// All peripherals the firmware drives
pub struct Peripherals {
    /// Reset and clock control
    pub rcc: Rcc<Mmio>,
    /// Power controller (over-drive during clock bring-up)
    pub pwr: Mmio,
    /// Flash interface (wait states during clock bring-up)
    pub flash: Mmio,
    /// GPIO ports A..H
    pub gpio: Gpio<Mmio>,
    /// ADC1
    pub adc1: Adc<Mmio>,
    /// ADC2
    pub adc2: Adc<Mmio>,
    /// ADC3
    pub adc3: Adc<Mmio>,
    /// USART1
    pub usart1: Uart<Mmio>,
    /// USART2
    pub usart2: Uart<Mmio>,
    /// USART6
    pub usart6: Uart<Mmio>,
    /// SysTick driving [`SYSTEM_TICKS`]
    pub timebase: Timebase<Mmio>,
}

impl Peripherals {
    /// Take the peripherals, returns None after the first call
    #[must_use]
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            // SAFETY: the flag makes this the only call that gets through
            Some(unsafe { Self::steal() })
        }
    }

    /// Build the handles unconditionally
    ///
    /// # Safety
    ///
    /// Aliases any handles already handed out by [`Peripherals::take`].
    #[must_use]
    pub unsafe fn steal() -> Self {
        let gpio_ports: [Mmio; NUM_PORTS as usize] = core::array::from_fn(|i| {
            // SAFETY: caller upholds uniqueness; addresses are from the memory map
            unsafe { Mmio::new(memory_map::GPIOA + i * memory_map::GPIO_STRIDE) }
        });
        // SAFETY: as above for every block below
        unsafe {
            Self {
                rcc: Rcc::new(Mmio::new(memory_map::RCC)),
                pwr: Mmio::new(memory_map::PWR),
                flash: Mmio::new(memory_map::FLASH),
                gpio: Gpio::new(gpio_ports),
                adc1: Adc::new(AdcUnit::Adc1, Mmio::new(AdcUnit::Adc1.base_address())),
                adc2: Adc::new(AdcUnit::Adc2, Mmio::new(AdcUnit::Adc2.base_address())),
                adc3: Adc::new(AdcUnit::Adc3, Mmio::new(AdcUnit::Adc3.base_address())),
                usart1: Uart::new(UartUnit::Usart1, Mmio::new(UartUnit::Usart1.base_address())),
                usart2: Uart::new(UartUnit::Usart2, Mmio::new(UartUnit::Usart2.base_address())),
                usart6: Uart::new(UartUnit::Usart6, Mmio::new(UartUnit::Usart6.base_address())),
                timebase: Timebase::new(Mmio::new(memory_map::SYSTICK), &SYSTEM_TICKS),
            }
        }
    }
}
