//! Reset and Clock Control
//!
//! Clock gates for the peripherals the drivers use, and the one-shot
//! system clock bring-up (HSI -> PLL -> 180 MHz with over-drive).

use crate::config::{HCLK_FREQ_HZ, PLL_M, PLL_N, PLL_P, PLL_Q};
use crate::hal::adc::AdcUnit;
use crate::hal::reg::RegisterBlock;
use crate::hal::uart::UartUnit;
use crate::types::Port;

/// RCC register offsets and bits
mod reg {
    pub const CR: usize = 0x00;
    pub const PLLCFGR: usize = 0x04;
    pub const CFGR: usize = 0x08;
    pub const AHB1ENR: usize = 0x30;
    pub const APB1ENR: usize = 0x40;
    pub const APB2ENR: usize = 0x44;

    pub const CR_HSION: u32 = 1 << 0;
    pub const CR_HSIRDY: u32 = 1 << 1;
    pub const CR_PLLON: u32 = 1 << 24;
    pub const CR_PLLRDY: u32 = 1 << 25;

    pub const PLLCFGR_PLLSRC: u32 = 1 << 22;

    pub const CFGR_SW: u32 = 0b11;
    pub const CFGR_SW_PLL: u32 = 0b10;
    pub const CFGR_SWS: u32 = 0b11 << 2;
    pub const CFGR_SWS_PLL: u32 = 0b10 << 2;
    pub const CFGR_HPRE_DIV1: u32 = 0;
    pub const CFGR_PPRE1_DIV4: u32 = 0b101 << 10;
    pub const CFGR_PPRE2_DIV2: u32 = 0b100 << 13;

    pub const APB1ENR_PWREN: u32 = 1 << 28;
}

/// PWR register offsets and bits
mod pwr {
    pub const CR: usize = 0x00;
    pub const CSR: usize = 0x04;

    pub const CR_ODEN: u32 = 1 << 16;
    pub const CR_ODSWEN: u32 = 1 << 17;
    pub const CSR_ODRDY: u32 = 1 << 16;
    pub const CSR_ODSWRDY: u32 = 1 << 17;
}

/// FLASH register offsets and bits
mod flash {
    pub const ACR: usize = 0x00;

    pub const ACR_LATENCY_5WS: u32 = 5;
    pub const ACR_PRFTEN: u32 = 1 << 8;
    pub const ACR_ICEN: u32 = 1 << 9;
    pub const ACR_DCEN: u32 = 1 << 10;
}

/// Clock enable register a gate lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum Bus {
    /// AHB1 (GPIO ports)
    Ahb1,
    /// APB1 (USART2, PWR)
    Apb1,
    /// APB2 (ADCs, USART1, USART6)
    Apb2,
}

impl Bus {
    const fn enable_register(self) -> usize {
        match self {
            Self::Ahb1 => reg::AHB1ENR,
            Self::Apb1 => reg::APB1ENR,
            Self::Apb2 => reg::APB2ENR,
        }
    }
}

/// Reset and clock control block
pub struct Rcc<R> {
    regs: R,
}

impl<R: RegisterBlock> Rcc<R> {
    /// Wrap the RCC register block
    #[must_use]
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    /// Set one clock gate
    pub fn enable(&mut self, bus: Bus, bit: u32) {
        self.regs.set_bits(bus.enable_register(), 1 << bit);
    }

    /// Whether a clock gate is set
    #[must_use]
    pub fn is_enabled(&self, bus: Bus, bit: u32) -> bool {
        self.regs.is_set(bus.enable_register(), 1 << bit)
    }

    /// Enable the clock of a GPIO port (GPIOxEN, bit = port index)
    pub fn enable_gpio_port(&mut self, port: Port) {
        self.enable(Bus::Ahb1, u32::from(port.index()));
    }

    /// Enable the clock of an ADC unit
    pub fn enable_adc(&mut self, unit: AdcUnit) {
        let (bus, bit) = unit.clock_gate();
        self.enable(bus, bit);
    }

    /// Enable the clock of a USART
    pub fn enable_uart(&mut self, unit: UartUnit) {
        let (bus, bit) = unit.clock_gate();
        self.enable(bus, bit);
    }

    /// Bring the core up to 180 MHz from the internal oscillator
    ///
    /// HSI feeds the PLL (M = 8, N = 180, P = 2), AHB runs undivided, APB1
    /// at /4 and APB2 at /2. Over-drive is switched on and flash gets five
    /// wait states before SYSCLK moves to the PLL. Every ready flag is
    /// busy-waited without timeout. Returns the resulting HCLK.
    pub fn configure_system_clock<P, F>(&mut self, pwr_regs: &P, flash_regs: &F) -> u32
    where
        P: RegisterBlock,
        F: RegisterBlock,
    {
        self.regs.set_bits(reg::CR, reg::CR_HSION);
        while !self.regs.is_set(reg::CR, reg::CR_HSIRDY) {
            core::hint::spin_loop();
        }

        self.regs.write(
            reg::PLLCFGR,
            PLL_M | (PLL_N << 6) | (PLL_P << 16) | (PLL_Q << 24),
        );
        self.regs.clear_bits(reg::PLLCFGR, reg::PLLCFGR_PLLSRC);

        self.regs.set_bits(
            reg::CFGR,
            reg::CFGR_HPRE_DIV1 | reg::CFGR_PPRE2_DIV2 | reg::CFGR_PPRE1_DIV4,
        );

        self.regs.set_bits(reg::CR, reg::CR_PLLON);
        while !self.regs.is_set(reg::CR, reg::CR_PLLRDY) {
            core::hint::spin_loop();
        }

        self.regs.set_bits(reg::APB1ENR, reg::APB1ENR_PWREN);

        pwr_regs.set_bits(pwr::CR, pwr::CR_ODEN);
        while !pwr_regs.is_set(pwr::CSR, pwr::CSR_ODRDY) {
            core::hint::spin_loop();
        }
        pwr_regs.set_bits(pwr::CR, pwr::CR_ODSWEN);
        while !pwr_regs.is_set(pwr::CSR, pwr::CSR_ODSWRDY) {
            core::hint::spin_loop();
        }

        flash_regs.write(
            flash::ACR,
            flash::ACR_PRFTEN | flash::ACR_ICEN | flash::ACR_DCEN | flash::ACR_LATENCY_5WS,
        );

        self.regs
            .modify(reg::CFGR, |v| (v & !reg::CFGR_SW) | reg::CFGR_SW_PLL);
        while self.regs.read(reg::CFGR) & reg::CFGR_SWS != reg::CFGR_SWS_PLL {
            core::hint::spin_loop();
        }

        debug!("SYSCLK switched to PLL, HCLK = {} Hz", HCLK_FREQ_HZ);
        HCLK_FREQ_HZ
    }
}
