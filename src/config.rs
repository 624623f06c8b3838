//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the STM32F446 data
//! acquisition board. Clock frequencies, peripheral geometry, pin
//! assignments and the reserved-pin table are centralized here.

use crate::hal::gpio::PinMode;
use crate::types::{AdcChannel, PinId};

/// Internal RC oscillator frequency (PLL source)
pub const HSI_FREQ_HZ: u32 = 16_000_000;

/// PLL input divider
pub const PLL_M: u32 = 8;

/// PLL multiplier
pub const PLL_N: u32 = 180;

/// PLL main output divider field (0 = /2)
pub const PLL_P: u32 = 0;

/// PLL 48 MHz domain divider
pub const PLL_Q: u32 = 2;

/// Core (AHB) clock after bring-up
pub const HCLK_FREQ_HZ: u32 = 180_000_000;

/// APB1 peripheral clock (HCLK / 4)
pub const APB1_FREQ_HZ: u32 = HCLK_FREQ_HZ / 4;

/// APB2 peripheral clock (HCLK / 2)
pub const APB2_FREQ_HZ: u32 = HCLK_FREQ_HZ / 2;

/// Timebase tick rate (1 ms period)
pub const TICK_HZ: u32 = 1_000;

/// Number of GPIO ports (A..H)
pub const NUM_PORTS: u8 = 8;

/// Pins per GPIO port
pub const PINS_PER_PORT: u8 = 16;

/// Size of the flat pin identifier space
pub const TOTAL_PINS: u8 = NUM_PORTS * PINS_PER_PORT;

/// Number of ADC units
pub const NUM_ADC_UNITS: usize = 3;

/// Regular sequence capacity; sequences must be shorter than this
pub const ADC_TOTAL_CHANNELS: usize = 16;

/// Full-scale ADC value (12-bit)
pub const ADC_MAX_VALUE: u16 = 0x0FFF;

/// Analog supply in millivolts (Nucleo-64)
pub const VDDA_MV: u32 = 3_300;

/// Console baud rate
pub const CONSOLE_BAUD: u32 = 115_200;

/// Line buffer size for console input (including terminator)
pub const LINE_BUFFER_SIZE: usize = 9;

/// Interval between telemetry lines in milliseconds
pub const REPORT_INTERVAL_MS: u32 = 1_000;

/// Heartbeat LED half-period in milliseconds
pub const HEARTBEAT_MS: u32 = 500;

/// ADC1 channel wired to [`pins::SENSOR_ANALOG`]
pub const SENSOR_CHANNEL: AdcChannel = match AdcChannel::new(1) {
    Some(channel) => channel,
    None => panic!("sensor channel out of range"),
};

/// Pin assignments
pub mod pins {
    //! GPIO pin assignments matching the board wiring

    use crate::types::PinId;

    /// Nucleo user LED (LD2)
    pub const LED_USER: PinId = PinId::PA5;

    /// Heartbeat LED
    pub const LED_HEARTBEAT: PinId = PinId::PB12;

    /// Acquisition activity LED
    pub const LED_ACTIVITY: PinId = PinId::PA11;

    /// Lit when the latest sample differs from the previous one
    pub const LED_CHANGED: PinId = PinId::PA12;

    /// Nucleo user button (B1, active low)
    pub const USER_BUTTON: PinId = PinId::PC13;

    /// Console TX (USART2, routed to the ST-LINK VCP)
    pub const CONSOLE_TX: PinId = PinId::PA2;

    /// Console RX (USART2, routed to the ST-LINK VCP)
    pub const CONSOLE_RX: PinId = PinId::PA3;

    /// Analog input sampled by the acquisition loop (ADC1 IN1)
    pub const SENSOR_ANALOG: PinId = PinId::PA1;

    /// Serial wire debug data
    pub const SWDIO: PinId = PinId::PA13;

    /// Serial wire debug clock
    pub const SWCLK: PinId = PinId::PA14;
}

/// A pin whose board function rules out some modes
#[derive(Clone, Copy, Debug)]
pub struct ReservedPin {
    /// The protected pin
    pub pin: PinId,
    /// Modes the pin must never be put into
    pub forbidden: &'static [PinMode],
}

impl ReservedPin {
    /// Whether `mode` is allowed on this pin
    #[must_use]
    pub fn allows(&self, mode: PinMode) -> bool {
        !self.forbidden.contains(&mode)
    }
}

/// Pins reserved for fixed board functions
pub const RESERVED_PINS: &[ReservedPin] = &[
    // LD2 is driven by the board; reading it as input floats the LED
    ReservedPin {
        pin: pins::LED_USER,
        forbidden: &[PinMode::Input],
    },
    // B1 is wired straight to the pin; driving it fights the button
    ReservedPin {
        pin: pins::USER_BUTTON,
        forbidden: &[PinMode::Output],
    },
    // Leaving AF mode on the SWD pins locks out the debugger
    ReservedPin {
        pin: pins::SWDIO,
        forbidden: &[PinMode::Input, PinMode::Output, PinMode::Analog],
    },
    ReservedPin {
        pin: pins::SWCLK,
        forbidden: &[PinMode::Input, PinMode::Output, PinMode::Analog],
    },
];

/// Look up the reservation for a pin, if any
#[must_use]
pub fn reservation(pin: PinId) -> Option<&'static ReservedPin> {
    RESERVED_PINS.iter().find(|r| r.pin == pin)
}

/// Memory map of the peripherals the drivers touch
pub mod memory_map {
    //! Peripheral base addresses (RM0390 section 2.2.2)

    /// GPIOA register block
    pub const GPIOA: usize = 0x4002_0000;

    /// Distance between consecutive GPIO port blocks
    pub const GPIO_STRIDE: usize = 0x400;

    /// Reset and clock control
    pub const RCC: usize = 0x4002_3800;

    /// Flash interface
    pub const FLASH: usize = 0x4002_3C00;

    /// Power controller
    pub const PWR: usize = 0x4000_7000;

    /// ADC1 register block
    pub const ADC1: usize = 0x4001_2000;

    /// ADC2 register block
    pub const ADC2: usize = 0x4001_2100;

    /// ADC3 register block
    pub const ADC3: usize = 0x4001_2200;

    /// USART1 register block
    pub const USART1: usize = 0x4001_1000;

    /// USART2 register block
    pub const USART2: usize = 0x4000_4400;

    /// USART6 register block
    pub const USART6: usize = 0x4001_1400;

    /// SysTick (core peripheral)
    pub const SYSTICK: usize = 0xE000_E010;
}
