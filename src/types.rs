//! Shared types used across the firmware
//!
//! This module defines the addressing and value types that enforce
//! peripheral invariants at construction time, so the drivers only ever
//! see in-range pins, channels and samples.

use core::fmt;

use crate::config::{ADC_MAX_VALUE, NUM_PORTS, PINS_PER_PORT, TOTAL_PINS};

/// GPIO port (a group of 16 pins sharing one register block)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum Port {
    /// Port A
    A,
    /// Port B
    B,
    /// Port C
    C,
    /// Port D
    D,
    /// Port E
    E,
    /// Port F
    F,
    /// Port G
    G,
    /// Port H
    H,
}

impl Port {
    /// All ports in register-block order
    pub const ALL: [Self; NUM_PORTS as usize] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::H,
    ];

    /// Zero-based port index (A = 0)
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Port from its zero-based index
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if index < NUM_PORTS {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Port letter as used on the silkscreen
    #[must_use]
    pub const fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

/// Flat pin identifier
///
/// Pins are numbered `port_index * PINS_PER_PORT + bit_index`, matching the
/// silicon layout (`PA0 = 0`, `PB0 = 16`, ..., `PH15 = 127`). A `PinId` is a
/// coordinate, not a resource: it can be copied freely.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinId(u8);

impl PinId {
    /// Create a pin identifier, returns None if out of range
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if raw < TOTAL_PINS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Create a pin identifier from a port and a bit index within it
    #[must_use]
    pub const fn from_port(port: Port, bit: u8) -> Option<Self> {
        if bit < PINS_PER_PORT {
            Some(Self(port.index() * PINS_PER_PORT + bit))
        } else {
            None
        }
    }

    /// Flat identifier value
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Port this pin belongs to
    #[must_use]
    pub const fn port(self) -> Port {
        Port::ALL[port_index(self.0) as usize]
    }

    /// Bit index of this pin within its port (0..16)
    #[must_use]
    pub const fn bit(self) -> u8 {
        bit_index(self.0)
    }
}

/// Port index of a flat pin number (`pin / PINS_PER_PORT`)
#[must_use]
pub const fn port_index(pin: u8) -> u8 {
    pin / PINS_PER_PORT
}

/// Bit index of a flat pin number within its port (`pin % PINS_PER_PORT`)
#[must_use]
pub const fn bit_index(pin: u8) -> u8 {
    pin % PINS_PER_PORT
}

impl fmt::Debug for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}{}", self.port().letter(), self.bit())
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for PinId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "P{}{}", self.port().letter(), self.bit());
    }
}

macro_rules! port_pins {
    ($base:expr; $($name:ident = $bit:expr),+ $(,)?) => {
        impl PinId {
            $(
                #[allow(missing_docs)]
                pub const $name: Self = Self($base * PINS_PER_PORT + $bit);
            )+
        }
    };
}

port_pins!(0; PA0 = 0, PA1 = 1, PA2 = 2, PA3 = 3, PA4 = 4, PA5 = 5, PA6 = 6, PA7 = 7,
    PA8 = 8, PA9 = 9, PA10 = 10, PA11 = 11, PA12 = 12, PA13 = 13, PA14 = 14, PA15 = 15);
port_pins!(1; PB0 = 0, PB1 = 1, PB2 = 2, PB3 = 3, PB4 = 4, PB5 = 5, PB6 = 6, PB7 = 7,
    PB8 = 8, PB9 = 9, PB10 = 10, PB11 = 11, PB12 = 12, PB13 = 13, PB14 = 14, PB15 = 15);
port_pins!(2; PC0 = 0, PC1 = 1, PC2 = 2, PC3 = 3, PC4 = 4, PC5 = 5, PC6 = 6, PC7 = 7,
    PC8 = 8, PC9 = 9, PC10 = 10, PC11 = 11, PC12 = 12, PC13 = 13, PC14 = 14, PC15 = 15);
port_pins!(3; PD0 = 0, PD1 = 1, PD2 = 2, PD3 = 3, PD4 = 4, PD5 = 5, PD6 = 6, PD7 = 7,
    PD8 = 8, PD9 = 9, PD10 = 10, PD11 = 11, PD12 = 12, PD13 = 13, PD14 = 14, PD15 = 15);
port_pins!(4; PE0 = 0, PE1 = 1, PE2 = 2, PE3 = 3, PE4 = 4, PE5 = 5, PE6 = 6, PE7 = 7,
    PE8 = 8, PE9 = 9, PE10 = 10, PE11 = 11, PE12 = 12, PE13 = 13, PE14 = 14, PE15 = 15);
port_pins!(5; PF0 = 0, PF1 = 1, PF2 = 2, PF3 = 3, PF4 = 4, PF5 = 5, PF6 = 6, PF7 = 7,
    PF8 = 8, PF9 = 9, PF10 = 10, PF11 = 11, PF12 = 12, PF13 = 13, PF14 = 14, PF15 = 15);
port_pins!(6; PG0 = 0, PG1 = 1, PG2 = 2, PG3 = 3, PG4 = 4, PG5 = 5, PG6 = 6, PG7 = 7,
    PG8 = 8, PG9 = 9, PG10 = 10, PG11 = 11, PG12 = 12, PG13 = 13, PG14 = 14, PG15 = 15);
port_pins!(7; PH0 = 0, PH1 = 1, PH2 = 2, PH3 = 3, PH4 = 4, PH5 = 5, PH6 = 6, PH7 = 7,
    PH8 = 8, PH9 = 9, PH10 = 10, PH11 = 11, PH12 = 12, PH13 = 13, PH14 = 14, PH15 = 15);

/// Alternate function index (AF0..AF15)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct AlternateFunction(u8);

impl AlternateFunction {
    /// System function (MCO, SWD, ...)
    pub const AF0: Self = Self(0);
    /// USART1..3
    pub const AF7: Self = Self(7);
    /// USART4..6
    pub const AF8: Self = Self(8);

    /// Create from an index, returns None above AF15
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < 16 {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Raw 4-bit index
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }
}

/// ADC input channel (IN0..IN18)
///
/// Channels 0..=15 are external inputs, 16 is the temperature sensor,
/// 17 is VREFINT and 18 is VBAT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct AdcChannel(u8);

impl AdcChannel {
    /// Highest channel number the multiplexer accepts
    pub const MAX: u8 = 18;

    /// Internal temperature sensor
    pub const TEMPERATURE: Self = Self(16);

    /// Internal reference voltage
    pub const VREFINT: Self = Self(17);

    /// Create a channel, returns None if out of range
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index <= Self::MAX {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Channel number as programmed into a sequence slot
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Whether this channel is wired to a GPIO pin
    #[must_use]
    pub const fn is_external(self) -> bool {
        self.0 < 16
    }
}

/// ADC conversion result
///
/// Always a 12-bit value; construction masks off anything above bit 11.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AdcReading {
    /// Raw 12-bit ADC value (0-4095)
    raw: u16,
}

impl AdcReading {
    /// Create a reading from a data register value
    #[must_use]
    pub const fn from_register(value: u32) -> Self {
        Self {
            raw: (value & ADC_MAX_VALUE as u32) as u16,
        }
    }

    /// Get the raw 12-bit value
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Convert to millivolts against the given analog supply
    #[must_use]
    pub const fn as_millivolts(self, vdda_mv: u32) -> u32 {
        let mv = self.raw as u64 * vdda_mv as u64 / ADC_MAX_VALUE as u64;
        // raw <= max, so mv <= vdda_mv
        mv as u32
    }
}

impl fmt::Display for AdcReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for AdcReading {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ADC({})", self.raw);
    }
}

/// USART baud rate register value (16x oversampling)
///
/// Bits 15:4 hold the divisor mantissa and bits 3:0 the fraction in
/// sixteenths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct BaudDivisor(u16);

impl BaudDivisor {
    /// Build from mantissa and fraction, returns None if either overflows
    #[must_use]
    pub const fn from_parts(mantissa: u16, fraction: u8) -> Option<Self> {
        if mantissa < 0x1000 && fraction < 16 {
            Some(Self((mantissa << 4) | fraction as u16))
        } else {
            None
        }
    }

    /// Compute the divisor for a baud rate at the given peripheral clock
    ///
    /// Returns None if the rate is zero or not reachable from `pclk_hz`.
    #[must_use]
    pub const fn from_baud(pclk_hz: u32, baud: u32) -> Option<Self> {
        if baud == 0 {
            return None;
        }
        // USARTDIV * 16 = pclk / baud, rounded to nearest
        let div = (pclk_hz as u64 + baud as u64 / 2) / baud as u64;
        if div < 16 || div > 0xFFFF {
            None
        } else {
            Some(Self(div as u16))
        }
    }

    /// Raw BRR value
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Integer part of the divisor
    #[must_use]
    pub const fn mantissa(self) -> u16 {
        self.0 >> 4
    }

    /// Fractional part of the divisor in sixteenths
    #[must_use]
    pub const fn fraction(self) -> u8 {
        (self.0 & 0xF) as u8
    }

    /// Baud rate this divisor produces at the given peripheral clock
    #[must_use]
    pub const fn actual_baud(self, pclk_hz: u32) -> u32 {
        pclk_hz / self.0 as u32
    }
}
