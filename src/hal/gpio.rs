//! GPIO Pin Abstraction
//!
//! Maps the flat [`PinId`] space onto the eight per-port register blocks.
//! Pin configuration lives in hardware only: setters do a clear-then-set
//! of the pin's field, and every query re-reads the register.
//!
//! Field layout per port (RM0390 section 7.4):
//!
//! | Register | Width per pin | Offset of pin `n`   |
//! |----------|---------------|---------------------|
//! | MODER    | 2             | `n * 2`             |
//! | OTYPER   | 1             | `n`                 |
//! | OSPEEDR  | 2             | `n * 2`             |
//! | PUPDR    | 2             | `n * 2`             |
//! | AFRL/H   | 4             | `(n % 8) * 4`       |

use core::convert::Infallible;

use crate::config;
use crate::hal::rcc::Rcc;
use crate::hal::reg::{read_field, write_field, RegisterBlock};
use crate::types::{AlternateFunction, PinId, Port};

/// Register offsets within a GPIO port block
mod reg {
    pub const MODER: usize = 0x00;
    pub const OTYPER: usize = 0x04;
    pub const OSPEEDR: usize = 0x08;
    pub const PUPDR: usize = 0x0C;
    pub const IDR: usize = 0x10;
    pub const ODR: usize = 0x14;
    pub const BSRR: usize = 0x18;
    pub const AFRL: usize = 0x20;
    pub const AFRH: usize = 0x24;
}

/// Pin mode (MODER field)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum PinMode {
    /// Digital input (reset state, encoded as a cleared field)
    #[default]
    Input,
    /// General purpose output
    Output,
    /// Peripheral-controlled (see [`AlternateFunction`])
    AlternateFunction,
    /// Analog (ADC input, digital buffer off)
    Analog,
}

impl PinMode {
    /// Get register value
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Input => 0b00,
            Self::Output => 0b01,
            Self::AlternateFunction => 0b10,
            Self::Analog => 0b11,
        }
    }

    /// Decode a 2-bit MODER field
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Self::Input,
            0b01 => Self::Output,
            0b10 => Self::AlternateFunction,
            _ => Self::Analog,
        }
    }
}

/// Output driver type (OTYPER field)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum OutputType {
    /// Push-pull (reset state)
    #[default]
    PushPull,
    /// Open-drain
    OpenDrain,
}

impl OutputType {
    /// Get register value
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::PushPull => 0,
            Self::OpenDrain => 1,
        }
    }
}

/// Output slew rate (OSPEEDR field)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum OutputSpeed {
    /// Low speed (reset state)
    #[default]
    Low,
    /// Medium speed
    Medium,
    /// Fast speed
    Fast,
    /// High speed
    High,
}

impl OutputSpeed {
    /// Get register value
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Low => 0b00,
            Self::Medium => 0b01,
            Self::Fast => 0b10,
            Self::High => 0b11,
        }
    }

    /// Decode a 2-bit OSPEEDR field
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Self::Low,
            0b01 => Self::Medium,
            0b10 => Self::Fast,
            _ => Self::High,
        }
    }
}

/// Internal pull resistor (PUPDR field)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum Pull {
    /// Floating (reset state)
    #[default]
    None,
    /// Pull-up
    Up,
    /// Pull-down
    Down,
}

impl Pull {
    /// Get register value
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::None => 0b00,
            Self::Up => 0b01,
            Self::Down => 0b10,
        }
    }

    /// Decode a PUPDR field; the reserved encoding reads back as floating
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b01 => Self::Up,
            0b10 => Self::Down,
            _ => Self::None,
        }
    }
}

/// GPIO ports A..H
///
/// Owns the eight port register blocks. All pin operations go through
/// this handle, so two pieces of code can only configure the same port by
/// sharing it explicitly.
pub struct Gpio<R> {
    ports: [R; config::NUM_PORTS as usize],
}

impl<R: RegisterBlock> Gpio<R> {
    /// Wrap the port register blocks, in port order A..H
    #[must_use]
    pub const fn new(ports: [R; config::NUM_PORTS as usize]) -> Self {
        Self { ports }
    }

    /// Release the register blocks
    pub fn free(self) -> [R; config::NUM_PORTS as usize] {
        self.ports
    }

    /// Register block of the port a pin belongs to
    fn block(&self, pin: PinId) -> &R {
        &self.ports[pin.port().index() as usize]
    }

    /// Enable the clock gate of one port
    ///
    /// Must happen before any pin of that port is configured; writes to an
    /// unclocked port are silently dropped by the hardware.
    pub fn init_port<C: RegisterBlock>(&mut self, rcc: &mut Rcc<C>, port: Port) {
        rcc.enable_gpio_port(port);
        debug!("GPIO{}: clock enabled", port);
    }

    /// Set the pin mode
    ///
    /// # Panics
    ///
    /// If `pin` is reserved for a board function that rules out `mode`.
    pub fn configure_mode(&mut self, pin: PinId, mode: PinMode) {
        if let Some(reserved) = config::reservation(pin) {
            assert!(
                reserved.allows(mode),
                "contract violation: {pin} is reserved and cannot be {mode:?}"
            );
        }
        let shift = u32::from(pin.bit()) * 2;
        self.block(pin)
            .modify(reg::MODER, |v| write_field(v, shift, 2, mode.bits()));
        trace!("{}: mode {}", pin, mode);
    }

    /// Set push-pull or open-drain output
    pub fn configure_output_type(&mut self, pin: PinId, output_type: OutputType) {
        let shift = u32::from(pin.bit());
        self.block(pin)
            .modify(reg::OTYPER, |v| write_field(v, shift, 1, output_type.bits()));
    }

    /// Set the output slew rate
    pub fn configure_output_speed(&mut self, pin: PinId, speed: OutputSpeed) {
        let shift = u32::from(pin.bit()) * 2;
        self.block(pin)
            .modify(reg::OSPEEDR, |v| write_field(v, shift, 2, speed.bits()));
    }

    /// Set the internal pull resistor
    pub fn configure_pull(&mut self, pin: PinId, pull: Pull) {
        let shift = u32::from(pin.bit()) * 2;
        self.block(pin)
            .modify(reg::PUPDR, |v| write_field(v, shift, 2, pull.bits()));
    }

    /// Select the alternate function index
    ///
    /// # Panics
    ///
    /// If the pin is not currently in [`PinMode::AlternateFunction`].
    pub fn configure_alternate_function(&mut self, pin: PinId, af: AlternateFunction) {
        assert!(
            self.mode(pin) == PinMode::AlternateFunction,
            "contract violation: {pin} must be in alternate function mode before selecting {af:?}"
        );
        let (offset, shift) = af_location(pin);
        self.block(pin)
            .modify(offset, |v| write_field(v, shift, 4, u32::from(af.index())));
        trace!("{}: AF{}", pin, af.index());
    }

    /// Switch a pin to alternate function mode and select `af`
    pub fn configure_alternate(&mut self, pin: PinId, af: AlternateFunction) {
        self.configure_mode(pin, PinMode::AlternateFunction);
        self.configure_alternate_function(pin, af);
    }

    /// Drive the pin high
    ///
    /// Only has a visible effect while the pin is in output mode. Goes
    /// through the set/reset register, so it cannot race an interrupt that
    /// touches another pin of the same port.
    pub fn set_output(&mut self, pin: PinId) {
        self.block(pin).write(reg::BSRR, 1 << pin.bit());
    }

    /// Drive the pin low
    pub fn clear_output(&mut self, pin: PinId) {
        self.block(pin).write(reg::BSRR, 1 << (u32::from(pin.bit()) + 16));
    }

    /// Invert the driven level
    pub fn toggle_output(&mut self, pin: PinId) {
        if self.is_output_set(pin) {
            self.clear_output(pin);
        } else {
            self.set_output(pin);
        }
    }

    /// Whether the output register drives the pin high
    #[must_use]
    pub fn is_output_set(&self, pin: PinId) -> bool {
        self.block(pin).read(reg::ODR) & (1 << pin.bit()) != 0
    }

    /// Read the pin level, whatever its mode
    #[must_use]
    pub fn read_input(&self, pin: PinId) -> bool {
        self.block(pin).read(reg::IDR) & (1 << pin.bit()) != 0
    }

    /// Current pin mode, read from hardware
    #[must_use]
    pub fn mode(&self, pin: PinId) -> PinMode {
        let moder = self.block(pin).read(reg::MODER);
        PinMode::from_bits(read_field(moder, u32::from(pin.bit()) * 2, 2))
    }

    /// Current output type, read from hardware
    #[must_use]
    pub fn output_type(&self, pin: PinId) -> OutputType {
        if self.block(pin).read(reg::OTYPER) & (1 << pin.bit()) == 0 {
            OutputType::PushPull
        } else {
            OutputType::OpenDrain
        }
    }

    /// Current output speed, read from hardware
    #[must_use]
    pub fn output_speed(&self, pin: PinId) -> OutputSpeed {
        let ospeedr = self.block(pin).read(reg::OSPEEDR);
        OutputSpeed::from_bits(read_field(ospeedr, u32::from(pin.bit()) * 2, 2))
    }

    /// Current pull configuration, read from hardware
    #[must_use]
    pub fn pull(&self, pin: PinId) -> Pull {
        let pupdr = self.block(pin).read(reg::PUPDR);
        Pull::from_bits(read_field(pupdr, u32::from(pin.bit()) * 2, 2))
    }

    /// Currently selected alternate function, read from hardware
    #[must_use]
    pub fn alternate_function(&self, pin: PinId) -> AlternateFunction {
        let (offset, shift) = af_location(pin);
        let index = read_field(self.block(pin).read(offset), shift, 4);
        // A 4-bit field is always a valid index
        AlternateFunction::new(index as u8).unwrap_or(AlternateFunction::AF0)
    }

    /// Borrow one pin through the `embedded-hal` digital traits
    pub fn pin(&mut self, pin: PinId) -> Pin<'_, R> {
        Pin {
            block: &self.ports[pin.port().index() as usize],
            bit: pin.bit(),
        }
    }
}

/// AF register offset and bit shift for a pin
///
/// Pins 0..8 live in AFRL, pins 8..16 in AFRH, four bits each.
const fn af_location(pin: PinId) -> (usize, u32) {
    let bit = pin.bit();
    let offset = if bit < 8 { reg::AFRL } else { reg::AFRH };
    (offset, (bit as u32 % 8) * 4)
}

/// A single pin borrowed from [`Gpio`]
///
/// Does not change the pin mode; configure it first.
pub struct Pin<'a, R> {
    block: &'a R,
    bit: u8,
}

impl<R: RegisterBlock> embedded_hal::digital::ErrorType for Pin<'_, R> {
    type Error = Infallible;
}

impl<R: RegisterBlock> embedded_hal::digital::OutputPin for Pin<'_, R> {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.block.write(reg::BSRR, 1 << self.bit);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.block.write(reg::BSRR, 1 << (u32::from(self.bit) + 16));
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_hal::digital::StatefulOutputPin for Pin<'_, R> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.block.read(reg::ODR) & (1 << self.bit) != 0)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        self.is_set_high().map(|high| !high)
    }
}

impl<R: RegisterBlock> embedded_hal::digital::InputPin for Pin<'_, R> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.block.read(reg::IDR) & (1 << self.bit) != 0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}
