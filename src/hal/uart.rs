//! UART Engine
//!
//! Blocking byte, string and line transfer over the USART units. Each
//! blocking call has a poll-once twin returning [`nb::Result`] so callers
//! can spin, yield or time out on their own terms.

use core::convert::Infallible;

use crate::config::{memory_map, APB1_FREQ_HZ, APB2_FREQ_HZ, CONSOLE_BAUD};
use crate::hal::gpio::{Gpio, OutputSpeed};
use crate::hal::rcc::{Bus, Rcc};
use crate::hal::reg::{read_field, write_field, RegisterBlock};
use crate::types::{AlternateFunction, BaudDivisor, PinId};

/// USART register offsets and bits
mod reg {
    pub const SR: usize = 0x00;
    pub const DR: usize = 0x04;
    pub const BRR: usize = 0x08;
    pub const CR1: usize = 0x0C;

    pub const SR_RXNE: u32 = 1 << 5;
    pub const SR_TC: u32 = 1 << 6;
    pub const SR_TXE: u32 = 1 << 7;

    pub const CR1_RE: u32 = 1 << 2;
    pub const CR1_TE: u32 = 1 << 3;
    pub const CR1_M_SHIFT: u32 = 12;
    pub const CR1_UE: u32 = 1 << 13;

    /// 9-bit data field
    pub const DR_MASK: u32 = 0x1FF;
}

const fn console_divisor(pclk_hz: u32) -> BaudDivisor {
    match BaudDivisor::from_baud(pclk_hz, CONSOLE_BAUD) {
        Some(divisor) => divisor,
        None => panic!("console baud rate unreachable"),
    }
}

/// Console divisor on APB1 (mantissa 24, fraction 7 at 45 MHz)
const APB1_CONSOLE_DIVISOR: BaudDivisor = console_divisor(APB1_FREQ_HZ);

/// Console divisor on APB2
const APB2_CONSOLE_DIVISOR: BaudDivisor = console_divisor(APB2_FREQ_HZ);

/// USART unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum UartUnit {
    /// USART1 on PA9 (TX) / PA10 (RX)
    Usart1,
    /// USART2 on PA2 (TX) / PA3 (RX), the ST-LINK virtual COM port
    Usart2,
    /// USART6 on PC6 (TX) / PC7 (RX)
    Usart6,
}

impl UartUnit {
    /// Register block base address
    #[must_use]
    pub const fn base_address(self) -> usize {
        match self {
            Self::Usart1 => memory_map::USART1,
            Self::Usart2 => memory_map::USART2,
            Self::Usart6 => memory_map::USART6,
        }
    }

    /// Clock gate (APB2ENR USART1EN/USART6EN, APB1ENR USART2EN)
    #[must_use]
    pub const fn clock_gate(self) -> (Bus, u32) {
        match self {
            Self::Usart1 => (Bus::Apb2, 4),
            Self::Usart2 => (Bus::Apb1, 17),
            Self::Usart6 => (Bus::Apb2, 5),
        }
    }

    /// Transmit pin
    #[must_use]
    pub const fn tx_pin(self) -> PinId {
        match self {
            Self::Usart1 => PinId::PA9,
            Self::Usart2 => PinId::PA2,
            Self::Usart6 => PinId::PC6,
        }
    }

    /// Receive pin
    #[must_use]
    pub const fn rx_pin(self) -> PinId {
        match self {
            Self::Usart1 => PinId::PA10,
            Self::Usart2 => PinId::PA3,
            Self::Usart6 => PinId::PC7,
        }
    }

    /// Alternate function routing the unit to its pins
    #[must_use]
    pub const fn alternate_function(self) -> AlternateFunction {
        match self {
            Self::Usart1 | Self::Usart2 => AlternateFunction::AF7,
            Self::Usart6 => AlternateFunction::AF8,
        }
    }

    /// Peripheral clock feeding the baud generator
    #[must_use]
    pub const fn pclk_hz(self) -> u32 {
        match self.clock_gate().0 {
            Bus::Apb1 => APB1_FREQ_HZ,
            _ => APB2_FREQ_HZ,
        }
    }

    /// Divisor for the console baud rate on this unit's bus
    #[must_use]
    pub const fn console_divisor(self) -> BaudDivisor {
        match self.clock_gate().0 {
            Bus::Apb1 => APB1_CONSOLE_DIVISOR,
            _ => APB2_CONSOLE_DIVISOR,
        }
    }
}

/// Frame word length (CR1.M)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum WordLength {
    /// 8 data bits
    #[default]
    Eight,
    /// 9 data bits
    Nine,
}

impl WordLength {
    /// Get register value
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Eight => 0,
            Self::Nine => 1,
        }
    }
}

/// One USART unit
pub struct Uart<R> {
    unit: UartUnit,
    regs: R,
}

impl<R: RegisterBlock> Uart<R> {
    /// Wrap the register block of `unit`
    #[must_use]
    pub const fn new(unit: UartUnit, regs: R) -> Self {
        Self { unit, regs }
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    /// Which unit this handle drives
    #[must_use]
    pub const fn unit(&self) -> UartUnit {
        self.unit
    }

    /// Enable the unit's clock and route its two pins
    ///
    /// The pins' ports are clocked first, then both pins go to alternate
    /// function mode with the unit's AF index at high output speed.
    pub fn init<C, G>(&mut self, rcc: &mut Rcc<C>, gpio: &mut Gpio<G>)
    where
        C: RegisterBlock,
        G: RegisterBlock,
    {
        rcc.enable_uart(self.unit);
        let af = self.unit.alternate_function();
        for pin in [self.unit.tx_pin(), self.unit.rx_pin()] {
            gpio.init_port(rcc, pin.port());
            gpio.configure_alternate(pin, af);
            gpio.configure_output_speed(pin, OutputSpeed::High);
        }
        debug!(
            "{}: TX {} RX {} AF{}",
            self.unit,
            self.unit.tx_pin(),
            self.unit.rx_pin(),
            af.index()
        );
    }

    /// Set word length and baud divisor
    ///
    /// Takes effect immediately; do not call with a transfer in flight.
    pub fn configure(&mut self, word_length: WordLength, divisor: BaudDivisor) {
        self.regs.modify(reg::CR1, |v| {
            write_field(v, reg::CR1_M_SHIFT, 1, word_length.bits())
        });
        self.regs.write(reg::BRR, u32::from(divisor.bits()));
        debug!(
            "{}: {} data bits, BRR {=u16:#x}",
            self.unit,
            if word_length == WordLength::Nine { 9u8 } else { 8u8 },
            divisor.bits()
        );
    }

    /// Clear the whole control register (unit, TX and RX off, 8 bits)
    pub fn reset(&mut self) {
        self.regs.write(reg::CR1, 0);
    }

    /// Enable the unit (UE)
    pub fn enable(&mut self) {
        self.regs.set_bits(reg::CR1, reg::CR1_UE);
    }

    /// Disable the unit
    pub fn disable(&mut self) {
        self.regs.clear_bits(reg::CR1, reg::CR1_UE);
    }

    /// Enable the transmitter (TE)
    pub fn enable_transmitter(&mut self) {
        self.regs.set_bits(reg::CR1, reg::CR1_TE);
    }

    /// Enable the receiver (RE)
    pub fn enable_receiver(&mut self) {
        self.regs.set_bits(reg::CR1, reg::CR1_RE);
    }

    /// Bring the unit up as an 8N1 console at the default baud rate
    pub fn quick_default_config<C, G>(&mut self, rcc: &mut Rcc<C>, gpio: &mut Gpio<G>)
    where
        C: RegisterBlock,
        G: RegisterBlock,
    {
        self.init(rcc, gpio);
        self.reset();
        self.enable();
        self.configure(WordLength::Eight, self.unit.console_divisor());
        self.enable_transmitter();
        self.enable_receiver();
        info!("{}: console at {} baud", self.unit, CONSOLE_BAUD);
    }

    /// Whether the unit is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.regs.is_set(reg::CR1, reg::CR1_UE)
    }

    /// Whether the transmitter is enabled
    #[must_use]
    pub fn is_transmitter_enabled(&self) -> bool {
        self.regs.is_set(reg::CR1, reg::CR1_TE)
    }

    /// Whether the receiver is enabled
    #[must_use]
    pub fn is_receiver_enabled(&self) -> bool {
        self.regs.is_set(reg::CR1, reg::CR1_RE)
    }

    /// Configured word length, read from hardware
    #[must_use]
    pub fn word_length(&self) -> WordLength {
        if read_field(self.regs.read(reg::CR1), reg::CR1_M_SHIFT, 1) == 0 {
            WordLength::Eight
        } else {
            WordLength::Nine
        }
    }

    /// Configured baud divisor, read from hardware
    #[must_use]
    pub fn divisor(&self) -> BaudDivisor {
        let brr = self.regs.read(reg::BRR);
        let mantissa = read_field(brr, 4, 12) as u16;
        let fraction = read_field(brr, 0, 4) as u8;
        // Field widths keep both parts in range
        BaudDivisor::from_parts(mantissa, fraction).unwrap_or(APB1_CONSOLE_DIVISOR)
    }

    /// Whether the last frame has fully left the shift register (TC)
    #[must_use]
    pub fn is_transmit_complete(&self) -> bool {
        self.regs.is_set(reg::SR, reg::SR_TC)
    }

    /// Whether a received byte is waiting (RXNE)
    #[must_use]
    pub fn is_data_ready(&self) -> bool {
        self.regs.is_set(reg::SR, reg::SR_RXNE)
    }

    /// Queue one byte if the data register is free
    ///
    /// # Errors
    ///
    /// `WouldBlock` while the previous byte is still in the data register.
    pub fn try_send_byte(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        if !self.regs.is_set(reg::SR, reg::SR_TXE) {
            return Err(nb::Error::WouldBlock);
        }
        self.regs.write(reg::DR, u32::from(byte));
        Ok(())
    }

    /// Take one received byte if there is one
    ///
    /// # Errors
    ///
    /// `WouldBlock` until a byte has arrived.
    pub fn try_receive_byte(&mut self) -> nb::Result<u8, Infallible> {
        if !self.is_data_ready() {
            return Err(nb::Error::WouldBlock);
        }
        Ok((self.regs.read(reg::DR) & 0xFF) as u8)
    }

    /// Take one received 9-bit frame if there is one
    ///
    /// With an 8-bit word length bit 8 reads as zero.
    ///
    /// # Errors
    ///
    /// `WouldBlock` until a frame has arrived.
    pub fn try_receive_word(&mut self) -> nb::Result<u16, Infallible> {
        if !self.is_data_ready() {
            return Err(nb::Error::WouldBlock);
        }
        Ok((self.regs.read(reg::DR) & reg::DR_MASK) as u16)
    }

    fn wait_transmit_complete(&self) {
        while !self.is_transmit_complete() {
            core::hint::spin_loop();
        }
    }

    /// Send one frame and wait until it has left the wire
    pub fn send_byte(&mut self, byte: u8) {
        match nb::block!(self.try_send_byte(byte)) {
            Ok(()) => {}
            Err(never) => match never {},
        }
        self.wait_transmit_complete();
    }

    /// Send one 9-bit frame
    ///
    /// Bits above 8 are dropped; with an 8-bit word length bit 8 is ignored
    /// by the hardware.
    pub fn send_word(&mut self, word: u16) {
        while !self.regs.is_set(reg::SR, reg::SR_TXE) {
            core::hint::spin_loop();
        }
        self.regs.write(reg::DR, u32::from(word) & reg::DR_MASK);
        self.wait_transmit_complete();
    }

    /// Send every byte of `bytes`, one blocking frame at a time
    pub fn send_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_byte(byte);
        }
    }

    /// Send `text` up to (not including) the first NUL, if any
    pub fn send_string(&mut self, text: &str) {
        for byte in text.bytes().take_while(|&b| b != 0) {
            self.send_byte(byte);
        }
    }

    /// Wait for one byte
    pub fn receive_byte(&mut self) -> u8 {
        match nb::block!(self.try_receive_byte()) {
            Ok(byte) => byte,
            Err(never) => match never {},
        }
    }

    /// Wait for one 9-bit frame
    pub fn receive_word(&mut self) -> u16 {
        match nb::block!(self.try_receive_word()) {
            Ok(word) => word,
            Err(never) => match never {},
        }
    }

    /// Read a line into `buf`, echoing as it goes
    ///
    /// Stops at a newline, which is not stored and is echoed as `"\n\r"`,
    /// or once `buf.len() - 1` bytes have been stored. A NUL terminator is
    /// always written after the stored bytes. Returns the number of bytes
    /// stored before the terminator. Blocks with no timeout.
    ///
    /// # Panics
    ///
    /// If `buf` is empty.
    pub fn receive_line(&mut self, buf: &mut [u8]) -> usize {
        assert!(
            !buf.is_empty(),
            "contract violation: receive_line needs room for the terminator"
        );
        let capacity = buf.len() - 1;
        let mut count = 0;
        while count < capacity {
            let byte = self.receive_byte();
            if byte == b'\n' {
                self.send_bytes(b"\n\r");
                break;
            }
            self.send_byte(byte);
            buf[count] = byte;
            count += 1;
        }
        buf[count] = 0;
        count
    }
}

impl<R: RegisterBlock> core::fmt::Write for Uart<R> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.send_bytes(s.as_bytes());
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_io::ErrorType for Uart<R> {
    type Error = Infallible;
}

impl<R: RegisterBlock> embedded_io::Read for Uart<R> {
    /// Blocks for the first byte, then takes whatever else is already there
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some((first, rest)) = buf.split_first_mut() else {
            return Ok(0);
        };
        *first = self.receive_byte();
        let mut count = 1;
        for slot in rest {
            match self.try_receive_byte() {
                Ok(byte) => {
                    *slot = byte;
                    count += 1;
                }
                Err(_) => break,
            }
        }
        Ok(count)
    }
}

impl<R: RegisterBlock> embedded_io::Write for Uart<R> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.send_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.wait_transmit_complete();
        Ok(())
    }
}
