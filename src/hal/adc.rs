//! ADC Engine
//!
//! Drives the three 12-bit converters: clock gating, single/continuous
//! mode, the ordered regular sequence and software-triggered conversions.
//! Completion is observed either by polling the EOC flag
//! ([`Adc::read_result`], [`Adc::try_read_result`]) or from the shared ADC
//! interrupt through [`service_completions`]. Do not mix the two on the
//! same unit: the flag read-then-clear is not atomic between them.
//!
//! For the interrupt path the handler must own the units it services. Move
//! the handles into a `critical_section::Mutex<RefCell<Option<[Adc<Mmio>; N]>>>`
//! static after setup, borrow it inside the ADC vector and pass the array
//! to [`service_completions`] together with a `static` [`LatchedResults`].
//! Thread code then reads samples with [`LatchedResults::take`] and never
//! touches the borrowed handles.
//!
//! Per-unit software view:
//!
//! ```text
//! Disabled --enable()--> Idle --start_conversion()--> Converting
//!    ^                    ^                               |
//!    |                    +------clear_completion()-------+
//!    +-----disable()---------------------------------------
//! ```

use core::cell::Cell;
use core::convert::Infallible;

use critical_section::Mutex;

use crate::config::{memory_map, ADC_TOTAL_CHANNELS, NUM_ADC_UNITS};
use crate::hal::gpio::{Gpio, PinMode};
use crate::hal::rcc::{Bus, Rcc};
use crate::hal::reg::{read_field, write_field, RegisterBlock};
use crate::types::{AdcChannel, AdcReading, PinId};

/// Register offsets and bits within an ADC block
mod reg {
    pub const SR: usize = 0x00;
    pub const CR1: usize = 0x04;
    pub const CR2: usize = 0x08;
    pub const SQR1: usize = 0x2C;
    pub const SQR2: usize = 0x30;
    pub const SQR3: usize = 0x34;
    pub const DR: usize = 0x4C;

    pub const SR_EOC: u32 = 1 << 1;
    pub const CR1_EOCIE: u32 = 1 << 5;
    pub const CR1_SCAN: u32 = 1 << 8;
    pub const CR2_ADON: u32 = 1 << 0;
    pub const CR2_CONT: u32 = 1 << 1;
    pub const CR2_EOCS: u32 = 1 << 10;
    pub const CR2_SWSTART: u32 = 1 << 30;

    /// Width of one sequence slot
    pub const SQ_WIDTH: u32 = 5;
    /// Sequence length field L[3:0] in SQR1
    pub const SQR1_L_SHIFT: u32 = 20;
    pub const SQR1_L_WIDTH: u32 = 4;
}

/// ADC unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum AdcUnit {
    /// ADC1 (also owns the internal channels)
    Adc1,
    /// ADC2
    Adc2,
    /// ADC3
    Adc3,
}

impl AdcUnit {
    /// All units, in interrupt service priority order
    pub const ALL: [Self; NUM_ADC_UNITS] = [Self::Adc1, Self::Adc2, Self::Adc3];

    /// Zero-based unit index
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Register block base address
    #[must_use]
    pub const fn base_address(self) -> usize {
        match self {
            Self::Adc1 => memory_map::ADC1,
            Self::Adc2 => memory_map::ADC2,
            Self::Adc3 => memory_map::ADC3,
        }
    }

    /// Clock gate (APB2ENR ADCxEN)
    #[must_use]
    pub const fn clock_gate(self) -> (Bus, u32) {
        match self {
            Self::Adc1 => (Bus::Apb2, 8),
            Self::Adc2 => (Bus::Apb2, 9),
            Self::Adc3 => (Bus::Apb2, 10),
        }
    }

    /// GPIO pin wired to `channel` on this unit
    ///
    /// Returns None for the internal channels.
    #[must_use]
    pub const fn channel_pin(self, channel: AdcChannel) -> Option<PinId> {
        let pin = match (self, channel.index()) {
            (_, 0) => PinId::PA0,
            (_, 1) => PinId::PA1,
            (_, 2) => PinId::PA2,
            (_, 3) => PinId::PA3,
            (Self::Adc3, 4) => PinId::PF6,
            (Self::Adc3, 5) => PinId::PF7,
            (Self::Adc3, 6) => PinId::PF8,
            (Self::Adc3, 7) => PinId::PF9,
            (Self::Adc3, 8) => PinId::PF10,
            (Self::Adc3, 9) => PinId::PF3,
            (Self::Adc3, 14) => PinId::PF4,
            (Self::Adc3, 15) => PinId::PF5,
            (_, 4) => PinId::PA4,
            (_, 5) => PinId::PA5,
            (_, 6) => PinId::PA6,
            (_, 7) => PinId::PA7,
            (_, 8) => PinId::PB0,
            (_, 9) => PinId::PB1,
            (_, 10) => PinId::PC0,
            (_, 11) => PinId::PC1,
            (_, 12) => PinId::PC2,
            (_, 13) => PinId::PC3,
            (_, 14) => PinId::PC4,
            (_, 15) => PinId::PC5,
            _ => return None,
        };
        Some(pin)
    }
}

/// Conversion mode (CR2.CONT)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum ConversionMode {
    /// One trigger, one sequence
    #[default]
    Single,
    /// Restart automatically after each completion
    Continuous,
}

/// Software view of a unit's lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum AdcState {
    /// Converter powered down
    #[default]
    Disabled,
    /// Powered, waiting for a trigger
    Idle,
    /// Conversion triggered, result not yet consumed
    Converting,
}

/// One ADC unit
pub struct Adc<R> {
    unit: AdcUnit,
    regs: R,
    state: AdcState,
}

impl<R: RegisterBlock> Adc<R> {
    /// Wrap the register block of `unit`
    #[must_use]
    pub const fn new(unit: AdcUnit, regs: R) -> Self {
        Self {
            unit,
            regs,
            state: AdcState::Disabled,
        }
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    /// Which unit this handle drives
    #[must_use]
    pub const fn unit(&self) -> AdcUnit {
        self.unit
    }

    /// Current software state
    #[must_use]
    pub const fn state(&self) -> AdcState {
        self.state
    }

    /// Enable the unit's clock gate
    pub fn init<C: RegisterBlock>(&mut self, rcc: &mut Rcc<C>) {
        rcc.enable_adc(self.unit);
        debug!("{}: clock enabled", self.unit);
    }

    /// Put the GPIO pin of `channel` into analog mode
    ///
    /// Returns the routed pin, or None for internal channels.
    pub fn route_channel<G: RegisterBlock>(
        &self,
        gpio: &mut Gpio<G>,
        channel: AdcChannel,
    ) -> Option<PinId> {
        let pin = self.unit.channel_pin(channel)?;
        gpio.configure_mode(pin, PinMode::Analog);
        debug!("{}: IN{} routed to {}", self.unit, channel.index(), pin);
        Some(pin)
    }

    /// Power the converter on (ADON)
    pub fn enable(&mut self) {
        self.regs.set_bits(reg::CR2, reg::CR2_ADON);
        self.state = AdcState::Idle;
    }

    /// Power the converter off
    pub fn disable(&mut self) {
        self.regs.clear_bits(reg::CR2, reg::CR2_ADON);
        self.state = AdcState::Disabled;
    }

    /// Whether ADON is set in hardware
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.regs.is_set(reg::CR2, reg::CR2_ADON)
    }

    /// One trigger produces one completion
    pub fn set_single_conversion_mode(&mut self) {
        self.regs.clear_bits(reg::CR2, reg::CR2_CONT);
    }

    /// The unit restarts after every completion
    pub fn set_continuous_conversion_mode(&mut self) {
        self.regs.set_bits(reg::CR2, reg::CR2_CONT);
    }

    /// Current conversion mode, read from hardware
    #[must_use]
    pub fn conversion_mode(&self) -> ConversionMode {
        if self.regs.is_set(reg::CR2, reg::CR2_CONT) {
            ConversionMode::Continuous
        } else {
            ConversionMode::Single
        }
    }

    /// Program the regular sequence
    ///
    /// Slot order is conversion order: `channels[0]` goes into SQ1,
    /// `channels[1]` into SQ2 and so on, packed 5 bits per slot across
    /// SQR3 (SQ1-6), SQR2 (SQ7-12) and SQR1 (SQ13-16). The length field
    /// L in SQR1 receives `len - 1`. Scan mode and end-of-each-conversion
    /// flags are enabled for sequences longer than one.
    ///
    /// # Panics
    ///
    /// If `channels` is empty or has 16 or more entries.
    pub fn set_channel_sequence(&mut self, channels: &[AdcChannel]) {
        let len = channels.len();
        assert!(
            len > 0 && len < ADC_TOTAL_CHANNELS,
            "contract violation: sequence length {len} outside 1..{ADC_TOTAL_CHANNELS}"
        );

        self.regs.write(reg::SQR1, 0);
        self.regs.write(reg::SQR2, 0);
        self.regs.write(reg::SQR3, 0);

        for (slot, channel) in channels.iter().enumerate() {
            let (offset, shift) = slot_location(slot);
            self.regs.modify(offset, |v| {
                write_field(v, shift, reg::SQ_WIDTH, u32::from(channel.index()))
            });
        }

        self.regs.modify(reg::SQR1, |v| {
            write_field(v, reg::SQR1_L_SHIFT, reg::SQR1_L_WIDTH, (len - 1) as u32)
        });

        if len > 1 {
            self.regs.set_bits(reg::CR1, reg::CR1_SCAN);
            self.regs.set_bits(reg::CR2, reg::CR2_EOCS);
        } else {
            self.regs.clear_bits(reg::CR1, reg::CR1_SCAN);
            self.regs.clear_bits(reg::CR2, reg::CR2_EOCS);
        }
        debug!("{}: sequence of {} channel(s)", self.unit, len);
    }

    /// Decode the programmed sequence back from the registers
    #[must_use]
    pub fn channel_sequence(&self) -> heapless::Vec<AdcChannel, ADC_TOTAL_CHANNELS> {
        let len = read_field(
            self.regs.read(reg::SQR1),
            reg::SQR1_L_SHIFT,
            reg::SQR1_L_WIDTH,
        ) as usize
            + 1;
        let mut sequence = heapless::Vec::new();
        for slot in 0..len {
            let (offset, shift) = slot_location(slot);
            let index = read_field(self.regs.read(offset), shift, reg::SQ_WIDTH);
            if let Some(channel) = AdcChannel::new(index as u8) {
                // len <= 16 == capacity
                let _ = sequence.push(channel);
            }
        }
        sequence
    }

    /// Trigger a conversion (SWSTART)
    ///
    /// A completion flag left over from an unread conversion is dropped
    /// first, so the next EOC observed belongs to this trigger. On a
    /// disabled unit nothing is written and the state stays `Disabled`.
    pub fn start_conversion(&mut self) {
        if self.state == AdcState::Disabled {
            warn!("{}: start_conversion while disabled, ignored", self.unit);
            return;
        }
        self.regs.clear_bits(reg::SR, reg::SR_EOC);
        self.regs.set_bits(reg::CR2, reg::CR2_SWSTART);
        self.state = AdcState::Converting;
    }

    /// Non-blocking read of the completion flag
    #[must_use]
    pub fn completion_status(&self) -> bool {
        self.regs.is_set(reg::SR, reg::SR_EOC)
    }

    /// Clear the completion flag
    ///
    /// Only the EOC bit is cleared; the other status bits are written back
    /// unchanged.
    pub fn clear_completion(&mut self) {
        self.regs.clear_bits(reg::SR, reg::SR_EOC);
        if self.state == AdcState::Converting
            && self.conversion_mode() == ConversionMode::Single
        {
            self.state = AdcState::Idle;
        }
    }

    /// Take the result if a conversion has completed
    ///
    /// # Errors
    ///
    /// `WouldBlock` while the conversion is still running.
    pub fn try_read_result(&mut self) -> nb::Result<AdcReading, Infallible> {
        if !self.completion_status() {
            return Err(nb::Error::WouldBlock);
        }
        self.clear_completion();
        Ok(AdcReading::from_register(self.regs.read(reg::DR)))
    }

    /// Wait for the conversion to complete and return its result
    ///
    /// Blocks the calling context until EOC is set. There is no timeout.
    pub fn read_result(&mut self) -> AdcReading {
        match nb::block!(self.try_read_result()) {
            Ok(reading) => reading,
            Err(never) => match never {},
        }
    }

    /// Raise the shared ADC interrupt on end of conversion
    ///
    /// The NVIC line itself is left to the caller.
    pub fn enable_completion_interrupt(&mut self) {
        self.regs.set_bits(reg::CR1, reg::CR1_EOCIE);
    }

    /// Stop raising the end of conversion interrupt
    pub fn disable_completion_interrupt(&mut self) {
        self.regs.clear_bits(reg::CR1, reg::CR1_EOCIE);
    }
}

/// Register offset and bit shift of sequence slot `slot` (0-based)
const fn slot_location(slot: usize) -> (usize, u32) {
    let (offset, first) = if slot < 6 {
        (reg::SQR3, 0)
    } else if slot < 12 {
        (reg::SQR2, 6)
    } else {
        (reg::SQR1, 12)
    };
    (offset, ((slot - first) as u32) * reg::SQ_WIDTH)
}

/// Per-unit results latched by the interrupt path
///
/// Each slot holds the most recent unread sample; a newer completion
/// overwrites an unread one.
pub struct LatchedResults {
    slots: [Mutex<Cell<Option<AdcReading>>>; NUM_ADC_UNITS],
}

impl LatchedResults {
    /// Create with every slot empty
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [
                Mutex::new(Cell::new(None)),
                Mutex::new(Cell::new(None)),
                Mutex::new(Cell::new(None)),
            ],
        }
    }

    /// Store a sample for `unit`
    pub fn latch(&self, unit: AdcUnit, reading: AdcReading) {
        critical_section::with(|cs| self.slots[unit.index()].borrow(cs).set(Some(reading)));
    }

    /// Remove and return the latest sample for `unit`
    pub fn take(&self, unit: AdcUnit) -> Option<AdcReading> {
        critical_section::with(|cs| self.slots[unit.index()].borrow(cs).take())
    }

    /// Latest sample for `unit` without consuming it
    #[must_use]
    pub fn peek(&self, unit: AdcUnit) -> Option<AdcReading> {
        critical_section::with(|cs| self.slots[unit.index()].borrow(cs).get())
    }
}

impl Default for LatchedResults {
    fn default() -> Self {
        Self::new()
    }
}

/// Service the shared ADC interrupt
///
/// Checks every unit in fixed order ADC1, ADC2, ADC3 and, for each one
/// whose completion flag is set, clears the flag and latches the result.
/// All pending units are serviced in the same entry, so a simultaneous
/// completion on ADC3 is not deferred to the next interrupt. Returns how
/// many units were serviced.
pub fn service_completions<R: RegisterBlock>(
    units: &mut [Adc<R>],
    latched: &LatchedResults,
) -> usize {
    let mut serviced = 0;
    for unit in AdcUnit::ALL {
        for adc in units.iter_mut().filter(|adc| adc.unit() == unit) {
            if let Ok(reading) = adc.try_read_result() {
                latched.latch(unit, reading);
                serviced += 1;
            }
        }
    }
    serviced
}
