//! Simulated register blocks for host tests
//!
//! A [`SimBlock`] stores registers in a map and imitates just enough of the
//! peripheral's hardware side effects for the drivers to make progress.
//! Clones share state, so a test keeps one clone to inspect registers while
//! the driver owns another.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use daq_firmware::hal::gpio::Gpio;
use daq_firmware::hal::rcc::Rcc;
use daq_firmware::hal::reg::RegisterBlock;

/// Which hardware side effects to imitate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Storage only
    Plain,
    /// IDR mirrors ODR, BSRR updates ODR
    Gpio,
    /// SWSTART with ADON completes a conversion immediately
    Adc,
    /// TX always ready, RX served from a queue
    Usart,
    /// Ready flags follow their enable bits, SWS follows SW
    Rcc,
    /// Over-drive ready flags follow their enable bits
    Pwr,
}

#[derive(Default)]
struct State {
    regs: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    tx: Vec<u32>,
    rx: VecDeque<u16>,
    adc_sample: u32,
    conversions: u32,
}

/// Shared simulated register block
#[derive(Clone)]
pub struct SimBlock {
    behavior: Behavior,
    state: Rc<RefCell<State>>,
}

// GPIO
const IDR: usize = 0x10;
const ODR: usize = 0x14;
const BSRR: usize = 0x18;

// ADC
const ADC_SR: usize = 0x00;
const ADC_CR2: usize = 0x08;
const ADC_DR: usize = 0x4C;
const ADC_EOC: u32 = 1 << 1;
const ADC_ADON: u32 = 1 << 0;
const ADC_SWSTART: u32 = 1 << 30;

// USART
const USART_SR: usize = 0x00;
const USART_DR: usize = 0x04;
const USART_RXNE: u32 = 1 << 5;
const USART_TC: u32 = 1 << 6;
const USART_TXE: u32 = 1 << 7;

// RCC
const RCC_CR: usize = 0x00;
const RCC_CFGR: usize = 0x08;

// PWR
const PWR_CR: usize = 0x00;
const PWR_CSR: usize = 0x04;

impl SimBlock {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            state: Rc::new(RefCell::new(State::default())),
        }
    }

    pub fn plain() -> Self {
        Self::new(Behavior::Plain)
    }

    pub fn gpio() -> Self {
        Self::new(Behavior::Gpio)
    }

    pub fn adc() -> Self {
        Self::new(Behavior::Adc)
    }

    pub fn usart() -> Self {
        Self::new(Behavior::Usart)
    }

    pub fn rcc() -> Self {
        Self::new(Behavior::Rcc)
    }

    pub fn pwr() -> Self {
        Self::new(Behavior::Pwr)
    }

    /// Register value without side effects
    pub fn peek(&self, offset: usize) -> u32 {
        self.state.borrow().regs.get(&offset).copied().unwrap_or(0)
    }

    /// Set a register without side effects
    pub fn poke(&self, offset: usize, value: u32) {
        self.state.borrow_mut().regs.insert(offset, value);
    }

    /// Every driver write, in order
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state.borrow().writes.clone()
    }

    /// Every data register write of a USART
    pub fn tx_words(&self) -> Vec<u32> {
        self.state.borrow().tx.clone()
    }

    /// Transmitted bytes of a USART
    pub fn tx_bytes(&self) -> Vec<u8> {
        self.state.borrow().tx.iter().map(|&w| (w & 0xFF) as u8).collect()
    }

    /// Queue bytes for a USART to receive
    pub fn feed_rx(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().map(|&b| u16::from(b)));
    }

    /// Queue raw 9-bit frames for the USART receive side
    pub fn feed_rx_words(&self, words: &[u16]) {
        self.state.borrow_mut().rx.extend(words.iter().copied());
    }

    /// Bytes still waiting in the receive queue
    pub fn rx_pending(&self) -> usize {
        self.state.borrow().rx.len()
    }

    /// Data register content of the next ADC conversion
    pub fn set_adc_sample(&self, sample: u32) {
        self.state.borrow_mut().adc_sample = sample;
    }

    /// Completed ADC conversions
    pub fn conversions(&self) -> u32 {
        self.state.borrow().conversions
    }
}

impl RegisterBlock for SimBlock {
    fn read(&self, offset: usize) -> u32 {
        let mut state = self.state.borrow_mut();
        let stored = state.regs.get(&offset).copied().unwrap_or(0);
        match (self.behavior, offset) {
            (Behavior::Gpio, IDR) => state.regs.get(&ODR).copied().unwrap_or(0),
            (Behavior::Usart, USART_SR) => {
                let rx = if state.rx.is_empty() { 0 } else { USART_RXNE };
                stored | USART_TXE | USART_TC | rx
            }
            (Behavior::Usart, USART_DR) => state.rx.pop_front().map_or(0, u32::from),
            _ => stored,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        state.writes.push((offset, value));
        match (self.behavior, offset) {
            (Behavior::Gpio, BSRR) => {
                let odr = state.regs.get(&ODR).copied().unwrap_or(0);
                let odr = (odr | (value & 0xFFFF)) & !(value >> 16);
                state.regs.insert(ODR, odr);
            }
            (Behavior::Adc, ADC_CR2) if value & ADC_SWSTART != 0 && value & ADC_ADON != 0 => {
                state.regs.insert(ADC_CR2, value & !ADC_SWSTART);
                let sr = state.regs.get(&ADC_SR).copied().unwrap_or(0);
                state.regs.insert(ADC_SR, sr | ADC_EOC);
                let sample = state.adc_sample;
                state.regs.insert(ADC_DR, sample);
                state.conversions += 1;
            }
            (Behavior::Usart, USART_DR) => state.tx.push(value),
            (Behavior::Rcc, RCC_CR) => {
                // HSION -> HSIRDY, PLLON -> PLLRDY
                let ready = ((value & 1) << 1) | ((value & (1 << 24)) << 1);
                state.regs.insert(RCC_CR, value | ready);
            }
            (Behavior::Rcc, RCC_CFGR) => {
                state.regs.insert(RCC_CFGR, (value & !0b1100) | ((value & 0b11) << 2));
            }
            (Behavior::Pwr, PWR_CR) => {
                state.regs.insert(PWR_CR, value);
                state.regs.insert(PWR_CSR, value & (0b11 << 16));
            }
            _ => {
                state.regs.insert(offset, value);
            }
        }
    }
}

/// GPIO driver over eight simulated ports, plus a handle to each port
pub fn sim_gpio() -> (Gpio<SimBlock>, [SimBlock; 8]) {
    let ports: [SimBlock; 8] = std::array::from_fn(|_| SimBlock::gpio());
    (Gpio::new(ports.clone()), ports)
}

/// RCC driver over a simulated block, plus a handle to it
pub fn sim_rcc() -> (Rcc<SimBlock>, SimBlock) {
    let block = SimBlock::rcc();
    (Rcc::new(block.clone()), block)
}
