//! ADC Engine Tests
//!
//! Tests for channel sequencing, conversion acquisition and interrupt
//! servicing against simulated converter registers.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test adc_tests

mod common;

use common::{sim_gpio, sim_rcc, SimBlock};
use daq_firmware::config::ADC_TOTAL_CHANNELS;
use daq_firmware::hal::adc::{
    service_completions, Adc, AdcState, AdcUnit, ConversionMode, LatchedResults,
};
use daq_firmware::hal::gpio::PinMode;
use daq_firmware::types::{AdcChannel, PinId};
use proptest::prelude::*;

const SR: usize = 0x00;
const CR1: usize = 0x04;
const CR2: usize = 0x08;
const SQR1: usize = 0x2C;
const SQR2: usize = 0x30;
const SQR3: usize = 0x34;

const EOC: u32 = 1 << 1;
const EOCIE: u32 = 1 << 5;
const SCAN: u32 = 1 << 8;
const ADON: u32 = 1 << 0;
const CONT: u32 = 1 << 1;
const SWSTART: u32 = 1 << 30;

const APB2ENR: usize = 0x44;

fn sim_adc(unit: AdcUnit) -> (Adc<SimBlock>, SimBlock) {
    let block = SimBlock::adc();
    (Adc::new(unit, block.clone()), block)
}

fn channels(indices: &[u8]) -> Vec<AdcChannel> {
    indices.iter().map(|&i| AdcChannel::new(i).unwrap()).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn test_init_enables_clock_gate() {
    let (mut rcc, rcc_regs) = sim_rcc();
    for unit in AdcUnit::ALL {
        let (mut adc, _) = sim_adc(unit);
        adc.init(&mut rcc);
    }
    assert_eq!(rcc_regs.peek(APB2ENR), 0b111 << 8);
}

#[test]
fn test_unit_bases() {
    assert_eq!(AdcUnit::Adc1.base_address(), 0x4001_2000);
    assert_eq!(AdcUnit::Adc2.base_address(), 0x4001_2100);
    assert_eq!(AdcUnit::Adc3.base_address(), 0x4001_2200);
}

#[test]
fn test_enable_disable_state() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    assert_eq!(adc.state(), AdcState::Disabled);

    adc.enable();
    assert_eq!(adc.state(), AdcState::Idle);
    assert!(adc.is_enabled());
    assert_eq!(regs.peek(CR2) & ADON, ADON);

    adc.disable();
    assert_eq!(adc.state(), AdcState::Disabled);
    assert_eq!(regs.peek(CR2) & ADON, 0);
}

#[test]
fn test_conversion_mode() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc2);

    adc.set_continuous_conversion_mode();
    assert_eq!(regs.peek(CR2) & CONT, CONT);
    assert_eq!(adc.conversion_mode(), ConversionMode::Continuous);

    adc.set_single_conversion_mode();
    assert_eq!(regs.peek(CR2) & CONT, 0);
    assert_eq!(adc.conversion_mode(), ConversionMode::Single);
}

// =============================================================================
// Channel Routing Tests
// =============================================================================

#[test]
fn test_channel_pins_adc1() {
    let pin = |i| AdcUnit::Adc1.channel_pin(AdcChannel::new(i).unwrap());
    assert_eq!(pin(0), Some(PinId::PA0));
    assert_eq!(pin(7), Some(PinId::PA7));
    assert_eq!(pin(8), Some(PinId::PB0));
    assert_eq!(pin(9), Some(PinId::PB1));
    assert_eq!(pin(10), Some(PinId::PC0));
    assert_eq!(pin(15), Some(PinId::PC5));
    assert_eq!(pin(16), None);
}

#[test]
fn test_channel_pins_adc3() {
    let pin = |i| AdcUnit::Adc3.channel_pin(AdcChannel::new(i).unwrap());
    assert_eq!(pin(3), Some(PinId::PA3));
    assert_eq!(pin(4), Some(PinId::PF6));
    assert_eq!(pin(8), Some(PinId::PF10));
    assert_eq!(pin(9), Some(PinId::PF3));
    assert_eq!(pin(13), Some(PinId::PC3));
    assert_eq!(pin(14), Some(PinId::PF4));
    assert_eq!(pin(15), Some(PinId::PF5));
}

#[test]
fn test_route_channel_sets_analog() {
    let (mut gpio, _) = sim_gpio();
    let (adc, _) = sim_adc(AdcUnit::Adc1);

    let routed = adc.route_channel(&mut gpio, AdcChannel::new(1).unwrap());

    assert_eq!(routed, Some(PinId::PA1));
    assert_eq!(gpio.mode(PinId::PA1), PinMode::Analog);
}

#[test]
fn test_route_internal_channel_is_noop() {
    let (mut gpio, ports) = sim_gpio();
    let (adc, _) = sim_adc(AdcUnit::Adc1);

    assert_eq!(adc.route_channel(&mut gpio, AdcChannel::TEMPERATURE), None);
    assert!(ports.iter().all(|p| p.writes().is_empty()));
}

// =============================================================================
// Channel Sequence Tests
// =============================================================================

#[test]
fn test_single_channel_sequence() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);

    adc.set_channel_sequence(&channels(&[1]));

    assert_eq!(regs.peek(SQR3), 1);
    assert_eq!(regs.peek(SQR2), 0);
    assert_eq!(regs.peek(SQR1), 0);
    assert_eq!(regs.peek(CR1) & SCAN, 0);
}

#[test]
fn test_sequence_packing() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);

    adc.set_channel_sequence(&channels(&[3, 7, 11, 0, 1, 2, 4]));

    assert_eq!(
        regs.peek(SQR3),
        3 | (7 << 5) | (11 << 10) | (0 << 15) | (1 << 20) | (2 << 25)
    );
    assert_eq!(regs.peek(SQR2), 4);
    // L = 6 in SQR1[23:20]
    assert_eq!(regs.peek(SQR1), 6 << 20);
    assert_eq!(regs.peek(CR1) & SCAN, SCAN);
}

#[test]
fn test_longest_sequence_uses_sqr1() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc2);
    let list = channels(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);

    adc.set_channel_sequence(&list);

    assert_eq!(regs.peek(SQR1), 12 | (13 << 5) | (14 << 10) | (14 << 20));
    assert_eq!(adc.channel_sequence().as_slice(), list.as_slice());
}

#[test]
fn test_sequence_clears_previous() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);

    adc.set_channel_sequence(&channels(&[18, 18, 18, 18, 18, 18, 18, 18]));
    adc.set_channel_sequence(&channels(&[2]));

    assert_eq!(regs.peek(SQR3), 2);
    assert_eq!(regs.peek(SQR2), 0);
    assert_eq!(regs.peek(SQR1), 0);
    assert_eq!(regs.peek(CR1) & SCAN, 0);
}

#[test]
#[should_panic(expected = "contract violation")]
fn test_empty_sequence_rejected() {
    let (mut adc, _) = sim_adc(AdcUnit::Adc1);
    adc.set_channel_sequence(&[]);
}

#[test]
#[should_panic(expected = "contract violation")]
fn test_full_sequence_rejected() {
    let (mut adc, _) = sim_adc(AdcUnit::Adc1);
    let list = vec![AdcChannel::new(0).unwrap(); ADC_TOTAL_CHANNELS];
    adc.set_channel_sequence(&list);
}

proptest! {
    #[test]
    fn prop_sequence_round_trip(
        indices in proptest::collection::vec(0u8..=AdcChannel::MAX, 1..ADC_TOTAL_CHANNELS)
    ) {
        let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
        let list = channels(&indices);

        adc.set_channel_sequence(&list);

        let length_field = (regs.peek(SQR1) >> 20) & 0xF;
        prop_assert_eq!(length_field as usize, list.len() - 1);
        let sequence = adc.channel_sequence();
        prop_assert_eq!(sequence.as_slice(), list.as_slice());
    }
}

// =============================================================================
// Conversion Tests
// =============================================================================

#[test]
fn test_single_conversion_scenario() {
    let (mut rcc, _) = sim_rcc();
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    regs.set_adc_sample(1234);

    adc.init(&mut rcc);
    adc.enable();
    adc.set_single_conversion_mode();
    adc.set_channel_sequence(&channels(&[1]));

    adc.start_conversion();
    assert_eq!(adc.state(), AdcState::Converting);

    let reading = adc.read_result();
    assert_eq!(reading.raw(), 1234);
    assert!(reading.raw() <= 4095);
    assert!(!adc.completion_status());
    assert_eq!(adc.state(), AdcState::Idle);

    // Nothing new until the next trigger
    assert!(!adc.completion_status());
    adc.start_conversion();
    assert!(adc.completion_status());
    assert_eq!(regs.conversions(), 2);
}

#[test]
fn test_try_read_would_block_before_trigger() {
    let (mut adc, _) = sim_adc(AdcUnit::Adc1);
    adc.enable();
    assert!(matches!(adc.try_read_result(), Err(nb::Error::WouldBlock)));
}

#[test]
fn test_start_conversion_drops_stale_flag() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    adc.enable();
    regs.poke(SR, EOC);

    adc.start_conversion();

    // The EOC clear lands before the SWSTART write
    let writes = regs.writes();
    let clear = writes.iter().position(|&(o, v)| o == SR && v & EOC == 0);
    let trigger = writes.iter().position(|&(o, v)| o == CR2 && v & SWSTART != 0);
    assert!(clear.is_some() && trigger.is_some());
    assert!(clear < trigger);
    assert_eq!(regs.conversions(), 1);
}

#[test]
fn test_start_conversion_on_disabled_unit_is_ignored() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    regs.poke(SR, EOC);

    adc.start_conversion();

    assert_eq!(adc.state(), AdcState::Disabled);
    assert!(!adc.is_enabled());
    assert!(regs.writes().is_empty());
    assert_eq!(regs.conversions(), 0);
}

#[test]
fn test_clear_completion_masks_only_flag() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    regs.poke(SR, EOC | (1 << 4));

    adc.clear_completion();

    assert_eq!(regs.peek(SR), 1 << 4);
}

#[test]
fn test_continuous_mode_stays_converting() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc3);
    regs.set_adc_sample(42);
    adc.enable();
    adc.set_continuous_conversion_mode();

    adc.start_conversion();
    assert_eq!(adc.read_result().raw(), 42);
    assert_eq!(adc.state(), AdcState::Converting);
}

proptest! {
    #[test]
    fn prop_read_result_masked(sample in any::<u32>()) {
        let (mut adc, regs) = sim_adc(AdcUnit::Adc2);
        regs.set_adc_sample(sample);
        adc.enable();

        adc.start_conversion();
        let reading = adc.read_result();

        prop_assert!(reading.raw() <= 4095);
        prop_assert_eq!(u32::from(reading.raw()), sample & 0xFFF);
    }
}

// =============================================================================
// Interrupt Path Tests
// =============================================================================

#[test]
fn test_completion_interrupt_bit() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);

    adc.enable_completion_interrupt();
    assert_eq!(regs.peek(CR1) & EOCIE, EOCIE);

    adc.disable_completion_interrupt();
    assert_eq!(regs.peek(CR1) & EOCIE, 0);
}

#[test]
fn test_service_all_pending_units() {
    let (mut adc1, regs1) = sim_adc(AdcUnit::Adc1);
    let (adc2, _) = sim_adc(AdcUnit::Adc2);
    let (mut adc3, regs3) = sim_adc(AdcUnit::Adc3);
    regs1.set_adc_sample(100);
    regs3.set_adc_sample(300);

    adc1.enable();
    adc3.enable();
    adc1.start_conversion();
    adc3.start_conversion();

    // Slice order does not matter, service order is fixed
    let mut units = [adc3, adc1, adc2];
    let latched = LatchedResults::new();

    assert_eq!(service_completions(&mut units, &latched), 2);
    assert_eq!(latched.peek(AdcUnit::Adc1).map(|r| r.raw()), Some(100));
    assert_eq!(latched.peek(AdcUnit::Adc2), None);
    assert_eq!(latched.take(AdcUnit::Adc3).map(|r| r.raw()), Some(300));
    assert_eq!(latched.take(AdcUnit::Adc3), None);

    // Flags were cleared
    assert_eq!(regs1.peek(SR) & EOC, 0);
    assert_eq!(regs3.peek(SR) & EOC, 0);
    assert_eq!(service_completions(&mut units, &latched), 0);
}

#[test]
fn test_latched_result_overwritten_by_newer() {
    let (mut adc, regs) = sim_adc(AdcUnit::Adc2);
    let latched = LatchedResults::default();
    adc.enable();

    regs.set_adc_sample(10);
    adc.start_conversion();
    let mut units = [adc];
    service_completions(&mut units, &latched);

    regs.set_adc_sample(20);
    units[0].start_conversion();
    service_completions(&mut units, &latched);

    assert_eq!(latched.take(AdcUnit::Adc2).map(|r| r.raw()), Some(20));
}

#[test]
fn test_service_from_handles_owned_by_cell() {
    use core::cell::RefCell;
    use critical_section::Mutex;

    let (mut adc, regs) = sim_adc(AdcUnit::Adc1);
    regs.set_adc_sample(777);
    adc.enable();
    adc.enable_completion_interrupt();

    let handles: Mutex<RefCell<Option<[Adc<SimBlock>; 1]>>> = Mutex::new(RefCell::new(None));
    let latched = LatchedResults::new();
    critical_section::with(|cs| handles.borrow(cs).replace(Some([adc])));

    // Handler side
    let serviced = critical_section::with(|cs| {
        let mut slot = handles.borrow(cs).borrow_mut();
        slot.as_mut().map_or(0, |units| {
            units[0].start_conversion();
            service_completions(units, &latched)
        })
    });

    assert_eq!(serviced, 1);
    assert_eq!(latched.take(AdcUnit::Adc1).map(|r| r.raw()), Some(777));
}
