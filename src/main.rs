//! Data Acquisition Node Main Application
//!
//! Entry point for the STM32F446 data acquisition firmware. Brings the
//! clock tree and peripherals up, then runs a polled loop serving console
//! commands over USART2.

#![no_std]
#![no_main]

use core::fmt::Write as _;

use cortex_m_rt::{entry, exception};
use defmt::{info, warn};
use {cortex_m as _, defmt_rtt as _, panic_probe as _};

use daq_firmware::config::pins;
use daq_firmware::prelude::*;

/// Console command: acquire one sample
const CMD_ACQUIRE: u8 = b'r';

/// Console command: read and echo one line
const CMD_LINE: u8 = b'l';

/// 1 ms tick
#[exception]
fn SysTick() {
    SYSTEM_TICKS.on_tick();
}

/// Main entry point
#[entry]
fn main() -> ! {
    info!("DAQ node firmware v{}", env!("CARGO_PKG_VERSION"));

    let Some(mut p) = Peripherals::take() else {
        defmt::panic!("peripherals already taken");
    };

    let hclk = p.rcc.configure_system_clock(&p.pwr, &p.flash);
    p.timebase.init(hclk);
    info!("Clock at {} Hz, timebase running", hclk);

    for port in [Port::A, Port::B, Port::C] {
        p.gpio.init_port(&mut p.rcc, port);
    }

    // Status LEDs
    for led in [
        pins::LED_USER,
        pins::LED_HEARTBEAT,
        pins::LED_ACTIVITY,
        pins::LED_CHANGED,
    ] {
        p.gpio.configure_mode(led, PinMode::Output);
        p.gpio.configure_output_type(led, OutputType::PushPull);
        p.gpio.clear_output(led);
    }
    p.gpio.configure_mode(pins::USER_BUTTON, PinMode::Input);
    p.gpio.configure_pull(pins::USER_BUTTON, Pull::None);

    // Sensor input on ADC1
    let mut adc = p.adc1;
    adc.init(&mut p.rcc);
    adc.route_channel(&mut p.gpio, SENSOR_CHANNEL);
    adc.set_single_conversion_mode();
    adc.set_channel_sequence(&[SENSOR_CHANNEL]);
    adc.enable();

    // Console on the ST-LINK virtual COM port
    let mut console = p.usart2;
    console.quick_default_config(&mut p.rcc, &mut p.gpio);
    console.send_string("\r\nDAQ node ready: 'r' acquire, 'l' line\r\n");

    info!("Peripherals initialized, entering main loop");

    let mut heartbeat = RateLimiter::new(HEARTBEAT_MS);
    let mut report = RateLimiter::new(REPORT_INTERVAL_MS);
    let mut latest: Option<AdcReading> = None;
    let mut line = [0u8; LINE_BUFFER_SIZE];

    loop {
        let now = p.timebase.now_millis();

        if heartbeat.check(now) {
            p.gpio.toggle_output(pins::LED_HEARTBEAT);
        }

        // B1 is active low; LD2 follows it
        if p.gpio.read_input(pins::USER_BUTTON) {
            p.gpio.clear_output(pins::LED_USER);
        } else {
            p.gpio.set_output(pins::LED_USER);
        }

        match console.try_receive_byte() {
            Ok(CMD_ACQUIRE) => {
                p.gpio.set_output(pins::LED_ACTIVITY);
                adc.start_conversion();
                let reading = adc.read_result();
                p.gpio.clear_output(pins::LED_ACTIVITY);

                if latest.is_some_and(|previous| previous != reading) {
                    p.gpio.set_output(pins::LED_CHANGED);
                } else {
                    p.gpio.clear_output(pins::LED_CHANGED);
                }
                latest = Some(reading);
                info!("Acquired {}", reading);
            }
            Ok(CMD_LINE) => {
                console.send_string("> ");
                let len = console.receive_line(&mut line);
                let text = core::str::from_utf8(&line[..len]).unwrap_or("<binary>");
                let _ = write!(console, "got {len} byte(s): {text}\r\n");
                info!("Line of {} byte(s)", len);
            }
            Ok(other) => warn!("Unknown command {=u8:#x}", other),
            Err(_) => {}
        }

        if report.check(now) {
            if let Some(reading) = latest {
                let mut text: heapless::String<48> = heapless::String::new();
                let _ = write!(
                    text,
                    "adc1 in{} = {} ({} mV)\r\n",
                    SENSOR_CHANNEL.index(),
                    reading,
                    reading.as_millivolts(VDDA_MV)
                );
                console.send_string(&text);
            }
        }
    }
}
