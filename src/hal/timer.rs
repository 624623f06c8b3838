//! Timebase
//!
//! Millisecond tick service derived from SysTick. The shared state lives in
//! a [`TickCounter`] that the SysTick exception drives through
//! [`TickCounter::on_tick`]; [`Timebase`] owns the SysTick registers and
//! offers the blocking delay plus the elapsed-time queries used to build
//! bounded waits around the drivers' blocking calls.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::TICK_HZ;
use crate::hal::reg::RegisterBlock;

/// SysTick register offsets and bits
mod reg {
    pub const CTRL: usize = 0x00;
    pub const LOAD: usize = 0x04;
    pub const VAL: usize = 0x08;

    pub const CTRL_ENABLE: u32 = 1 << 0;
    pub const CTRL_TICKINT: u32 = 1 << 1;
    pub const CTRL_CLKSOURCE: u32 = 1 << 2;

    /// LOAD is a 24-bit reload value
    pub const LOAD_MAX: u32 = 0x00FF_FFFF;
}

/// Millisecond counter and delay countdown
///
/// Written only by the tick interrupt (and by [`Timebase::delay`] when it
/// arms the countdown), read from anywhere.
pub struct TickCounter {
    millis: AtomicU32,
    countdown: AtomicU32,
}

impl TickCounter {
    /// Create a counter at zero
    #[must_use]
    pub const fn new() -> Self {
        Self {
            millis: AtomicU32::new(0),
            countdown: AtomicU32::new(0),
        }
    }

    /// Advance by one tick
    ///
    /// Called from the SysTick exception. The millisecond count is bumped
    /// before the countdown moves, so a delay that sees its countdown reach
    /// zero has also seen every tick it waited for. The countdown stops at
    /// zero.
    pub fn on_tick(&self) {
        self.millis.fetch_add(1, Ordering::AcqRel);
        let _ = self
            .countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Milliseconds since boot, wrapping at `u32::MAX`
    #[must_use]
    pub fn now_millis(&self) -> u32 {
        self.millis.load(Ordering::Acquire)
    }

    /// Remaining delay ticks
    #[must_use]
    pub fn countdown(&self) -> u32 {
        self.countdown.load(Ordering::Acquire)
    }

    /// Arm the countdown
    pub fn arm(&self, ms: u32) {
        self.countdown.store(ms, Ordering::Release);
    }

    /// Milliseconds elapsed since `start`, wraparound-safe
    #[must_use]
    pub fn elapsed_since(&self, start: u32) -> u32 {
        self.now_millis().wrapping_sub(start)
    }

    /// Spin until `ms` ticks have passed
    ///
    /// Blocks the calling context. Only the tick interrupt runs meanwhile;
    /// the wait cannot be cancelled.
    pub fn delay(&self, ms: u32) {
        self.arm(ms);
        while self.countdown() != 0 {
            core::hint::spin_loop();
        }
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide tick state driven by the SysTick exception
pub static SYSTEM_TICKS: TickCounter = TickCounter::new();

/// SysTick-backed millisecond timebase
pub struct Timebase<R> {
    regs: R,
    ticks: &'static TickCounter,
}

impl<R: RegisterBlock> Timebase<R> {
    /// Wrap the SysTick block, counting into `ticks`
    #[must_use]
    pub const fn new(regs: R, ticks: &'static TickCounter) -> Self {
        Self { regs, ticks }
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    /// Start the 1 ms periodic interrupt
    ///
    /// `core_clock_hz` must be the final core clock: calling this before the
    /// clock tree is up gives a wrong tick period.
    pub fn init(&mut self, core_clock_hz: u32) {
        let reload = (core_clock_hz / TICK_HZ).saturating_sub(1).min(reg::LOAD_MAX);
        self.regs.write(reg::LOAD, reload);
        self.regs.write(reg::VAL, 0);
        self.regs.write(
            reg::CTRL,
            reg::CTRL_CLKSOURCE | reg::CTRL_TICKINT | reg::CTRL_ENABLE,
        );
        debug!("SysTick: reload {} at {} Hz", reload, core_clock_hz);
    }

    /// Whether the tick interrupt is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.regs.is_set(reg::CTRL, reg::CTRL_ENABLE | reg::CTRL_TICKINT)
    }

    /// Tick state this timebase counts into
    #[must_use]
    pub const fn ticks(&self) -> &'static TickCounter {
        self.ticks
    }

    /// Milliseconds since boot
    #[must_use]
    pub fn now_millis(&self) -> u32 {
        self.ticks.now_millis()
    }

    /// Milliseconds elapsed since `start`
    #[must_use]
    pub fn elapsed_since(&self, start: u32) -> u32 {
        self.ticks.elapsed_since(start)
    }

    /// Busy-wait for `ms` milliseconds
    pub fn delay(&mut self, ms: u32) {
        self.ticks.delay(ms);
    }
}

impl<R: RegisterBlock> embedded_hal::delay::DelayNs for Timebase<R> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay(ns.div_ceil(1_000_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay(us.div_ceil(1_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay(ms);
    }
}

/// Deadline on the millisecond counter
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    start: u32,
    duration_ms: u32,
}

impl Timeout {
    /// Start a timeout of `duration_ms` at time `now`
    #[must_use]
    pub const fn new(now: u32, duration_ms: u32) -> Self {
        Self {
            start: now,
            duration_ms,
        }
    }

    /// Check if timeout has expired
    #[must_use]
    pub const fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.start) >= self.duration_ms
    }

    /// Get remaining time in milliseconds
    #[must_use]
    pub const fn remaining(&self, now: u32) -> u32 {
        self.duration_ms
            .saturating_sub(now.wrapping_sub(self.start))
    }
}

/// Rate limiter for periodic operations
#[derive(Clone, Copy, Debug)]
pub struct RateLimiter {
    period_ms: u32,
    last: Option<u32>,
}

impl RateLimiter {
    /// Create a rate limiter from period
    #[must_use]
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            last: None,
        }
    }

    /// Check if enough time has passed (and update if so)
    ///
    /// The first call always passes.
    pub fn check(&mut self, now: u32) -> bool {
        match self.last {
            Some(last) if now.wrapping_sub(last) < self.period_ms => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Get time until next allowed operation
    #[must_use]
    pub const fn time_until_ready(&self, now: u32) -> u32 {
        match self.last {
            None => 0,
            Some(last) => self.period_ms.saturating_sub(now.wrapping_sub(last)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_stops_at_zero() {
        let ticks = TickCounter::new();
        ticks.arm(2);
        for _ in 0..5 {
            ticks.on_tick();
        }
        assert_eq!(ticks.countdown(), 0);
        assert_eq!(ticks.now_millis(), 5);
    }

    #[test]
    fn timeout_across_wraparound() {
        let t = Timeout::new(u32::MAX - 5, 10);
        assert!(!t.expired(u32::MAX));
        assert_eq!(t.remaining(u32::MAX), 5);
        assert!(t.expired(4));
    }
}
