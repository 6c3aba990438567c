//! Time base.
//!
//! A tick is the kernel's quantum of time. The counter is a wrapping 32-bit
//! value; every deadline/delay comparison site uses [`wrapping_before`]
//! (a signed difference) rather than a plain `<`, so wraparound is invisible
//! within one wrap period.

use num_integer::Integer;

use crate::config::MAX_TIMEOUT;

/// A point in time, measured in ticks since kernel init.
pub type Tick = u32;

/// A bounded wait duration, in ticks. `0` means non-blocking; `MAX_TIMEOUT`
/// means wait forever.
pub type Timeout = u32;

/// True iff `a` comes strictly before `b` on a wrapping 32-bit tick counter.
///
/// Computed as a signed difference so that a counter which has wrapped
/// around compares correctly as long as `a` and `b` are within half the
/// counter's range of each other — the standard trick for wraparound-safe
/// tick comparisons.
#[inline]
pub fn wrapping_before(a: Tick, b: Tick) -> bool {
    (a as i32).wrapping_sub(b as i32) < 0
}

/// True iff `a` is at or before `b` on a wrapping 32-bit tick counter.
#[inline]
pub fn wrapping_at_or_before(a: Tick, b: Tick) -> bool {
    a == b || wrapping_before(a, b)
}

/// Convert a duration in milliseconds to a tick count, given the
/// configured tick period. Rounds up so that "at least `ms`" always holds.
#[inline]
pub fn ms_to_ticks(ms: u32, tick_ms: u32) -> Tick {
    ms.div_ceil(&tick_ms)
}

/// Convert a tick count to a duration in milliseconds, given the configured
/// tick period.
#[inline]
pub fn ticks_to_ms(ticks: Tick, tick_ms: u32) -> u32 {
    ticks.saturating_mul(tick_ms)
}

/// `true` iff `timeout` is the infinite-wait sentinel.
#[inline]
pub fn is_infinite(timeout: Timeout) -> bool {
    timeout == MAX_TIMEOUT
}
