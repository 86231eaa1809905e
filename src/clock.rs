//! Virtual clock helpers and the half-integer timing convention.
//!
//! Every machine reads its input and starts work at integer seconds, and every
//! hand-off to a downstream slot happens in the middle of a time slot. Belts
//! shift at the same half-integer instants. Keeping reads and writes on
//! different instants means no two processes race on a slot.
//!
//! # Example
//!
//! ```
//! use smtline::clock::{ceil_to_tick, secs, HALF_TICK, TICK};
//!
//! // 12.5 s rounds up to 13 s
//! let t = secs(12) + HALF_TICK;
//! assert_eq!(ceil_to_tick(t), secs(13));
//! assert_eq!(ceil_to_tick(secs(13)), secs(13));
//! assert_eq!(TICK, secs(1));
//! ```

use crate::types::SimTime;

/// Clock units per second.
pub const UNITS_PER_SECOND: SimTime = 2;

/// One second of virtual time.
pub const TICK: SimTime = UNITS_PER_SECOND;

/// Half a second of virtual time.
pub const HALF_TICK: SimTime = UNITS_PER_SECOND / 2;

/// Longest duration a line accepts anywhere in its configuration, in seconds.
///
/// Keeps every sum of a clock value and a configured delay well inside `SimTime`.
pub const MAX_DURATION_SECS: u64 = u32::MAX as u64;

/// Converts whole seconds to clock units, saturating at `SimTime::MAX`.
#[inline]
pub fn secs(seconds: u64) -> SimTime {
    seconds.saturating_mul(UNITS_PER_SECOND)
}

/// Converts clock units to seconds.
#[inline]
pub fn to_secs(time: SimTime) -> f64 {
    time as f64 / UNITS_PER_SECOND as f64
}

/// Converts clock units to hours.
#[inline]
pub fn to_hours(time: SimTime) -> f64 {
    to_secs(time) / 3600.0
}

/// Converts a non-negative number of seconds to clock units.
///
/// Returns `None` unless the value is a multiple of half a second.
pub fn from_secs_f64(seconds: f64) -> Option<SimTime> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let units = seconds * UNITS_PER_SECOND as f64;
    if units.fract() != 0.0 {
        return None;
    }
    Some(units as SimTime)
}

/// Converts a run length in hours to clock units, rounded to whole seconds.
///
/// Returns `None` for negative or non-finite values and for anything longer
/// than [`MAX_DURATION_SECS`].
pub fn from_hours(hours: f64) -> Option<SimTime> {
    if !hours.is_finite() || hours < 0.0 {
        return None;
    }
    let seconds = (hours * 3600.0).round();
    if seconds > MAX_DURATION_SECS as f64 {
        return None;
    }
    Some(secs(seconds as u64))
}

/// Rounds up to the next integer second.
///
/// Formula: `⌈t / TICK⌉ × TICK`
#[inline]
pub fn ceil_to_tick(time: SimTime) -> SimTime {
    time.div_ceil(TICK) * TICK
}

/// Time remaining until the next integer second (zero when already on one).
#[inline]
pub fn until_next_tick(time: SimTime) -> SimTime {
    ceil_to_tick(time) - time
}

/// Checks if a time is exactly on an integer second.
#[inline]
pub fn is_on_tick(time: SimTime) -> bool {
    time % TICK == 0
}

/// Formats a time as seconds with one decimal, the way trace lines print it.
pub fn format_secs(time: SimTime) -> String {
    format!("{:.1}", to_secs(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_to_tick() {
        assert_eq!(ceil_to_tick(0), 0);
        assert_eq!(ceil_to_tick(1), TICK);
        assert_eq!(ceil_to_tick(TICK), TICK);
        assert_eq!(ceil_to_tick(secs(7) + HALF_TICK), secs(8));
    }

    #[test]
    fn test_until_next_tick() {
        assert_eq!(until_next_tick(secs(3)), 0);
        assert_eq!(until_next_tick(secs(3) + HALF_TICK), HALF_TICK);
    }

    #[test]
    fn test_boundaries() {
        assert!(is_on_tick(secs(4)));
        assert!(!is_on_tick(secs(4) + HALF_TICK));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(to_secs(secs(90)), 90.0);
        assert_eq!(to_hours(secs(7200)), 2.0);
        assert_eq!(from_secs_f64(0.5), Some(HALF_TICK));
        assert_eq!(from_secs_f64(3.0), Some(secs(3)));
        assert_eq!(from_secs_f64(0.25), None);
        assert_eq!(from_secs_f64(-1.0), None);
        assert_eq!(format_secs(secs(2) + HALF_TICK), "2.5");
    }

    #[test]
    fn test_from_hours() {
        assert_eq!(from_hours(2.0), Some(secs(7200)));
        assert_eq!(from_hours(10.0 / 3600.0), Some(secs(10)));
        assert_eq!(from_hours(f64::INFINITY), None);
        assert_eq!(from_hours(f64::NAN), None);
        assert_eq!(from_hours(-1.0), None);
        assert_eq!(from_hours(1e15), None);
        assert!(from_hours(MAX_DURATION_SECS as f64 / 3600.0).is_some());
    }

    #[test]
    fn test_secs_saturates() {
        assert_eq!(secs(u64::MAX), SimTime::MAX);
        assert_eq!(secs(MAX_DURATION_SECS), MAX_DURATION_SECS * 2);
    }
}
