// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time related datatypes.
//!
//! Unlike the microsecond, [`core::num::NonZeroU64`]-backed `Timestamp` used
//! elsewhere in the wider codebase, this crate's clock is the millisecond
//! wall time the spec operates on directly (`current_msec()`), so `Timestamp`
//! is a plain `u64` newtype with no epoch-zero avoidance trick.

use core::{fmt, ops};

/// The RFC 9002 timer granularity: the assumed timer-processing delay of the
/// sending and receiving hosts.
pub const GRANULARITY_MS: u64 = 1;

/// An absolute point in time, in milliseconds since an arbitrary epoch.
///
/// `Timestamp`s should only be compared if they are sourced from the same
/// clock.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash, Default)]
pub struct Timestamp(u64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.0)
    }
}

impl Timestamp {
    /// Creates a `Timestamp` from a millisecond offset since the clock's epoch.
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the number of milliseconds since the clock's epoch.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the duration which elapsed since an earlier `Timestamp`, or 0
    /// if `earlier` is more recent.
    #[inline]
    pub const fn saturating_duration_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns `self + millis`, saturating at `u64::MAX`.
    #[inline]
    pub const fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns `self - millis`, saturating at 0.
    #[inline]
    pub const fn saturating_sub_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

impl ops::Add<u64> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl ops::Sub<u64> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

/// A single alternating timer, armed with at most one expiration at a time.
///
/// The source arms one timer that alternately serves as the loss-detection
/// timer or the PTO timer (see `recovery::timer`); this type is the shared
/// plumbing both use, mirroring the reference codebase's `time::Timer`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    expiration: Option<Timestamp>,
}

impl Timer {
    pub const fn new() -> Self {
        Self { expiration: None }
    }

    /// Sets the timer to expire at `timestamp`.
    #[inline]
    pub fn set(&mut self, timestamp: Timestamp) {
        self.expiration = Some(timestamp);
    }

    /// Cancels the timer, if armed.
    #[inline]
    pub fn cancel(&mut self) {
        self.expiration = None;
    }

    /// Returns `true` if the timer is armed, regardless of expiration.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.expiration.is_some()
    }

    /// Returns `true` if the timer is armed and `current_time` is at or past
    /// the expiration.
    #[inline]
    pub fn is_expired(&self, current_time: Timestamp) -> bool {
        match self.expiration {
            Some(expiration) => expiration <= current_time,
            None => false,
        }
    }

    /// Returns the armed expiration, if any.
    #[inline]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_math() {
        let t0 = Timestamp::from_millis(100);
        let t1 = t0 + 50;
        assert_eq!(t1.as_millis(), 150);
        assert_eq!(t1.saturating_duration_since(t0), 50);
        assert_eq!(t0.saturating_duration_since(t1), 0);
    }

    #[test]
    fn timer_arm_and_expire() {
        let mut timer = Timer::new();
        assert!(!timer.is_armed());

        timer.set(Timestamp::from_millis(100));
        assert!(timer.is_armed());
        assert!(!timer.is_expired(Timestamp::from_millis(99)));
        assert!(timer.is_expired(Timestamp::from_millis(100)));
        assert!(timer.is_expired(Timestamp::from_millis(200)));

        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.is_expired(Timestamp::from_millis(200)));
    }
}
