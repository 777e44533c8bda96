// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The unified loss/PTO timer (section 4.E). The reference codebase keeps
//! these as two separate `Timer`s behind a `timer::Provider` that reports
//! whichever is armed; this core collapses them into one armed timer plus a
//! tag for which handler fires, since exactly one of the two is ever active
//! (the design note's "implementations may keep two timers so long as
//! exactly one is active at a time" is satisfied either way).

use crate::{
    packet_number::EncryptionLevel, recovery::rtt_estimator::RttEstimator,
    recovery::pto, send_context::SendContext, time::Timer, time::Timestamp,
};

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.1
//# The RECOMMENDED initial value for the packet reordering threshold
//# (kPacketThreshold) is 3.
const PKT_THR: u64 = 3;

/// Which handler the armed timer will invoke on expiration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Calls loss detection with no ACK span (`detect_lost(None)`).
    Lost,
    /// Calls the PTO handler.
    Pto,
}

/// The minimum `send_time + thr - now` across contexts with a pending,
/// possibly-lost frame, or `None` if no context has one (section 4.E). `0`
/// means fire immediately: either the deadline has already passed, or the
/// packet-threshold condition is already met.
fn lost_delay_ms(
    contexts: [(EncryptionLevel, &SendContext); 3],
    rtt: &RttEstimator,
    now: Timestamp,
) -> Option<u64> {
    let thr = rtt.loss_time_threshold();

    contexts
        .into_iter()
        .filter_map(|(_, ctx)| {
            let largest_ack = ctx.largest_ack?;
            let front = ctx.sent.front()?;
            if front.pnum > largest_ack {
                return None;
            }
            if largest_ack.checked_distance(front.pnum).unwrap_or(0) >= PKT_THR {
                return Some(0);
            }
            let deadline = front.send_time.saturating_add_millis(thr);
            Some(deadline.saturating_duration_since(now))
        })
        .min()
}

/// The alternating loss/PTO timer (section 4.E): one armed [`Timer`] plus the
/// [`Mode`] its expiration should dispatch to.
#[derive(Clone, Copy, Debug)]
pub struct RecoveryTimer {
    timer: Timer,
    mode: Mode,
}

impl Default for RecoveryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryTimer {
    pub const fn new() -> Self {
        Self {
            timer: Timer::new(),
            mode: Mode::Pto,
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    #[inline]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.timer.expiration()
    }

    /// Cancels the timer (section 5, "in-flight timers must be safely
    /// cancellable" on connection close).
    #[inline]
    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1
    //# The sender's earliest loss time (QUIC-RECOVERY) MUST be rearmed after
    //# an ACK is processed, a packet is sent, or a packet is declared lost.

    /// Recomputes and (re)arms the timer: the loss timer if any context has a
    /// pending deadline, else the PTO timer, else cancels (section 4.E). Lost
    /// always takes precedence over PTO.
    pub fn rearm(
        &mut self,
        contexts: [(EncryptionLevel, &SendContext); 3],
        rtt: &RttEstimator,
        pto_count: u32,
        max_ack_delay_ms: u64,
        handshake_confirmed: bool,
        now: Timestamp,
    ) {
        if let Some(delay) = lost_delay_ms(contexts, rtt, now) {
            self.mode = Mode::Lost;
            self.timer.set(now.saturating_add_millis(delay));
            #[cfg(feature = "std")]
            tracing::trace!(delay, "timer_rearmed_lost");
            return;
        }

        if let Some(due) = pto::earliest_due(contexts, rtt, pto_count, max_ack_delay_ms, handshake_confirmed) {
            self.mode = Mode::Pto;
            self.timer.set(due);
            #[cfg(feature = "std")]
            tracing::trace!(?due, "timer_rearmed_pto");
            return;
        }

        self.timer.cancel();
    }

    /// If expired at `now`, disarms the timer and returns which handler to
    /// run. A no-op (returns `None`) otherwise.
    pub fn on_timeout(&mut self, now: Timestamp) -> Option<Mode> {
        if !self.timer.is_expired(now) {
            return None;
        }
        self.timer.cancel();
        Some(self.mode)
    }
}
