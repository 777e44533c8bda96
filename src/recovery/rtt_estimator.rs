// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Round-trip time sampling (RFC 9002 section 5), adapted to the millisecond
//! wall clock and fixed-shift EWMA this core's spec prescribes (section 4.B)
//! rather than the wider codebase's `Duration`-typed estimator.

use crate::time::GRANULARITY_MS;

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
//# kPersistentCongestionThreshold:  The number of congestion windows of
//# time to use as the persistent congestion duration threshold.
const PERSISTENT_CONGESTION_THR: u64 = 3;

/// Tracks the smoothed RTT, its variance, and the minimum observed RTT for a
/// connection, per RFC 9002 section 5.
#[derive(Clone, Copy, Debug)]
pub struct RttEstimator {
    latest_rtt: u64,
    min_rtt: u64,
    /// `avg_rtt` in the spec's naming; `smoothed_rtt` in RFC 9002.
    avg_rtt: u64,
    rttvar: u64,
    /// Wall time of the first RTT sample, in milliseconds; `None` before any
    /// sample has been taken.
    first_rtt: Option<u64>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub const fn new() -> Self {
        Self {
            latest_rtt: 0,
            min_rtt: 0,
            avg_rtt: 0,
            rttvar: 0,
            first_rtt: None,
        }
    }

    #[inline]
    pub fn latest_rtt(&self) -> u64 {
        self.latest_rtt
    }

    #[inline]
    pub fn min_rtt(&self) -> u64 {
        self.min_rtt
    }

    #[inline]
    pub fn avg_rtt(&self) -> u64 {
        self.avg_rtt
    }

    #[inline]
    pub fn rttvar(&self) -> u64 {
        self.rttvar
    }

    #[inline]
    pub fn first_rtt(&self) -> Option<u64> {
        self.first_rtt
    }

    /// `true` once at least one RTT sample has been recorded.
    #[inline]
    pub fn has_sample(&self) -> bool {
        self.first_rtt.is_some()
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
    //# When a packet is sent, we record the time it was sent; when an
    //# acknowledgment for the packet arrives, we can calculate the RTT
    //# from the time the acknowledgment was received.

    /// Records a new RTT sample (section 4.B).
    ///
    /// `ack_delay_ms` is the peer's reported ACK delay, already scaled by
    /// `ack_delay_exponent` and capped to `max_ack_delay` once the handshake
    /// is confirmed, per the caller (the scaling itself lives outside this
    /// type since it depends on peer transport parameters this estimator
    /// does not hold).
    pub fn update(&mut self, now_ms: u64, send_time_ms: u64, ack_delay_ms: u64) {
        self.latest_rtt = now_ms.saturating_sub(send_time_ms);

        if self.first_rtt.is_none() {
            self.min_rtt = self.latest_rtt;
            self.avg_rtt = self.latest_rtt;
            self.rttvar = self.latest_rtt / 2;
            self.first_rtt = Some(now_ms);
            return;
        }

        self.min_rtt = self.min_rtt.min(self.latest_rtt);

        let adjusted = if self.min_rtt + ack_delay_ms < self.latest_rtt {
            self.latest_rtt - ack_delay_ms
        } else {
            self.latest_rtt
        };

        let diff = self.avg_rtt.abs_diff(adjusted);
        self.rttvar = (self.rttvar as i64 + (diff as i64 - self.rttvar as i64) / 4) as u64;
        self.avg_rtt = (self.avg_rtt as i64 + (adjusted as i64 - self.avg_rtt as i64) / 8) as u64;
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
    //# PersistentCongestionDuration = smoothed_rtt + max(4 * rttvar, kGranularity) + max_ack_delay
    //#    PersistentCongestionDuration *= kPersistentCongestionThreshold

    /// The persistent-congestion duration threshold (section 4.C).
    pub fn persistent_congestion_duration(&self, max_ack_delay_ms: u64) -> u64 {
        (self.avg_rtt + (4 * self.rttvar).max(GRANULARITY_MS) + max_ack_delay_ms)
            * PERSISTENT_CONGESTION_THR
    }

    /// The loss-detection time threshold (section 4.C): `max(max(latest_rtt,
    /// avg_rtt) * 9/8, TIME_GRANULARITY)`, computed as `thr += thr >> 3` per
    /// the spec's stated fixed-point expression for `9/8`.
    pub fn loss_time_threshold(&self) -> u64 {
        let mut thr = self.latest_rtt.max(self.avg_rtt);
        thr += thr >> 3;
        thr.max(GRANULARITY_MS)
    }

    /// The PTO base interval (section 4.E): `avg_rtt + max(4*rttvar,
    /// GRANULARITY) + extra`, where `extra` is the peer's `max_ack_delay`
    /// for the Application Data space once the handshake is confirmed, or 0
    /// otherwise (passed in by the caller).
    pub fn pto_base(&self, extra_ms: u64) -> u64 {
        self.avg_rtt + (4 * self.rttvar).max(GRANULARITY_MS) + extra_ms
    }

    /// Resets the first-sample marker on persistent congestion, so
    /// subsequent samples are treated as a fresh RTT history (section 9,
    /// "the `first_rtt` gate on persistent-congestion counting").
    pub fn on_persistent_congestion(&mut self) {
        self.first_rtt = None;
    }
}
