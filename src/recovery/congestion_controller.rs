// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The congestion controller seam (section 4.D). The wider codebase exposes
//! this as a trait sealed to its CUBIC and BBR implementations so that
//! external crates cannot add a third without an explicit opt-in feature;
//! this core keeps the same seam even though NewReno is its only
//! implementation, since BBR/CUBIC/pacing are out of scope here and a
//! concrete struct would foreclose ever adding one later under the same
//! interface.

use crate::{packet_number::PacketNumber, send_context::SentFrame, time::Timestamp};

/// An algorithm for controlling the congestion window.
///
/// See `private::Sealed`: only [`NewReno`] implements this trait.
pub trait CongestionController: private::Sealed {
    fn window(&self) -> u32;
    fn ssthresh(&self) -> u32;
    fn in_flight(&self) -> u32;
    fn recovery_start(&self) -> Timestamp;

    /// Invoked once per frame as it is recorded sent, adding `frame.plen` to
    /// `in_flight` if the frame counts toward the congestion window (section
    /// 4.D "in_flight accounting"). Mirrors the decrement guard in
    /// `congestion_ack`/`congestion_lost` below.
    fn on_packet_sent(&mut self, frame: &SentFrame, rst_pnum: PacketNumber);

    /// Invoked once per newly-acknowledged frame that counts toward the
    /// congestion window (section 4.D, `congestion_ack`). Returns `true` if
    /// the caller should post a `push` event (the controller was blocked and
    /// now has room).
    fn congestion_ack(
        &mut self,
        frame: &SentFrame,
        now: Timestamp,
        rst_pnum: PacketNumber,
        max_udp_payload_size: u32,
        max_idle_timeout_ms: u64,
    ) -> bool;

    /// Invoked once per declared-lost packet, on its first frame (section
    /// 4.D, `congestion_lost`). `frame.plen` is zeroed to prevent
    /// double-accounting if this packet is later (spuriously) acked.
    /// Returns `true` if the caller should post a `push` event.
    fn congestion_lost(
        &mut self,
        frame: &mut SentFrame,
        now: Timestamp,
        rst_pnum: PacketNumber,
        max_udp_payload_size: u32,
    ) -> bool;

    /// Collapses the window on detected persistent congestion (section
    /// 4.D/4.C); `ssthresh` is left unchanged.
    fn persistent_congestion(&mut self, now: Timestamp, max_udp_payload_size: u32);
}

/// RFC 9002 NewReno: slow start, congestion avoidance, multiplicative
/// decrease on loss, and window collapse on persistent congestion.
#[derive(Clone, Copy, Debug)]
pub struct NewReno {
    window: u32,
    ssthresh: u32,
    in_flight: u32,
    recovery_start: Timestamp,
}

impl NewReno {
    /// `initial_window` is typically `10 * max_udp_payload_size` (section 6);
    /// `ssthresh` starts unbounded.
    pub fn new(initial_window: u32) -> Self {
        Self {
            window: initial_window,
            ssthresh: u32::MAX,
            in_flight: 0,
            recovery_start: Timestamp::from_millis(0),
        }
    }

    #[inline]
    fn is_blocked(&self) -> bool {
        self.in_flight >= self.window
    }

    /// Guards `recovery_start` against wrap (open question, section 9):
    /// preserved as-is though formally unnecessary under 64-bit ms time.
    fn guard_recovery_start(&mut self, now: Timestamp, max_idle_timeout_ms: u64) {
        let floor = 2 * max_idle_timeout_ms;
        if now.saturating_duration_since(self.recovery_start) > floor {
            self.recovery_start = now.saturating_sub_millis(floor);
        }
    }
}

impl private::Sealed for NewReno {}

impl CongestionController for NewReno {
    #[inline]
    fn window(&self) -> u32 {
        self.window
    }

    #[inline]
    fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    #[inline]
    fn in_flight(&self) -> u32 {
        self.in_flight
    }

    #[inline]
    fn recovery_start(&self) -> Timestamp {
        self.recovery_start
    }

    fn on_packet_sent(&mut self, frame: &SentFrame, rst_pnum: PacketNumber) {
        if !frame.is_congestion_controlled() || frame.pnum < rst_pnum {
            return;
        }
        self.in_flight += frame.plen;
    }

    fn congestion_ack(
        &mut self,
        frame: &SentFrame,
        now: Timestamp,
        rst_pnum: PacketNumber,
        max_udp_payload_size: u32,
        max_idle_timeout_ms: u64,
    ) -> bool {
        if frame.plen == 0 || frame.pnum < rst_pnum {
            return false;
        }

        let was_blocked = self.is_blocked();
        self.in_flight -= frame.plen;

        if frame.send_time <= self.recovery_start {
            // still in recovery: no growth
        } else if self.window < self.ssthresh {
            self.window += frame.plen;
        } else {
            self.window += max_udp_payload_size.saturating_mul(frame.plen) / self.window;
        }

        self.guard_recovery_start(now, max_idle_timeout_ms);

        was_blocked && self.in_flight < self.window
    }

    fn congestion_lost(
        &mut self,
        frame: &mut SentFrame,
        now: Timestamp,
        rst_pnum: PacketNumber,
        max_udp_payload_size: u32,
    ) -> bool {
        if frame.plen == 0 || frame.pnum < rst_pnum {
            return false;
        }

        let was_blocked = self.is_blocked();
        self.in_flight -= frame.plen;
        frame.plen = 0;

        if frame.send_time <= self.recovery_start {
            // already counted in an earlier loss of the same recovery period
        } else {
            self.recovery_start = now;
            self.window = (self.window / 2).max(2 * max_udp_payload_size);
            self.ssthresh = self.window;
            #[cfg(feature = "std")]
            tracing::trace!(window = self.window, ssthresh = self.ssthresh, "congestion_window_halved");
        }

        was_blocked && self.in_flight < self.window
    }

    fn persistent_congestion(&mut self, now: Timestamp, max_udp_payload_size: u32) {
        self.recovery_start = now;
        self.window = 2 * max_udp_payload_size;
        #[cfg(feature = "std")]
        tracing::debug!(window = self.window, "persistent_congestion_declared");
    }
}

mod private {
    pub trait Sealed {}
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A bare-bones stand-in for tests that only need to observe whether the
    /// hooks were invoked, without NewReno's actual arithmetic.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct RecordingController {
        pub acks: u32,
        pub losses: u32,
        pub persistent_congestions: u32,
        window: u32,
        ssthresh: u32,
        in_flight: u32,
        recovery_start: Timestamp,
    }

    impl RecordingController {
        pub fn new(window: u32) -> Self {
            Self {
                window,
                ssthresh: u32::MAX,
                ..Default::default()
            }
        }
    }

    impl private::Sealed for RecordingController {}

    impl CongestionController for RecordingController {
        fn window(&self) -> u32 {
            self.window
        }

        fn ssthresh(&self) -> u32 {
            self.ssthresh
        }

        fn in_flight(&self) -> u32 {
            self.in_flight
        }

        fn recovery_start(&self) -> Timestamp {
            self.recovery_start
        }

        fn on_packet_sent(&mut self, frame: &SentFrame, rst_pnum: PacketNumber) {
            if !frame.is_congestion_controlled() || frame.pnum < rst_pnum {
                return;
            }
            self.in_flight += frame.plen;
        }

        fn congestion_ack(
            &mut self,
            _frame: &SentFrame,
            _now: Timestamp,
            _rst_pnum: PacketNumber,
            _max_udp_payload_size: u32,
            _max_idle_timeout_ms: u64,
        ) -> bool {
            self.acks += 1;
            false
        }

        fn congestion_lost(
            &mut self,
            _frame: &mut SentFrame,
            _now: Timestamp,
            _rst_pnum: PacketNumber,
            _max_udp_payload_size: u32,
        ) -> bool {
            self.losses += 1;
            false
        }

        fn persistent_congestion(&mut self, _now: Timestamp, _max_udp_payload_size: u32) {
            self.persistent_congestions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    fn frame(pnum: u64, plen: u32, send_time: u64) -> SentFrame {
        SentFrame {
            pnum: PacketNumber::new(pnum),
            send_time: Timestamp::from_millis(send_time),
            plen,
            kind: FrameKind::Stream { stream_id: 0 },
            ignore_congestion: false,
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.1
    //= type=test
    //# Slow start exits when slow start threshold is exceeded.

    #[test]
    fn scenario_1_slow_start_grows_window_by_total_acked_bytes() {
        let mut cc = NewReno::new(12000);
        for pn in 0..5u64 {
            cc.on_packet_sent(&frame(pn, 1200, 0), PacketNumber::ZERO);
        }
        for pn in 0..5u64 {
            cc.congestion_ack(
                &frame(pn, 1200, 0),
                Timestamp::from_millis(50),
                PacketNumber::ZERO,
                1200,
                30_000,
            );
        }
        assert_eq!(cc.window(), 12000 + 5 * 1200);
    }

    #[test]
    fn loss_halves_window_and_sets_ssthresh() {
        let mut cc = NewReno::new(12000);
        cc.on_packet_sent(&frame(3, 1200, 0), PacketNumber::ZERO);
        let mut f = frame(3, 1200, 0);
        cc.congestion_lost(&mut f, Timestamp::from_millis(100), PacketNumber::ZERO, 1200);
        assert_eq!(cc.window(), (12000 / 2).max(2400));
        assert_eq!(cc.ssthresh(), cc.window());
        assert_eq!(f.plen, 0);
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
    //= type=test
    //# When persistent congestion is declared, the sender's congestion
    //# window MUST be reduced to the minimum congestion window
    //# (kMinimumWindow).

    #[test]
    fn scenario_6_persistent_congestion_collapses_window() {
        let mut cc = NewReno::new(50_000);
        cc.persistent_congestion(Timestamp::from_millis(900), 1200);
        assert_eq!(cc.window(), 2400);
        assert_eq!(cc.in_flight(), 0);
    }

    #[test]
    fn lost_frame_below_rst_pnum_is_ignored() {
        let mut cc = NewReno::new(12000);
        // sent before the reset boundary: on_packet_sent itself ignores it too.
        cc.on_packet_sent(&frame(1, 1200, 0), PacketNumber::new(5));
        let mut f = frame(1, 1200, 0);
        let changed = cc.congestion_lost(&mut f, Timestamp::from_millis(10), PacketNumber::new(5), 1200);
        assert!(!changed);
        assert_eq!(cc.window(), 12000);
        assert_eq!(f.plen, 1200);
    }
}
