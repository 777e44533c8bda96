// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The `Connection`: owns the three per-level Send Contexts, the RTT
//! estimator, the congestion controller, and the unified recovery timer, and
//! wires them together per the data flow in section 2 (incoming packet → ACK
//! handling → frame dequeue → CC ack hook & RTT update → loss scan → CC lost
//! hook → timer reschedule).

use crate::{
    ack::{
        generate::generate_ack,
        receiver::{handle_ack, AckDelayParams, AckFrame},
    },
    collaborators::Collaborators,
    packet_number::{EncryptionLevel, PacketNumber},
    recovery::{
        congestion_controller::{CongestionController, NewReno},
        loss::detect_lost,
        pto,
        rtt_estimator::RttEstimator,
        timer::{Mode as TimerMode, RecoveryTimer},
    },
    send_context::{SendContext, SentFrame},
    time::Timestamp,
    transport::TransportError,
};

/// `MAX_ACK_GAP` (section 6): re-exported at the connection boundary since
/// every recovery call that schedules ACK emission needs it.
pub use crate::ack::generate::MAX_ACK_GAP;

/// Transport parameters negotiated with the peer that this core's timers and
/// RTT sampling need (section 3, `ctp`).
#[derive(Clone, Copy, Debug)]
pub struct PeerTransportParameters {
    pub ack_delay_exponent: u8,
    pub max_ack_delay_ms: u64,
    pub max_idle_timeout_ms: u64,
    pub handshake_confirmed: bool,
}

impl Default for PeerTransportParameters {
    fn default() -> Self {
        Self {
            ack_delay_exponent: 3,
            max_ack_delay_ms: 25,
            max_idle_timeout_ms: 30_000,
            handshake_confirmed: false,
        }
    }
}

/// Local transport parameters (section 3, `tp`).
#[derive(Clone, Copy, Debug)]
pub struct LocalTransportParameters {
    pub max_udp_payload_size: u32,
}

impl Default for LocalTransportParameters {
    fn default() -> Self {
        Self {
            max_udp_payload_size: 1200,
        }
    }
}

/// The connection-scoped recovery state (section 3). Generic packet
/// encryption, stream state, and the wire format are out of scope: this
/// struct holds exactly the fields this core's algorithms need.
#[derive(Debug)]
pub struct Connection {
    initial: SendContext,
    handshake: SendContext,
    application: SendContext,

    rtt: RttEstimator,
    congestion: NewReno,
    pto_count: u32,
    timer: RecoveryTimer,

    /// PN boundary below which congestion accounting is ignored (post-reset).
    rst_pnum: PacketNumber,
    pub ctp: PeerTransportParameters,
    pub tp: LocalTransportParameters,
    pub closing: bool,
}

impl Connection {
    pub fn new(ctp: PeerTransportParameters, tp: LocalTransportParameters) -> Self {
        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
        //# Endpoints SHOULD use an initial congestion window of ten times the
        //# maximum datagram size, while limiting the window to the larger of
        //# 14,720 bytes or twice the maximum datagram size.
        let initial_window = 10 * tp.max_udp_payload_size;
        Self {
            initial: SendContext::new(),
            handshake: SendContext::new(),
            application: SendContext::new(),
            rtt: RttEstimator::new(),
            congestion: NewReno::new(initial_window),
            pto_count: 0,
            timer: RecoveryTimer::new(),
            rst_pnum: PacketNumber::ZERO,
            ctp,
            tp,
            closing: false,
        }
    }

    #[inline]
    pub fn context(&self, level: EncryptionLevel) -> &SendContext {
        match level {
            EncryptionLevel::Initial => &self.initial,
            EncryptionLevel::Handshake => &self.handshake,
            EncryptionLevel::Application => &self.application,
        }
    }

    #[inline]
    pub fn context_mut(&mut self, level: EncryptionLevel) -> &mut SendContext {
        match level {
            EncryptionLevel::Initial => &mut self.initial,
            EncryptionLevel::Handshake => &mut self.handshake,
            EncryptionLevel::Application => &mut self.application,
        }
    }

    #[inline]
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    #[inline]
    pub fn congestion(&self) -> &NewReno {
        &self.congestion
    }

    #[inline]
    pub fn pto_count(&self) -> u32 {
        self.pto_count
    }

    #[inline]
    pub fn timer(&self) -> &RecoveryTimer {
        &self.timer
    }

    /// Resets `rst_pnum` to the given boundary (used after a key update or
    /// path migration resets congestion accounting for older packets).
    pub fn set_rst_pnum(&mut self, pnum: PacketNumber) {
        self.rst_pnum = pnum;
    }

    fn ack_delay_params(&self) -> AckDelayParams {
        AckDelayParams {
            ack_delay_exponent: self.ctp.ack_delay_exponent,
            max_ack_delay_ms: self.ctp.max_ack_delay_ms,
            handshake_confirmed: self.ctp.handshake_confirmed,
        }
    }

    /// Rearms the unified recovery timer against the current state of all
    /// three Send Contexts (section 4.E). The context array is built as
    /// direct field projections (rather than through a helper returning a
    /// borrow of `self`) so the borrow checker sees `timer`, `initial`,
    /// `handshake`, `application`, and `rtt` as disjoint.
    fn rearm_timer(&mut self, now: Timestamp) {
        self.timer.rearm(
            [
                (EncryptionLevel::Initial, &self.initial),
                (EncryptionLevel::Handshake, &self.handshake),
                (EncryptionLevel::Application, &self.application),
            ],
            &self.rtt,
            self.pto_count,
            self.ctp.max_ack_delay_ms,
            self.ctp.handshake_confirmed,
            now,
        );
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2
    //# An endpoint SHOULD acknowledge..., regardless of whether the packet
    //# is the first it has received from the sender.

    /// Applies an incoming ACK frame on `level` (section 4.B), then runs
    /// loss detection with the resulting ack span (section 4.C), then
    /// reschedules the recovery timer (section 4.E). This is the one entry
    /// point through which ACK handling, loss detection, and timer
    /// rearming happen atomically with respect to each other (section 5).
    pub fn on_ack_frame(
        &mut self,
        level: EncryptionLevel,
        ack: &AckFrame,
        now: Timestamp,
        collaborators: &mut impl Collaborators,
    ) -> Result<(), TransportError> {
        let params = self.ack_delay_params();

        let (outcome, acked) = match level {
            EncryptionLevel::Initial => handle_ack(
                level,
                &mut self.initial,
                ack,
                &mut self.rtt,
                params,
                now,
                &mut self.pto_count,
                collaborators,
            )?,
            EncryptionLevel::Handshake => handle_ack(
                level,
                &mut self.handshake,
                ack,
                &mut self.rtt,
                params,
                now,
                &mut self.pto_count,
                collaborators,
            )?,
            EncryptionLevel::Application => handle_ack(
                level,
                &mut self.application,
                ack,
                &mut self.rtt,
                params,
                now,
                &mut self.pto_count,
                collaborators,
            )?,
        };

        for frame in &acked {
            let unblocked = self.congestion.congestion_ack(
                frame,
                now,
                self.rst_pnum,
                self.tp.max_udp_payload_size,
                self.ctp.max_idle_timeout_ms,
            );
            if unblocked {
                collaborators.post_push();
            }
        }

        detect_lost(
            [
                (EncryptionLevel::Initial, &mut self.initial),
                (EncryptionLevel::Handshake, &mut self.handshake),
                (EncryptionLevel::Application, &mut self.application),
            ],
            &mut self.rtt,
            &mut self.congestion,
            collaborators,
            self.rst_pnum,
            self.tp.max_udp_payload_size,
            self.ctp.max_idle_timeout_ms,
            MAX_ACK_GAP,
            self.ctp.max_ack_delay_ms,
            now,
            Some(outcome),
            self.closing,
        );

        self.rearm_timer(now);
        Ok(())
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
    //# A sender SHOULD restart its PTO timer every time an ack-eliciting
    //# packet is sent or acknowledged, or when Initial or Handshake keys are
    //# discarded (Section 4.9 of [QUIC-TLS]).

    /// Records a just-sent frame on `level`'s Send Context and reschedules
    /// the recovery timer.
    pub fn on_packet_sent(
        &mut self,
        level: EncryptionLevel,
        kind: crate::frame::FrameKind,
        plen: u32,
        now: Timestamp,
        ignore_congestion: bool,
    ) -> PacketNumber {
        let pnum = self
            .context_mut(level)
            .record_sent(kind, plen, now, ignore_congestion);
        self.congestion.on_packet_sent(
            &SentFrame {
                pnum,
                send_time: now,
                plen,
                kind,
                ignore_congestion,
            },
            self.rst_pnum,
        );
        self.rearm_timer(now);
        pnum
    }

    /// Records a received packet number in `level`'s ACK range database and
    /// forwards any out-of-band flush the database forces (section 4.E).
    pub fn on_packet_received(
        &mut self,
        level: EncryptionLevel,
        pnum: u64,
        need_ack: bool,
        now: Timestamp,
        collaborators: &mut impl Collaborators,
    ) {
        let ctx = self.context_mut(level);
        if let Some(snapshot) = ctx
            .ack_db
            .on_packet_received(pnum, need_ack, now, MAX_ACK_GAP)
        {
            collaborators.emit_ack(level, snapshot);
        }
    }

    /// Decides whether `level`'s pending reception should turn into an
    /// outgoing ACK now, or a delayed one (section 4.E).
    pub fn generate_ack(
        &mut self,
        level: EncryptionLevel,
        now: Timestamp,
        collaborators: &mut impl Collaborators,
    ) {
        let max_ack_delay_ms = self.ctp.max_ack_delay_ms;
        generate_ack(
            level,
            self.context_mut(level),
            now,
            max_ack_delay_ms,
            collaborators,
        );
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2
    //# A sender that has not received an acknowledgment for ack-eliciting
    //# data it has sent MUST discover whether the network path to the peer
    //# is functioning.

    /// Fires the recovery timer if due (section 4.E): either a timeout-only
    /// loss scan (`detect_lost(None)`) or a PTO probe, then reschedules.
    pub fn on_timer_expired(&mut self, now: Timestamp, collaborators: &mut impl Collaborators) {
        let Some(mode) = self.timer.on_timeout(now) else {
            return;
        };

        match mode {
            TimerMode::Lost => {
                detect_lost(
                    [
                        (EncryptionLevel::Initial, &mut self.initial),
                        (EncryptionLevel::Handshake, &mut self.handshake),
                        (EncryptionLevel::Application, &mut self.application),
                    ],
                    &mut self.rtt,
                    &mut self.congestion,
                    collaborators,
                    self.rst_pnum,
                    self.tp.max_udp_payload_size,
                    self.ctp.max_idle_timeout_ms,
                    MAX_ACK_GAP,
                    self.ctp.max_ack_delay_ms,
                    now,
                    None,
                    self.closing,
                );
            }
            TimerMode::Pto => {
                pto::on_expired(
                    [
                        (EncryptionLevel::Initial, &self.initial),
                        (EncryptionLevel::Handshake, &self.handshake),
                        (EncryptionLevel::Application, &self.application),
                    ],
                    &self.rtt,
                    &mut self.pto_count,
                    self.ctp.max_ack_delay_ms,
                    self.ctp.handshake_confirmed,
                    now,
                    collaborators,
                );
            }
        }

        self.rearm_timer(now);
    }

    /// Cancels the recovery timer and drops all queued/in-flight state on
    /// connection close (section 5, cancellation).
    pub fn close(&mut self) {
        self.closing = true;
        self.timer.cancel();
        self.initial.drop_all();
        self.handshake.drop_all();
        self.application.drop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ack::ranges::Range, collaborators::testing::MockCollaborators, frame::FrameKind};
    use alloc::vec::Vec;

    fn conn() -> Connection {
        Connection::new(
            PeerTransportParameters {
                handshake_confirmed: true,
                ..PeerTransportParameters::default()
            },
            LocalTransportParameters::default(),
        )
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.1
    //= type=test
    //# Slow start exits when slow start threshold is exceeded.

    #[test]
    fn scenario_1_end_to_end_ack_grows_window_and_samples_rtt() {
        let mut c = conn();
        let mut collaborators = MockCollaborators::new(0);

        for _ in 0..5u64 {
            c.on_packet_sent(
                EncryptionLevel::Application,
                FrameKind::Stream { stream_id: 0 },
                1200,
                Timestamp::from_millis(0),
                false,
            );
        }

        let ack = AckFrame {
            largest: 4,
            first_range: 4,
            delay: 0,
            ranges: Vec::new(),
        };
        c.on_ack_frame(
            EncryptionLevel::Application,
            &ack,
            Timestamp::from_millis(50),
            &mut collaborators,
        )
        .unwrap();

        assert!(c.context(EncryptionLevel::Application).sent.is_empty());
        assert_eq!(c.rtt().latest_rtt(), 50);
        assert_eq!(c.congestion().window(), 10 * 1200 + 5 * 1200);
        assert!(!c.timer().is_armed()); // nothing left in flight anywhere
    }

    #[test]
    fn scenario_2_gap_then_time_threshold_declares_loss_and_halves_window() {
        let mut c = conn();
        let mut collaborators = MockCollaborators::new(0);

        for _ in 0..10u64 {
            c.on_packet_sent(
                EncryptionLevel::Application,
                FrameKind::Stream { stream_id: 0 },
                1200,
                Timestamp::from_millis(0),
                false,
            );
        }

        // acks 9 and 0..7, leaving 8 unacked.
        let ack = AckFrame {
            largest: 9,
            first_range: 0,
            delay: 0,
            ranges: alloc::vec![Range { gap: 0, range: 7 }],
        };
        c.on_ack_frame(
            EncryptionLevel::Application,
            &ack,
            Timestamp::from_millis(50),
            &mut collaborators,
        )
        .unwrap();
        assert_eq!(c.context(EncryptionLevel::Application).sent.len(), 1);

        let window_before = c.congestion().window();
        let thr = c.rtt().loss_time_threshold();
        let later = Timestamp::from_millis(50 + thr + 1);
        collaborators.advance_to(50 + thr + 1);
        c.on_timer_expired(later, &mut collaborators);

        assert!(c.context(EncryptionLevel::Application).sent.is_empty());
        assert!(c.congestion().window() < window_before);
        assert_eq!(c.congestion().ssthresh(), c.congestion().window());
    }

    #[test]
    fn malformed_ack_surfaces_transport_error() {
        let mut c = conn();
        let mut collaborators = MockCollaborators::new(0);
        c.on_packet_sent(
            EncryptionLevel::Application,
            FrameKind::Stream { stream_id: 0 },
            1200,
            Timestamp::from_millis(0),
            false,
        );

        let ack = AckFrame {
            largest: 0,
            first_range: 5,
            delay: 0,
            ranges: Vec::new(),
        };
        let err = c
            .on_ack_frame(
                EncryptionLevel::Application,
                &ack,
                Timestamp::from_millis(10),
                &mut collaborators,
            )
            .unwrap_err();
        assert_eq!(err.code, TransportError::FRAME_ENCODING_ERROR);
    }

    #[test]
    fn close_cancels_timer_and_drops_all_in_flight_state() {
        let mut c = conn();
        c.on_packet_sent(
            EncryptionLevel::Initial,
            FrameKind::Other,
            1200,
            Timestamp::from_millis(0),
            false,
        );
        assert!(c.timer().is_armed());

        c.close();
        assert!(c.closing);
        assert!(!c.timer().is_armed());
        assert!(c.context(EncryptionLevel::Initial).sent.is_empty());
    }

    #[test]
    fn generate_ack_delays_application_level_reception() {
        let mut c = conn();
        let mut collaborators = MockCollaborators::new(0);
        c.on_packet_received(
            EncryptionLevel::Application,
            3,
            true,
            Timestamp::from_millis(0),
            &mut collaborators,
        );
        c.generate_ack(
            EncryptionLevel::Application,
            Timestamp::from_millis(5),
            &mut collaborators,
        );
        assert!(collaborators.acks_sent.is_empty());
        assert_eq!(
            collaborators
                .armed_timers
                .get(&crate::ack::generate::ACK_DELAY_EVENT),
            Some(&20)
        );
    }
}
