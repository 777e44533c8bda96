// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet- and time-threshold loss detection, resend dispatch, and the
//! persistent-congestion check (section 4.C).

use crate::{
    ack::receiver::AckOutcome,
    collaborators::{Collaborators, StreamState},
    frame::FrameKind,
    packet_number::{EncryptionLevel, PacketNumber},
    recovery::{congestion_controller::CongestionController, rtt_estimator::RttEstimator},
    send_context::{SendContext, SentFrame},
    time::Timestamp,
};
use alloc::vec::Vec;

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.1
//# The RECOMMENDED initial value for the packet reordering threshold
//# (kPacketThreshold) is 3.
const PKT_THR: u64 = 3;

/// The span of newly-lost packets this call declared, used by the caller to
/// check persistent congestion against the ack-reception span (`st`).
#[derive(Clone, Copy, Debug, Default)]
pub struct LossEvent {
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
    pub nlost: u32,
}

/// Scans every Send Context with a known `largest_ack` from the head,
/// declaring packets lost by packet threshold or time threshold, dispatching
/// resend, invoking the congestion-lost hook, and checking persistent
/// congestion against `ack_span` (section 4.C).
#[allow(clippy::too_many_arguments)]
pub fn detect_lost(
    contexts: [(EncryptionLevel, &mut SendContext); 3],
    rtt: &mut RttEstimator,
    cc: &mut impl CongestionController,
    collaborators: &mut impl Collaborators,
    rst_pnum: PacketNumber,
    max_udp_payload_size: u32,
    max_idle_timeout_ms: u64,
    max_ack_gap: u32,
    max_ack_delay_ms: u64,
    now: Timestamp,
    ack_span: Option<AckOutcome>,
    closing: bool,
) -> LossEvent {
    let thr = rtt.loss_time_threshold();
    let mut event = LossEvent::default();

    for (level, ctx) in contexts {
        let Some(largest_ack) = ctx.largest_ack else {
            continue;
        };

        loop {
            let Some(start) = ctx.sent.front().copied() else {
                break;
            };
            if start.pnum > largest_ack {
                break;
            }

            let by_time = start.send_time.saturating_add_millis(thr) <= now;
            let by_count = largest_ack.checked_distance(start.pnum).unwrap_or(0) >= PKT_THR;
            if !by_time && !by_count {
                break;
            }

            let mut lost = Vec::new();
            while let Some(f) = ctx.sent.front() {
                if f.pnum != start.pnum {
                    break;
                }
                lost.push(ctx.sent.pop_front().expect("front just matched"));
            }

            #[cfg(feature = "std")]
            tracing::trace!(?level, pn = start.pnum.as_u64(), by_time, by_count, "packet_declared_lost");

            if let Some(first_rtt) = rtt.first_rtt() {
                if start.send_time.as_millis() > first_rtt {
                    event.oldest = Some(event.oldest.map_or(start.send_time, |o| o.min(start.send_time)));
                    event.newest = Some(event.newest.map_or(start.send_time, |n| n.max(start.send_time)));
                    event.nlost += 1;
                }
            }

            resend_packet(
                level,
                &mut *ctx,
                lost,
                cc,
                collaborators,
                rst_pnum,
                max_udp_payload_size,
                max_ack_gap,
                now,
                closing,
            );
        }
    }

    if let Some(st) = ack_span {
        if event.nlost >= 2 {
            if let (Some(oldest), Some(newest)) = (event.oldest, event.newest) {
                let disjoint =
                    st.newest.is_none_or(|n| n < oldest) || st.oldest.is_none_or(|o| o > newest);
                if disjoint {
                    let duration = newest.saturating_duration_since(oldest);
                    let pcg_duration = rtt.persistent_congestion_duration(max_ack_delay_ms);
                    if duration > pcg_duration {
                        #[cfg(feature = "std")]
                        tracing::debug!(duration, pcg_duration, "persistent_congestion_window_exceeded");
                        cc.persistent_congestion(now, max_udp_payload_size);
                        rtt.on_persistent_congestion();
                    }
                }
            }
        }
    }

    event
}

/// Processes every frame of one declared-lost packet: invokes the
/// congestion-lost hook exactly once (on the first frame), then resends
/// each frame per its type (section 4.C).
#[allow(clippy::too_many_arguments)]
fn resend_packet(
    level: EncryptionLevel,
    ctx: &mut SendContext,
    mut frames: Vec<SentFrame>,
    cc: &mut impl CongestionController,
    collaborators: &mut impl Collaborators,
    rst_pnum: PacketNumber,
    max_udp_payload_size: u32,
    max_ack_gap: u32,
    now: Timestamp,
    closing: bool,
) {
    if let Some(first) = frames.first_mut() {
        let unblocked = cc.congestion_lost(first, now, rst_pnum, max_udp_payload_size);
        if unblocked {
            collaborators.post_push();
        }
    }

    for frame in frames {
        resend_frame(level, ctx, frame, collaborators, max_ack_gap);
    }

    if !closing {
        collaborators.post_push();
    }
}

fn resend_frame(
    level: EncryptionLevel,
    ctx: &mut SendContext,
    frame: SentFrame,
    collaborators: &mut impl Collaborators,
    max_ack_gap: u32,
) {
    match frame.kind {
        FrameKind::Ack { .. } => {
            if level.is_application() {
                ctx.ack_db.force_flush(max_ack_gap);
            }
        }
        FrameKind::Ping
        | FrameKind::PathChallenge
        | FrameKind::PathResponse
        | FrameKind::ConnectionClose => {
            // discarded: none of these are meaningfully retransmitted verbatim
        }
        FrameKind::MaxData { .. } => {
            let value = collaborators.current_max_data();
            collaborators.queue_frame(level, FrameKind::MaxData { value });
        }
        FrameKind::MaxStreams { direction, .. } => {
            let value = collaborators.current_max_streams(direction);
            collaborators.queue_frame(level, FrameKind::MaxStreams { direction, value });
        }
        FrameKind::MaxStreamData { stream_id, .. } => {
            let value = collaborators.current_max_stream_data(stream_id);
            collaborators.queue_frame(level, FrameKind::MaxStreamData { stream_id, value });
        }
        FrameKind::Stream { stream_id } | FrameKind::ResetStream { stream_id } => {
            match collaborators.find_stream(stream_id) {
                StreamState::Reset | StreamState::Deleted => {}
                StreamState::Open => ctx.enqueue(frame.kind),
            }
        }
        FrameKind::Other => ctx.enqueue(frame.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::testing::MockCollaborators, recovery::congestion_controller::NewReno,
    };

    fn send_n(ctx: &mut SendContext, n: u64, plen: u32, now: Timestamp) {
        for _ in 0..n {
            ctx.record_sent(FrameKind::Stream { stream_id: 0 }, plen, now, false);
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1
    //= type=test
    //# A packet is declared lost if it meets all of the following
    //# conditions: the packet is unacknowledged, in flight, and was sent
    //# prior to an acknowledged packet; the packet was sent kPacketThreshold
    //# packets before an acknowledged packet, or it was sent long enough in
    //# the past.

    #[test]
    fn scenario_2_packet_threshold_not_yet_met_then_declared_lost() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        rtt.update(10, 0, 0); // seed a sample so first_rtt is set
        let mut cc = NewReno::new(12000);
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 10, 1200, Timestamp::from_millis(0));
        ctx.largest_ack = Some(PacketNumber::new(9));
        // pretend 0..7 and 9 are acked, leaving only 8 in `sent`.
        ctx.sent.retain(|f| f.pnum == PacketNumber::new(8));

        let mut initial = SendContext::new();
        let mut handshake = SendContext::new();
        let event = detect_lost(
            [
                (EncryptionLevel::Initial, &mut initial),
                (EncryptionLevel::Handshake, &mut handshake),
                (EncryptionLevel::Application, &mut ctx),
            ],
            &mut rtt,
            &mut cc,
            &mut collaborators,
            PacketNumber::ZERO,
            1200,
            30_000,
            2,
            25,
            Timestamp::from_millis(11),
            None,
            false,
        );
        // 9 - 8 = 1 < PKT_THR(3), and elapsed time is tiny: not yet lost.
        assert_eq!(event.nlost, 0);
        assert_eq!(ctx.sent.len(), 1);
    }

    #[test]
    fn scenario_3_packet_threshold_declares_immediate_loss() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        rtt.update(10, 0, 0);
        let mut cc = NewReno::new(12000);
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 10, 1200, Timestamp::from_millis(0));
        ctx.largest_ack = Some(PacketNumber::new(9));
        // acks 7..9 only: 0..6 remain in `sent`.
        ctx.sent.retain(|f| f.pnum.as_u64() <= 6);

        let mut initial = SendContext::new();
        let mut handshake = SendContext::new();
        let event = detect_lost(
            [
                (EncryptionLevel::Initial, &mut initial),
                (EncryptionLevel::Handshake, &mut handshake),
                (EncryptionLevel::Application, &mut ctx),
            ],
            &mut rtt,
            &mut cc,
            &mut collaborators,
            PacketNumber::ZERO,
            1200,
            30_000,
            2,
            25,
            Timestamp::from_millis(11),
            None,
            false,
        );
        // 9-6=3 >= PKT_THR: 6 lost immediately, and so is everything before it.
        assert_eq!(event.nlost, 7);
        assert!(ctx.sent.is_empty());
    }

    #[test]
    fn lost_max_data_is_requeued_with_current_not_stale_value() {
        let mut ctx = SendContext::new();
        let mut collaborators = MockCollaborators::new(0);
        collaborators.max_data = 9_000;

        let stale = SentFrame {
            pnum: PacketNumber::new(0),
            send_time: Timestamp::from_millis(0),
            plen: 0,
            kind: FrameKind::MaxData { value: 1_000 },
            ignore_congestion: false,
        };
        resend_frame(EncryptionLevel::Application, &mut ctx, stale, &mut collaborators, 20);

        assert_eq!(
            collaborators.requeued,
            alloc::vec![(
                EncryptionLevel::Application,
                FrameKind::MaxData { value: 9_000 }
            )]
        );
    }
}
