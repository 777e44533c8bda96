// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Applies an incoming ACK frame against a single Send Context (section
//! 4.B): removes acknowledged frames, samples RTT, and hands back the
//! acked frames plus a loss-detector span so the connection can run the
//! congestion-ack hook and loss detection.

use crate::{
    ack::ranges::Range,
    collaborators::Collaborators,
    frame::FrameKind,
    packet_number::{EncryptionLevel, PacketNumber},
    recovery::rtt_estimator::RttEstimator,
    send_context::{SendContext, SentFrame},
    time::Timestamp,
    transport::TransportError,
    transport_error,
};
use alloc::vec::Vec;

const FRAME_TYPE_ACK: u64 = 0x02;

/// A decoded incoming ACK frame (RFC 9000 section 19.3). Wire decoding is
/// out of scope for this core; the surrounding packet parser builds this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckFrame {
    pub largest: u64,
    pub first_range: u64,
    /// Raw peer-reported delay, not yet scaled by `ack_delay_exponent`.
    pub delay: u64,
    pub ranges: Vec<Range>,
}

/// Peer transport parameters this core needs to interpret `delay` and to
/// bound the PTO/ack-delay calculations (section 3, `ctp`).
#[derive(Clone, Copy, Debug)]
pub struct AckDelayParams {
    pub ack_delay_exponent: u8,
    pub max_ack_delay_ms: u64,
    pub handshake_confirmed: bool,
}

impl Default for AckDelayParams {
    fn default() -> Self {
        Self {
            ack_delay_exponent: 3,
            max_ack_delay_ms: 25,
            handshake_confirmed: false,
        }
    }
}

/// The span of send times covered by one `handle_ack` call (the spec's
/// `st`), fed into loss detection's persistent-congestion check and RTT
/// sampling.
#[derive(Clone, Copy, Debug, Default)]
pub struct AckOutcome {
    /// Send time of the frame at the newly-largest acked packet number, if
    /// this call actually advanced `largest_ack`.
    pub max_pn: Option<Timestamp>,
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
}

impl AckOutcome {
    fn record(&mut self, send_time: Timestamp) {
        self.oldest = Some(self.oldest.map_or(send_time, |o| o.min(send_time)));
        self.newest = Some(self.newest.map_or(send_time, |n| n.max(send_time)));
    }
}

/// Entry point for an incoming ACK frame (section 4.B). Returns the acked
/// frames (for the caller's congestion-ack hook, which operates on
/// connection-wide state this module does not hold) and the `st` span for
/// loss detection, or a `TransportError` on a malformed frame.
#[allow(clippy::too_many_arguments)]
pub fn handle_ack(
    level: EncryptionLevel,
    ctx: &mut SendContext,
    ack: &AckFrame,
    rtt: &mut RttEstimator,
    params: AckDelayParams,
    now: Timestamp,
    pto_count: &mut u32,
    collaborators: &mut impl Collaborators,
) -> Result<(AckOutcome, Vec<SentFrame>), TransportError> {
    #[cfg(feature = "std")]
    tracing::trace!(?level, largest = ack.largest, first_range = ack.first_range, "ack_received");

    if ack.first_range > ack.largest {
        return Err(
            transport_error!(FRAME_ENCODING_ERROR, "ack first_range exceeds largest")
                .with_frame_type(FRAME_TYPE_ACK),
        );
    }

    let mut outcome = AckOutcome::default();
    let mut acked = Vec::new();

    let mut max = PacketNumber::new(ack.largest);
    let mut min = PacketNumber::new(ack.largest - ack.first_range);
    range_ack(level, ctx, min, max, &mut outcome, pto_count, collaborators, &mut acked)?;

    let advanced = ctx.largest_ack.is_none_or(|la| la < max);
    if advanced {
        ctx.largest_ack = Some(max);
    }
    if advanced {
        if let Some(send_time) = outcome.max_pn {
            sample_rtt(rtt, params, now, send_time, ack.delay);
        }
    }

    for r in &ack.ranges {
        if r.gap + 2 > min.as_u64() {
            return Err(
                transport_error!(FRAME_ENCODING_ERROR, "ack gap exceeds min")
                    .with_frame_type(FRAME_TYPE_ACK),
            );
        }
        let new_max = min.as_u64() - r.gap - 2;
        if r.range > new_max {
            return Err(
                transport_error!(FRAME_ENCODING_ERROR, "ack range exceeds computed max")
                    .with_frame_type(FRAME_TYPE_ACK),
            );
        }
        max = PacketNumber::new(new_max);
        min = PacketNumber::new(new_max - r.range);
        range_ack(level, ctx, min, max, &mut outcome, pto_count, collaborators, &mut acked)?;
    }

    Ok((outcome, acked))
}

/// Removes every in-flight frame in `[min, max]`, recording RTT/bookkeeping
/// state and running the per-frame hooks (section 4.B).
#[allow(clippy::too_many_arguments)]
fn range_ack(
    level: EncryptionLevel,
    ctx: &mut SendContext,
    min: PacketNumber,
    max: PacketNumber,
    outcome: &mut AckOutcome,
    pto_count: &mut u32,
    collaborators: &mut impl Collaborators,
    acked: &mut Vec<SentFrame>,
) -> Result<(), TransportError> {
    let removed = ctx.remove_range(min, max);

    if removed.is_empty() {
        if max < ctx.next_pnum() {
            // duplicate ack: OK, nothing left to do for this range.
            return Ok(());
        }
        return Err(
            transport_error!(PROTOCOL_VIOLATION, "unknown packet number")
                .with_frame_type(FRAME_TYPE_ACK),
        );
    }

    for frame in &removed {
        if frame.pnum == max {
            outcome.max_pn = Some(frame.send_time);
        }
        outcome.record(frame.send_time);

        if let FrameKind::Ack { through } = frame.kind {
            ctx.ack_db.drop_ack_ranges(through);
        }
        if let FrameKind::Stream { stream_id } | FrameKind::ResetStream { stream_id } = frame.kind
        {
            collaborators.handle_stream_ack(stream_id, frame.kind);
        }
    }

    // Application-level ranges report the observed datagram sizes for path
    // MTU discovery; Initial/Handshake are fixed-size and uninteresting here.
    if level.is_application() {
        let min_plen = removed.iter().map(|f| f.plen).min();
        let max_plen = removed.iter().map(|f| f.plen).max();
        if let (Some(min_plen), Some(max_plen)) = (min_plen, max_plen) {
            collaborators.handle_path_mtu(min_plen, max_plen);
        }
    }

    acked.extend(removed);
    *pto_count = 0;
    collaborators.post_push();
    Ok(())
}

/// RTT sampling (section 4.B): first sample seeds the estimator directly;
/// subsequent samples adjust for the peer's reported ack delay.
fn sample_rtt(
    rtt: &mut RttEstimator,
    params: AckDelayParams,
    now: Timestamp,
    send_time: Timestamp,
    raw_delay: u64,
) {
    let scaled = (raw_delay << params.ack_delay_exponent) / 1000;
    let ack_delay = if params.handshake_confirmed {
        scaled.min(params.max_ack_delay_ms)
    } else {
        scaled
    };
    rtt.update(now.as_millis(), send_time.as_millis(), ack_delay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collaborators::testing::MockCollaborators, frame::FrameKind};

    fn send_n(ctx: &mut SendContext, n: u64, plen: u32, now: Timestamp) {
        for _ in 0..n {
            ctx.record_sent(FrameKind::Stream { stream_id: 0 }, plen, now, false);
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2
    //= type=test
    //# A receiver acknowledges the receipt of duplicate packets by
    //# ignoring them.

    #[test]
    fn scenario_1_in_order_ack_empties_sent_and_samples_rtt() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        let mut pto_count = 0u32;
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 5, 1200, Timestamp::from_millis(0));

        let ack = AckFrame {
            largest: 4,
            first_range: 4,
            delay: 0,
            ranges: Vec::new(),
        };
        let (outcome, acked) = handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(50),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap();

        assert!(ctx.sent.is_empty());
        assert_eq!(acked.len(), 5);
        assert_eq!(outcome.max_pn, Some(Timestamp::from_millis(0)));
        assert_eq!(rtt.latest_rtt(), 50);
        assert_eq!(rtt.avg_rtt(), 50);
        assert_eq!(ctx.largest_ack, Some(PacketNumber::new(4)));
    }

    #[test]
    fn duplicate_ack_is_a_noop() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        let mut pto_count = 0u32;
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 5, 1200, Timestamp::from_millis(0));

        let ack = AckFrame {
            largest: 4,
            first_range: 4,
            delay: 0,
            ranges: Vec::new(),
        };
        handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(50),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap();

        // P6: feeding the same frame again is a no-op (sent is already empty,
        // and max < next_pnum, so it's treated as a duplicate ack).
        let (outcome, acked) = handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(60),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap();
        assert!(acked.is_empty());
        assert!(outcome.max_pn.is_none());
    }

    #[test]
    fn ack_for_unsent_packet_is_protocol_violation() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        let mut pto_count = 0u32;
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 2, 1200, Timestamp::from_millis(0));

        let ack = AckFrame {
            largest: 10,
            first_range: 0,
            delay: 0,
            ranges: Vec::new(),
        };
        let err = handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(50),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap_err();
        assert_eq!(err.code, TransportError::PROTOCOL_VIOLATION);
    }

    #[test]
    fn malformed_first_range_is_frame_encoding_error() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        let mut pto_count = 0u32;
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 2, 1200, Timestamp::from_millis(0));

        let ack = AckFrame {
            largest: 1,
            first_range: 5,
            delay: 0,
            ranges: Vec::new(),
        };
        let err = handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(50),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap_err();
        assert_eq!(err.code, TransportError::FRAME_ENCODING_ERROR);
    }

    #[test]
    fn ack_with_gap_leaves_unacked_frame_and_resets_pto_count() {
        let mut ctx = SendContext::new();
        let mut rtt = RttEstimator::new();
        let mut pto_count = 3u32;
        let mut collaborators = MockCollaborators::new(0);
        send_n(&mut ctx, 10, 1200, Timestamp::from_millis(0));

        // acks 9 and 0..7, leaving 8 unacked (scenario 2).
        let ack = AckFrame {
            largest: 9,
            first_range: 0,
            delay: 0,
            ranges: alloc::vec![Range { gap: 0, range: 7 }],
        };
        let (_, acked) = handle_ack(
            EncryptionLevel::Application,
            &mut ctx,
            &ack,
            &mut rtt,
            AckDelayParams::default(),
            Timestamp::from_millis(50),
            &mut pto_count,
            &mut collaborators,
        )
        .unwrap();
        assert_eq!(acked.len(), 9);
        assert_eq!(ctx.sent.len(), 1);
        assert_eq!(ctx.sent[0].pnum, PacketNumber::new(8));
        assert_eq!(pto_count, 0);
    }
}
