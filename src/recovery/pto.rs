// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Probe timeout scheduling and firing (section 4.E). Unlike the reference
//! codebase's `Pto`, which tracks its own armed `Timer` and a pending
//! transmission count consumed by a later `on_transmit` pass, this core's PTO
//! expression is stateless: the caller (the unified timer, section 4.E) asks
//! for the earliest due time across the three packet-number spaces, and on
//! expiration calls straight through to `on_expired`, which fires the probes
//! and bumps `pto_count` in one step.

use crate::{
    collaborators::Collaborators, frame::FrameKind, packet_number::EncryptionLevel,
    recovery::rtt_estimator::RttEstimator, send_context::SendContext, time::Timestamp,
    transport_error,
};

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
//# A sender SHOULD restart its PTO timer every time an ack-eliciting
//# packet is sent or acknowledged, or when Initial or Handshake keys are
//# discarded (Section 4.9 of [QUIC-TLS]).

/// The PTO expiration for one packet-number space, or `None` if it has
/// nothing in flight.
fn due_at(
    level: EncryptionLevel,
    ctx: &SendContext,
    rtt: &RttEstimator,
    pto_count: u32,
    max_ack_delay_ms: u64,
    handshake_confirmed: bool,
) -> Option<Timestamp> {
    let last = ctx.sent.back()?;
    let extra = if level.is_application() && handshake_confirmed {
        max_ack_delay_ms
    } else {
        0
    };
    let base = rtt.pto_base(extra) << pto_count.min(63);
    Some(last.send_time.saturating_add_millis(base))
}

/// The earliest PTO expiration across the three packet-number spaces, used by
/// the unified timer to arm the PTO when no loss timer is due (section 4.E).
/// `None` if nothing is in flight anywhere.
pub fn earliest_due(
    contexts: [(EncryptionLevel, &SendContext); 3],
    rtt: &RttEstimator,
    pto_count: u32,
    max_ack_delay_ms: u64,
    handshake_confirmed: bool,
) -> Option<Timestamp> {
    contexts
        .into_iter()
        .filter_map(|(level, ctx)| {
            due_at(level, ctx, rtt, pto_count, max_ack_delay_ms, handshake_confirmed)
        })
        .min()
}

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
//# When a PTO timer expires, a sender MUST send at least one ack-
//# eliciting packet in the packet number space as a probe.

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
//# An endpoint MAY send up to two full-sized datagrams containing
//# ack-eliciting packets to avoid an expensive consecutive PTO
//# expiration due to a single lost datagram or to transmit data from
//# multiple packet number spaces.

/// Fires the PTO: finds the first packet-number space (in `contexts` order)
/// whose expiration is at or before `now`, sends two PING probes on it with
/// `ignore_congestion = true`, and increments `pto_count` (section 4.E). A
/// no-op if nothing is due yet.
///
/// Probe allocation failure closes the connection (section 7) rather than
/// returning an error: this component has nothing to propagate a `Result`
/// to, since its caller is the timer dispatch loop, not a frame parser.
#[allow(clippy::too_many_arguments)]
pub fn on_expired(
    contexts: [(EncryptionLevel, &SendContext); 3],
    rtt: &RttEstimator,
    pto_count: &mut u32,
    max_ack_delay_ms: u64,
    handshake_confirmed: bool,
    now: Timestamp,
    collaborators: &mut impl Collaborators,
) {
    let count = *pto_count;
    let due = contexts.into_iter().find_map(|(level, ctx)| {
        let at = due_at(level, ctx, rtt, count, max_ack_delay_ms, handshake_confirmed)?;
        (at <= now).then_some(level)
    });

    let Some(level) = due else {
        return;
    };

    #[cfg(feature = "std")]
    tracing::debug!(?level, pto_count = count, "pto_fired");

    for _ in 0..2 {
        if !collaborators.frame_sendto(level, FrameKind::Ping, true) {
            collaborators
                .close_connection(transport_error!(INTERNAL_ERROR, "pto probe allocation failed"));
            return;
        }
    }

    *pto_count += 1;
}
