// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Decides when a pending reception should turn into an outgoing ACK frame
//! (section 4.E, `generate_ack`): either emit immediately, or delay up to
//! `max_ack_delay` when nothing else is queued at the application level.

use crate::{
    collaborators::{Collaborators, EventId},
    packet_number::EncryptionLevel,
    send_context::SendContext,
    time::Timestamp,
};

/// `MAX_ACK_GAP` (section 6): once this many receptions are pending an ACK,
/// the application-level delayed-ack exemption no longer applies.
pub const MAX_ACK_GAP: u32 = 2;

/// The timer event used to wake the connection loop once a delayed ACK's
/// `max_ack_delay` budget has elapsed.
pub const ACK_DELAY_EVENT: EventId = 1;

/// Emits a pending ACK on `level` now, or arms the delayed-ack timer and
/// returns, per the range database's outstanding state (section 4.E).
/// Immediate emission additionally requires send keys for `level` to be
/// available; otherwise the reception stays pending for a later call.
pub fn generate_ack(
    level: EncryptionLevel,
    ctx: &mut SendContext,
    now: Timestamp,
    max_ack_delay_ms: u64,
    collaborators: &mut impl Collaborators,
) {
    if ctx.ack_db.send_ack == 0 {
        return;
    }

    if level.is_application() {
        let elapsed = ctx
            .ack_db
            .ack_delay_start
            .map_or(0, |start| now.saturating_duration_since(start));
        let under_gap = ctx.ack_db.send_ack < MAX_ACK_GAP;
        let within_delay = elapsed < max_ack_delay_ms;
        if ctx.frames.is_empty() && under_gap && within_delay {
            collaborators.add_timer(ACK_DELAY_EVENT, max_ack_delay_ms - elapsed);
            return;
        }
    }

    // Nothing to send this level's ACK on yet: leave `send_ack` pending so a
    // later call (once keys are installed) picks this reception back up.
    if !collaborators.keys_available(level, true) {
        return;
    }

    if let Some(snapshot) = ctx.ack_db.snapshot() {
        collaborators.emit_ack(level, snapshot);
    }
    ctx.ack_db.send_ack = 0;
}
