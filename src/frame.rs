// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The tagged frame payload carried by a [`crate::send_context::SentFrame`],
//! and the `AckElicitation` classification RFC 9002 uses to decide which
//! packets demand acknowledgment.

use core::ops::{BitOr, BitOrAssign};

#[cfg(any(test, feature = "generator"))]
use bolero_generator::prelude::*;

//= https://www.rfc-editor.org/rfc/rfc9002#section-2
//# Ack-eliciting packets:  Packets that contain ack-eliciting frames
//#    elicit an ACK from the receiver within the maximum acknowledgement
//#    delay and are called ack-eliciting packets.

/// Describes whether a frame or packet requires an ACK from the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "generator"), derive(TypeGenerator))]
pub enum AckElicitation {
    NonEliciting,
    Eliciting,
}

impl Default for AckElicitation {
    fn default() -> Self {
        Self::NonEliciting
    }
}

impl AckElicitation {
    #[inline]
    pub fn is_ack_eliciting(self) -> bool {
        matches!(self, Self::Eliciting)
    }
}

impl BitOr for AckElicitation {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Eliciting, _) | (_, Self::Eliciting) => Self::Eliciting,
            (_, _) => Self::NonEliciting,
        }
    }
}

impl BitOrAssign for AckElicitation {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
//# An endpoint MUST NOT send a packet if it would cause ack_elicited_since_last_ack
//# to exceed... ; all frames other than ACK, PADDING, and CONNECTION_CLOSE are
//# considered ack-eliciting.

/// The direction a `MAX_STREAMS` frame governs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "generator"), derive(TypeGenerator))]
pub enum StreamDirection {
    Bidirectional,
    Unidirectional,
}

/// Opaque identifier for a stream, as used by `find_stream` (section 6).
pub type StreamId = u64;

/// The tagged payload of a frame tracked by a Send Context.
///
/// Resend behavior (section 4.C) is per-variant; variants are intentionally
/// not collapsed into a single "retransmittable data" blob, since each one
/// is resent, discarded, or re-queued with refreshed values differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "generator"), derive(TypeGenerator))]
pub enum FrameKind {
    /// A pure ACK frame: never congestion-controlled, freed (not resent) on
    /// loss. `through` is the `largest` field it carried, so that acking
    /// this frame lets the receiver-side range DB drop ranges at or below it.
    Ack {
        through: u64,
    },
    Stream {
        stream_id: StreamId,
    },
    ResetStream {
        stream_id: StreamId,
    },
    /// A PTO probe or keepalive; discarded rather than resent on loss.
    Ping,
    PathChallenge,
    PathResponse,
    ConnectionClose,
    /// Re-queued with the *current* connection data limit on loss, not the
    /// stale `value` this frame was built with.
    MaxData {
        value: u64,
    },
    MaxStreams {
        direction: StreamDirection,
        value: u64,
    },
    MaxStreamData {
        stream_id: StreamId,
        value: u64,
    },
    /// Any other frame type: re-queued verbatim at the tail of `frames`.
    Other,
}

impl FrameKind {
    /// Returns `true` if this frame type carries per-stream credit and
    /// should be resent to the stream tree for handling rather than
    /// requeued directly onto the Send Context.
    #[inline]
    pub fn is_stream_ack_target(self) -> bool {
        matches!(self, Self::Stream { .. } | Self::ResetStream { .. })
    }
}

impl AckElicitation {
    /// Computes the ack-elicitation of a frame kind per RFC 9002 section 2.
    #[inline]
    pub fn of(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Ack { .. } | FrameKind::ConnectionClose => Self::NonEliciting,
            _ => Self::Eliciting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //= https://www.rfc-editor.org/rfc/rfc9002#section-2
    //= type=test
    //# Ack-eliciting packets:  Packets that contain ack-eliciting frames
    //#    elicit an ACK from the receiver within the maximum acknowledgement
    //#    delay and are called ack-eliciting packets.
    #[test]
    fn ack_and_connection_close_are_not_eliciting() {
        assert_eq!(
            AckElicitation::of(FrameKind::Ack { through: 0 }),
            AckElicitation::NonEliciting
        );
        assert_eq!(
            AckElicitation::of(FrameKind::ConnectionClose),
            AckElicitation::NonEliciting
        );
    }

    #[test]
    fn stream_and_ping_are_eliciting() {
        assert!(AckElicitation::of(FrameKind::Ping).is_ack_eliciting());
        assert!(AckElicitation::of(FrameKind::Stream { stream_id: 0 }).is_ack_eliciting());
    }

    #[test]
    fn bitor_prefers_eliciting() {
        let mut e = AckElicitation::NonEliciting;
        e |= AckElicitation::Eliciting;
        assert_eq!(e, AckElicitation::Eliciting);
    }
}
