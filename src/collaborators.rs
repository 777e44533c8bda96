// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Seams onto the surrounding server that this core does not implement
//! itself (section 6): key availability, stream-tree lookups, the sender's
//! frame lifecycle, and the event/timer scheduling primitives.
//!
//! Keeping these behind one small trait -- rather than depending on concrete
//! sender/stream-tree types -- mirrors the reference codebase's practice of
//! putting such seams behind traits like `congestion_controller::Endpoint`
//! or `timer::Provider`, so this crate compiles and is testable standalone.

use crate::{
    ack::ranges::AckRangesSnapshot,
    frame::{FrameKind, StreamDirection, StreamId},
    packet_number::EncryptionLevel,
    time::Timestamp,
};

/// An opaque handle identifying a scheduled timer/event.
pub type EventId = u64;

/// Outcome of a stream lookup used to decide resend behavior for
/// STREAM / RESET_STREAM / MAX_STREAM_DATA frames (section 4.C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// The stream still accepts retransmission of this frame.
    Open,
    /// The stream has been reset (RESET_SENT / RESET_RECVD); frames
    /// referencing it are dropped rather than resent.
    Reset,
    /// The stream no longer exists.
    Deleted,
}

/// Collaborators this core depends on but does not implement.
pub trait Collaborators {
    /// Monotonic wall clock, in milliseconds.
    fn current_msec(&self) -> Timestamp;

    /// Whether keys for `level` are available, guarding ACK emission.
    fn keys_available(&self, level: EncryptionLevel, is_send: bool) -> bool;

    /// Current state of `stream_id`, for STREAM/RESET_STREAM/MAX_STREAM_DATA resend.
    fn find_stream(&self, stream_id: StreamId) -> StreamState;

    /// Stream-level credit return for an acknowledged STREAM/RESET_STREAM frame.
    fn handle_stream_ack(&mut self, stream_id: StreamId, frame: FrameKind);

    /// Current connection-level data limit, used to refresh a MAX_DATA frame on resend.
    fn current_max_data(&self) -> u64;

    /// Current stream limit for `direction`, used to refresh a MAX_STREAMS frame on resend.
    fn current_max_streams(&self, direction: StreamDirection) -> u64;

    /// Current per-stream data limit, used to refresh a MAX_STREAM_DATA frame on resend.
    fn current_max_stream_data(&self, stream_id: StreamId) -> u64;

    /// Notifies the path of an observed MTU bound from an ACK range (application level only).
    fn handle_path_mtu(&mut self, min: u32, max: u32);

    /// Re-queues `kind` for transmission on the given level's Send Context.
    fn queue_frame(&mut self, level: EncryptionLevel, kind: FrameKind);

    /// Transmits an ACK frame built from `snapshot` on `level`, either as
    /// part of the normal send path or as a forced flush from an ACK range
    /// database overflow (section 4.E).
    fn emit_ack(&mut self, level: EncryptionLevel, snapshot: AckRangesSnapshot);

    /// Emits a frame immediately, bypassing the normal queue (used by PTO probes).
    /// Returns `false` on allocation failure, which the caller surfaces as a
    /// connection close (section 7).
    fn frame_sendto(&mut self, level: EncryptionLevel, kind: FrameKind, ignore_congestion: bool) -> bool;

    /// Posts a "there may be more work to do" event, coalesced by the caller.
    fn post_push(&mut self);

    /// Arms a timer/event to fire `ms` from now.
    fn add_timer(&mut self, event: EventId, ms: u64);

    /// Cancels a previously armed timer/event.
    fn del_timer(&mut self, event: EventId);

    /// Fatal path: terminates the connection with `err`.
    fn close_connection(&mut self, err: crate::transport::TransportError);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use alloc::{collections::BTreeMap, vec::Vec};

    /// A recording mock of [`Collaborators`] for unit tests: every hook just
    /// records its call so tests can assert on what this core would have
    /// triggered, without pulling in a real sender or stream tree.
    #[derive(Debug, Default)]
    pub struct MockCollaborators {
        pub now: Timestamp,
        pub max_data: u64,
        pub max_streams_bidi: u64,
        pub max_streams_uni: u64,
        pub stream_states: BTreeMap<StreamId, StreamState>,
        pub stream_max_data: BTreeMap<StreamId, u64>,
        pub sent_probes: Vec<(EncryptionLevel, FrameKind, bool)>,
        pub requeued: Vec<(EncryptionLevel, FrameKind)>,
        pub stream_acks: Vec<(StreamId, FrameKind)>,
        pub pushes: u32,
        pub closed: Option<crate::transport::TransportError>,
        pub armed_timers: BTreeMap<EventId, u64>,
        pub path_mtu: Option<(u32, u32)>,
        pub acks_sent: Vec<(EncryptionLevel, AckRangesSnapshot)>,
        pub send_keys_available: bool,
    }

    impl MockCollaborators {
        pub fn new(now_ms: u64) -> Self {
            Self {
                now: Timestamp::from_millis(now_ms),
                max_streams_bidi: u64::MAX,
                max_streams_uni: u64::MAX,
                max_data: u64::MAX,
                send_keys_available: true,
                ..Default::default()
            }
        }

        pub fn advance_to(&mut self, now_ms: u64) {
            self.now = Timestamp::from_millis(now_ms);
        }
    }

    impl Collaborators for MockCollaborators {
        fn current_msec(&self) -> Timestamp {
            self.now
        }

        fn keys_available(&self, _level: EncryptionLevel, _is_send: bool) -> bool {
            self.send_keys_available
        }

        fn find_stream(&self, stream_id: StreamId) -> StreamState {
            self.stream_states
                .get(&stream_id)
                .copied()
                .unwrap_or(StreamState::Open)
        }

        fn handle_stream_ack(&mut self, stream_id: StreamId, frame: FrameKind) {
            self.stream_acks.push((stream_id, frame));
        }

        fn current_max_data(&self) -> u64 {
            self.max_data
        }

        fn current_max_streams(&self, direction: StreamDirection) -> u64 {
            match direction {
                StreamDirection::Bidirectional => self.max_streams_bidi,
                StreamDirection::Unidirectional => self.max_streams_uni,
            }
        }

        fn current_max_stream_data(&self, stream_id: StreamId) -> u64 {
            self.stream_max_data.get(&stream_id).copied().unwrap_or(0)
        }

        fn handle_path_mtu(&mut self, min: u32, max: u32) {
            self.path_mtu = Some((min, max));
        }

        fn queue_frame(&mut self, level: EncryptionLevel, kind: FrameKind) {
            self.requeued.push((level, kind));
        }

        fn emit_ack(&mut self, level: EncryptionLevel, snapshot: AckRangesSnapshot) {
            self.acks_sent.push((level, snapshot));
        }

        fn frame_sendto(
            &mut self,
            level: EncryptionLevel,
            kind: FrameKind,
            ignore_congestion: bool,
        ) -> bool {
            self.sent_probes.push((level, kind, ignore_congestion));
            true
        }

        fn post_push(&mut self) {
            self.pushes += 1;
        }

        fn add_timer(&mut self, event: EventId, ms: u64) {
            self.armed_timers.insert(event, ms);
        }

        fn del_timer(&mut self, event: EventId) {
            self.armed_timers.remove(&event);
        }

        fn close_connection(&mut self, err: crate::transport::TransportError) {
            self.closed = Some(err);
        }
    }
}
