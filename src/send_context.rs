// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-encryption-level queue of in-flight frames (section 4.A).
//!
//! Opaque to callers beyond a handful of operations: enqueue for
//! transmission, record-on-wire, lookup-by-pnum-range (used by the ACK
//! receiver), and drop-all (on key discard). The reference codebase's
//! natural implementation is an intrusive doubly-linked list; this crate
//! uses a `VecDeque`, which gives O(1) pop from the front for the common
//! in-order-ack case and O(k) removal for out-of-order acks, satisfying the
//! same "ordered iteration plus O(k) prefix/subset removal" contract without
//! an actual intrusive list (design note, section 9).

use crate::{ack::ranges::AckRangeDb, frame::FrameKind, packet_number::PacketNumber, time::Timestamp};
use alloc::collections::VecDeque;

/// An in-flight frame record (section 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentFrame {
    /// Packet number of the containing packet.
    pub pnum: PacketNumber,
    /// Millisecond timestamp of original transmission.
    pub send_time: Timestamp,
    /// Bytes counted toward the congestion window; 0 for non-congestion
    /// controlled frames (pure ACK-only), and set to 0 when the frame is
    /// declared lost to prevent double-accounting.
    pub plen: u32,
    pub kind: FrameKind,
    /// True for PING probes emitted by PTO: excluded from congestion
    /// accounting regardless of `plen`.
    pub ignore_congestion: bool,
}

impl SentFrame {
    /// Whether this frame counts toward the congestion window.
    #[inline]
    pub fn is_congestion_controlled(&self) -> bool {
        self.plen > 0 && !self.ignore_congestion
    }
}

/// The per-level in-flight queue, next-packet-number counter, and
/// highest-acknowledged marker.
///
/// Invariant I1: `sent` is ordered by `pnum` ascending, and all entries have
/// `pnum < self.pnum`; an identical pnum appears contiguously (all frames of
/// one packet share a pnum).
#[derive(Debug)]
pub struct SendContext {
    /// In flight, awaiting ack or loss; ordered by `pnum` ascending.
    pub sent: VecDeque<SentFrame>,
    /// Queued for next transmission (loss-recovered and new).
    pub frames: VecDeque<FrameKind>,
    /// Next packet number to assign.
    pnum: PacketNumber,
    /// Largest packet number acknowledged so far.
    pub largest_ack: Option<PacketNumber>,
    /// Receiver-side ACK range database used to build outgoing ACK frames.
    pub ack_db: AckRangeDb,
}

impl Default for SendContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SendContext {
    pub fn new() -> Self {
        Self {
            sent: VecDeque::new(),
            frames: VecDeque::new(),
            pnum: PacketNumber::ZERO,
            largest_ack: None,
            ack_db: AckRangeDb::new(),
        }
    }

    /// Queues `kind` for the next transmission opportunity.
    #[inline]
    pub fn enqueue(&mut self, kind: FrameKind) {
        self.frames.push_back(kind);
    }

    /// The next packet number that will be assigned by `record_sent`.
    #[inline]
    pub fn next_pnum(&self) -> PacketNumber {
        self.pnum
    }

    /// Records a frame as sent on the wire: assigns `send_time`, appends to
    /// `sent`, and returns the frame's packet number.
    pub fn record_sent(
        &mut self,
        kind: FrameKind,
        plen: u32,
        now: Timestamp,
        ignore_congestion: bool,
    ) -> PacketNumber {
        let pnum = self.pnum;
        self.sent.push_back(SentFrame {
            pnum,
            send_time: now,
            plen,
            kind,
            ignore_congestion,
        });
        self.pnum = self.pnum.next();
        pnum
    }

    /// Removes and returns every in-flight frame with `min <= pnum <= max`,
    /// preserving send order. Used by the ACK receiver's `range_ack` (section
    /// 4.B) and by loss detection's packet-threshold scan.
    pub fn remove_range(&mut self, min: PacketNumber, max: PacketNumber) -> alloc::vec::Vec<SentFrame> {
        let mut removed = alloc::vec::Vec::new();
        let mut i = 0;
        while i < self.sent.len() {
            let pnum = self.sent[i].pnum;
            if pnum >= min && pnum <= max {
                removed.push(self.sent.remove(i).expect("index in bounds"));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Drops all in-flight and queued frames (on key discard for this level).
    pub fn drop_all(&mut self) {
        self.sent.clear();
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    #[test]
    fn record_sent_assigns_increasing_pnums() {
        let mut ctx = SendContext::new();
        let now = Timestamp::from_millis(0);
        let pn0 = ctx.record_sent(FrameKind::Stream { stream_id: 1 }, 1200, now, false);
        let pn1 = ctx.record_sent(FrameKind::Stream { stream_id: 1 }, 1200, now, false);
        assert_eq!(pn0, PacketNumber::new(0));
        assert_eq!(pn1, PacketNumber::new(1));
        assert_eq!(ctx.sent.len(), 2);
    }

    #[test]
    fn remove_range_preserves_order_and_removes_only_matches() {
        let mut ctx = SendContext::new();
        let now = Timestamp::from_millis(0);
        for _ in 0..5 {
            ctx.record_sent(FrameKind::Stream { stream_id: 1 }, 1200, now, false);
        }
        let removed = ctx.remove_range(PacketNumber::new(1), PacketNumber::new(3));
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].pnum, PacketNumber::new(1));
        assert_eq!(removed[2].pnum, PacketNumber::new(3));
        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(ctx.sent[0].pnum, PacketNumber::new(0));
        assert_eq!(ctx.sent[1].pnum, PacketNumber::new(4));
    }
}
