// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The receiver-side ACK range database (section 4.E): a fixed-capacity set
//! of disjoint acknowledged packet-number blocks used to build outgoing ACK
//! frames, plus the bookkeeping (`pending_ack`, `send_ack`, `ack_delay_start`)
//! that decides when to emit one.
//!
//! The wider codebase keeps this as a dynamically growing `IntervalSet`
//! (`interval_set::IntervalSet`, backed by a `Vec`). The recovery spec calls
//! instead for a fixed small bound (`MAX_RANGES`) whose overflow forces an
//! immediate emission rather than a reallocation (section 5, resource
//! discipline), so this type caps the number of tracked ranges explicitly
//! and never grows past it.

use crate::time::Timestamp;
use alloc::vec::Vec;

/// Maximum number of acknowledged blocks, beyond the single primary
/// (`largest_range`/`first_range`) block, this database retains.
/// Exceeding it forces an immediate ACK emission (section 4.E).
pub const MAX_RANGES: usize = 64;

/// A single `(gap, range)` pair as carried on the wire (RFC 9000 section 19.3):
/// `gap` is the number of unacknowledged packet numbers between this block
/// and the one above it, minus two; `range` is one less than this block's
/// length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Range {
    pub gap: u64,
    pub range: u64,
}

/// What would be sent on the wire for the current (or a forced, overflow-driven)
/// state of the range database. Wire encoding itself is out of scope; this is
/// the decoded shape the surrounding packet writer would serialize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckRangesSnapshot {
    pub largest: u64,
    pub first_range: u64,
    pub ranges: Vec<Range>,
}

impl AckRangesSnapshot {
    fn one_off(pn: u64) -> Self {
        Self {
            largest: pn,
            first_range: 0,
            ranges: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct AckRangeDb {
    largest_range: Option<u64>,
    largest_received: Timestamp,
    first_range: u64,
    ranges: Vec<Range>,
    /// Largest PN pending an ACK emission.
    pub pending_ack: Option<u64>,
    /// Outstanding-ACK counter.
    pub send_ack: u32,
    pub ack_delay_start: Option<Timestamp>,
}

impl Default for AckRangeDb {
    fn default() -> Self {
        Self::new()
    }
}

impl AckRangeDb {
    pub fn new() -> Self {
        Self {
            largest_range: None,
            largest_received: Timestamp::default(),
            first_range: 0,
            ranges: Vec::new(),
            pending_ack: None,
            send_ack: 0,
            ack_delay_start: None,
        }
    }

    #[inline]
    pub fn largest_range(&self) -> Option<u64> {
        self.largest_range
    }

    #[inline]
    pub fn first_range(&self) -> u64 {
        self.first_range
    }

    #[inline]
    pub fn nranges(&self) -> usize {
        self.ranges.len()
    }

    /// A consistent snapshot of the current database, for ACK emission.
    pub fn snapshot(&self) -> Option<AckRangesSnapshot> {
        self.largest_range.map(|largest| AckRangesSnapshot {
            largest,
            first_range: self.first_range,
            ranges: self.ranges.clone(),
        })
    }

    /// Returns `true` if `pn` is within the set of acknowledged packet
    /// numbers tracked by this database (property P1).
    pub fn contains(&self, pn: u64) -> bool {
        self.decode_blocks()
            .iter()
            .any(|&(top, bottom)| bottom <= pn && pn <= top)
    }

    fn decode_blocks(&self) -> Vec<(u64, u64)> {
        let mut blocks = Vec::with_capacity(self.ranges.len() + 1);
        let Some(largest) = self.largest_range else {
            return blocks;
        };
        blocks.push((largest, largest - self.first_range));
        for r in &self.ranges {
            let prev_bottom = blocks.last().unwrap().1;
            let top = prev_bottom - r.gap - 2;
            let bottom = top - r.range;
            blocks.push((top, bottom));
        }
        blocks
    }

    fn encode_blocks(&mut self, blocks: &[(u64, u64)]) {
        debug_assert!(!blocks.is_empty());
        let (largest, bottom0) = blocks[0];
        self.largest_range = Some(largest);
        self.first_range = largest - bottom0;
        self.ranges.clear();
        for w in blocks.windows(2) {
            let prev_bottom = w[0].1;
            let (top, bottom) = w[1];
            self.ranges.push(Range {
                gap: prev_bottom - top - 2,
                range: top - bottom,
            });
        }
    }

    fn force_send_ack(&mut self, max_ack_gap: u32) {
        self.send_ack = max_ack_gap;
    }

    /// Forces an immediate re-ACK, as required when a pure-ACK frame is
    /// resent after being declared lost (section 4.C).
    #[inline]
    pub fn force_flush(&mut self, max_ack_gap: u32) {
        self.force_send_ack(max_ack_gap);
    }

    /// Updates the database with a newly received packet number (section 4.E).
    ///
    /// `max_ack_gap` is the `MAX_ACK_GAP` constant (observable tunable,
    /// passed in rather than hard-coded so tests can exercise the forcing
    /// behavior directly). Returns `Some(snapshot)` when capacity overflow
    /// forces an immediate out-of-band ACK emission.
    pub fn on_packet_received(
        &mut self,
        pn: u64,
        need_ack: bool,
        now: Timestamp,
        max_ack_gap: u32,
    ) -> Option<AckRangesSnapshot> {
        if need_ack {
            if self.send_ack == 0 {
                self.ack_delay_start = Some(now);
            }
            self.send_ack += 1;
            self.pending_ack = Some(self.pending_ack.map_or(pn, |p| p.max(pn)));
        }

        let Some(largest) = self.largest_range else {
            self.largest_range = Some(pn);
            self.first_range = 0;
            self.largest_received = now;
            return None;
        };

        if pn == largest {
            return None;
        }

        let mut blocks = self.decode_blocks();
        let before_len = blocks.len();
        let (forced, tail) = insert_point(&mut blocks, pn);

        if !forced {
            self.encode_blocks(&blocks);
            return None;
        }

        // A new disjoint block was created: this is an out-of-order arrival
        // (or the first gap-creating extension), which always forces a
        // prompt re-ACK regardless of capacity.
        if before_len > MAX_RANGES {
            if tail {
                // Older than every tracked range and the table is already
                // full: acknowledge this one PN standalone and leave the
                // main database untouched.
                return Some(AckRangesSnapshot::one_off(pn));
            }
            // Capacity would be exceeded: emit the current (pre-insertion)
            // state now, drop the oldest (lowest) block to make room, then
            // commit the insertion.
            let emit = self.snapshot();
            blocks.pop();
            self.encode_blocks(&blocks);
            self.force_send_ack(max_ack_gap);
            return emit;
        }

        self.encode_blocks(&blocks);
        self.force_send_ack(max_ack_gap);
        None
    }

    /// Truncates tracked ranges below `upto_pn`: called when the peer's ACK
    /// of our own ACK frame implies we need not re-ACK anything at or below
    /// that point.
    pub fn drop_ack_ranges(&mut self, upto_pn: u64) {
        let blocks = self.decode_blocks();
        let mut kept = Vec::with_capacity(blocks.len());
        for (top, bottom) in blocks {
            if top <= upto_pn {
                continue;
            }
            kept.push((top, bottom.max(upto_pn + 1)));
        }
        if kept.is_empty() {
            if let Some(largest) = self.largest_range {
                kept.push((largest, largest));
            } else {
                return;
            }
        }
        self.encode_blocks(&kept);
        if let Some(pending) = self.pending_ack {
            if pending <= upto_pn {
                self.pending_ack = None;
            }
        }
    }
}

/// Inserts `pn` into a descending, disjoint list of closed `(top, bottom)`
/// blocks, merging or extending neighboring blocks where `pn` touches them.
/// Returns `(forced, tail)`: `forced` is true iff a brand new disjoint block
/// had to be created (rather than an existing block merged/extended, or `pn`
/// already covered); `tail` is true iff that new block is the lowest-valued
/// block in the list (the "older than everything tracked" case).
fn insert_point(blocks: &mut Vec<(u64, u64)>, pn: u64) -> (bool, bool) {
    let idx = blocks
        .iter()
        .position(|&(top, _)| top < pn)
        .unwrap_or(blocks.len());

    if idx > 0 {
        let (top, bottom) = blocks[idx - 1];
        if pn <= top && pn >= bottom {
            return (false, false);
        }
    }

    let touches_above = idx > 0 && blocks[idx - 1].1 == pn + 1;
    let touches_below = idx < blocks.len() && pn > 0 && blocks[idx].0 == pn - 1;

    if touches_above && touches_below {
        let new_top = blocks[idx - 1].0;
        let new_bottom = blocks[idx].1;
        blocks[idx - 1] = (new_top, new_bottom);
        blocks.remove(idx);
        (false, false)
    } else if touches_above {
        blocks[idx - 1].1 = pn;
        (false, false)
    } else if touches_below {
        blocks[idx].0 = pn;
        (false, false)
    } else {
        blocks.insert(idx, (pn, pn));
        let tail = idx == blocks.len() - 1;
        (true, tail)
    }
}
