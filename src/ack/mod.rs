// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! ACK frame handling: the receiver-side range database, the decoder/applier
//! for incoming ACK frames, and the decision of when to generate one.

pub mod generate;
pub mod ranges;
pub mod receiver;

pub use generate::{generate_ack, ACK_DELAY_EVENT, MAX_ACK_GAP};
pub use ranges::{AckRangeDb, AckRangesSnapshot, Range, MAX_RANGES};
pub use receiver::{AckFrame, AckOutcome};
