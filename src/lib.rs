// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! QUIC loss recovery and congestion control core.
//!
//! Implements RFC 9002 loss detection and congestion control, and the
//! RFC 9000 section 13 / 19.3 ACK frame semantics, for an event-driven
//! server. Packet encryption, framing, UDP I/O, the TLS handshake, and
//! stream-level flow control are out of scope: this crate consumes an
//! already-decoded ACK and drives a set of small collaborator traits
//! (see [`collaborators`]) rather than owning sockets or streams itself.

extern crate alloc;

pub mod ack;
pub mod collaborators;
pub mod connection;
pub mod frame;
pub mod packet_number;
pub mod recovery;
pub mod send_context;
pub mod time;
pub mod transport;
