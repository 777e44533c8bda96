// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Loss detection, congestion control, RTT estimation, and the PTO/loss
//! timer: RFC 9002 adapted to an event-driven, single-threaded connection
//! loop (sections 4.C, 4.D, 4.E).

pub mod congestion_controller;
pub mod loss;
pub mod pto;
pub mod rtt_estimator;
pub mod timer;

pub use congestion_controller::{CongestionController, NewReno};
pub use loss::{detect_lost, LossEvent};
pub use rtt_estimator::RttEstimator;
pub use timer::{Mode as TimerMode, RecoveryTimer};
