// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod operation;
pub mod stats;
pub mod subscriber;

pub use operation::{Operation, SubscribeIntent, Transition, UnsubscribeIntent};
pub use stats::SubscriberStats;
pub use subscriber::{Subscriber, SubscriberEmail, SubscriberStatus, SubscriberView};
