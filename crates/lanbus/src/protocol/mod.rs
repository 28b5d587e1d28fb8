// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol: fragment and envelope records plus the fragmenter.
//!
//! One `Fragment` record travels per UDP datagram. The reassembled bytes of
//! a logical message form an `Envelope` whose `payload` stays opaque until
//! the matching handler re-parses it.

mod fragment;
mod wire;

pub use fragment::{fragment_message, message_id};
pub use wire::{Envelope, Fragment};
