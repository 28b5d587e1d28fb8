// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast I/O fabric: interface enumeration and per-interface senders.

pub mod ifaces;
pub mod sender;

pub use ifaces::{local_ipv4_addresses, multicast_interfaces, NetInterface};
pub use sender::{run_fragmented_sender_cycle, send_with_envelope, CancelToken};
