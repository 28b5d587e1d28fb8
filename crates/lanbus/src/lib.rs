// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # LANBUS - LAN multicast discovery and message bus
//!
//! A peer-to-peer host-discovery and message-dissemination bus over IP
//! multicast UDP. Peers announce their identity (hostname, IPv4 addresses,
//! build metadata, service endpoint) and exchange arbitrary typed messages.
//! Logical messages larger than a datagram are fragmented on send and
//! reassembled within a bounded time window on receive, with per-interface
//! fan-out on both sides.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use lanbus::{CancelToken, Result};
//!
//! fn main() -> Result<()> {
//!     // Built-in handlers + local host record
//!     lanbus::init();
//!
//!     // One receiver per multicast-capable interface
//!     let receivers = lanbus::run_receivers("239.255.71.1:9999")?;
//!
//!     // Ask the group to re-announce, then read the table a bit later
//!     let cancel = CancelToken::new();
//!     lanbus::send_with_envelope(&cancel, "239.255.71.1:9999", 1500, "hostinfoSend", &())?;
//!     std::thread::sleep(Duration::from_secs(3));
//!     for (hostname, info) in lanbus::get_host_data() {
//!         println!("{} -> {:?}", hostname, info.ips);
//!     }
//!
//!     receivers.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |    register_handler() | send_with_envelope() | get_host_data()     |
//! +--------------------------------------------------------------------+
//! |                         Dispatch Layer                             |
//! |    Envelope {type, payload} -> handler table -> host registry      |
//! +--------------------------------------------------------------------+
//! |                        Fragment Layer                              |
//! |    Fragment {id, seq, total, data} | reassembly cache (15 s)       |
//! +--------------------------------------------------------------------+
//! |                        Transport Layer                             |
//! |    per-interface UDP multicast senders and receivers               |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Delivery model
//!
//! Best-effort only: no acknowledgements, no retransmission requests, no
//! ordering across logical messages. The one-shot sender repeats the full
//! fragment sequence (3 rounds by default) to counter multicast loss;
//! partial messages older than 15 seconds are dropped by the receiver.

/// Protocol constants and runtime pacing configuration.
pub mod config;
/// Envelope type dispatch and the process-wide handler table.
pub mod dispatch;
/// Crate-level error type.
pub mod error;
/// Host registry, `HostInfo` record, built-in handlers.
pub mod hostinfo;
/// Wire records (fragment, envelope) and the fragmenter.
pub mod protocol;
/// Per-interface multicast receivers with time-windowed reassembly.
pub mod receiver;
/// Interface enumeration and per-interface multicast senders.
pub mod transport;

pub use config::SenderPacing;
pub use dispatch::{register_handler, Handler};
pub use error::{Error, Result};
pub use hostinfo::{get_host_data, init, HostInfo};
pub use protocol::{Envelope, Fragment};
pub use receiver::{run_receivers, ReceiverSet, RxMetrics};
pub use transport::{run_fragmented_sender_cycle, send_with_envelope, CancelToken};

/// LANBUS version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
