// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global protocol constants and runtime pacing configuration.
//!
//! This module is the single source of truth for every wire and timing
//! constant in the bus. **NEVER hardcode these elsewhere!**
//!
//! Timing values mirror the deployed protocol: peers on the wire expect
//! fragments paced and expired with these windows, so changing them on one
//! host only degrades loss recovery, it does not break interop.

use std::time::Duration;

/// Bytes reserved per datagram for the fragment framing (JSON keys, message
/// ID, base64 expansion headroom). Empirical; sufficient for any MTU >= 512.
pub const FRAGMENT_OVERHEAD: usize = 100;

/// MTU used for bus-originated announcements (`hostinfo` fan-out).
pub const HOSTINFO_MTU: usize = 1500;

/// Requested OS receive buffer size (SO_RCVBUF). Failure to apply is
/// non-fatal.
pub const READ_BUFFER_BYTES: usize = 2048;

/// Stack buffer size for a single received datagram.
pub const RECV_DATAGRAM_BYTES: usize = 2048;

/// Read deadline per receive call. Bounds shutdown latency; a timeout is not
/// an error, the receive loop just re-arms.
pub const READ_DEADLINE: Duration = Duration::from_millis(100);

/// Age after which a partially reassembled message is dropped.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between reassembly-cache eviction sweeps.
pub const EXPIRY_TICK: Duration = Duration::from_secs(5);

/// Granularity at which long sleeps re-check the shutdown flag.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Default number of passes over the fragment list in one-shot mode.
pub const DEFAULT_SEND_ROUNDS: u32 = 3;

/// Pause after each datagram write, all send modes.
pub const INTER_FRAGMENT_DELAY: Duration = Duration::from_millis(10);

/// Additional per-fragment pause in one-shot mode.
pub const INTER_ROUND_DELAY: Duration = Duration::from_millis(300);

/// Default emission period for the periodic sender.
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_secs(2);

/// Env var overriding the one-shot redundancy round count.
pub const ENV_SEND_ROUNDS: &str = "LANBUS_SEND_ROUNDS";

/// Pacing parameters for the one-shot sender.
///
/// Multicast is lossy; repeating the full fragment sequence materially
/// reduces end-to-end loss without introducing a reliable transport. The
/// defaults (3 rounds, 10 ms + 300 ms per fragment) cost about one second of
/// airtime per small message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderPacing {
    /// Number of passes over the full fragment sequence (minimum 1).
    pub rounds: u32,
    /// Pause after each datagram write.
    pub inter_fragment_delay: Duration,
    /// Additional pause per fragment in one-shot mode.
    pub inter_round_delay: Duration,
}

impl Default for SenderPacing {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_SEND_ROUNDS,
            inter_fragment_delay: INTER_FRAGMENT_DELAY,
            inter_round_delay: INTER_ROUND_DELAY,
        }
    }
}

impl SenderPacing {
    /// Pacing from environment, falling back to defaults.
    ///
    /// `LANBUS_SEND_ROUNDS=<n>` overrides the redundancy round count
    /// (clamped to at least 1). Invalid values are ignored with a log record.
    pub fn from_env() -> Self {
        let mut pacing = Self::default();
        if let Ok(raw) = std::env::var(ENV_SEND_ROUNDS) {
            match raw.parse::<u32>() {
                Ok(rounds) if rounds >= 1 => {
                    log::debug!("[config] {}={} override", ENV_SEND_ROUNDS, rounds);
                    pacing.rounds = rounds;
                }
                _ => {
                    log::warn!(
                        "[config] ignoring invalid {}='{}' - falling back to {}",
                        ENV_SEND_ROUNDS,
                        raw,
                        pacing.rounds
                    );
                }
            }
        }
        pacing
    }
}
