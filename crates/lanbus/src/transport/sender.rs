// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-interface multicast senders.
//!
//! Every send fans out over all eligible interfaces: one short-lived thread
//! per interface, each owning a fresh UDP socket bound to an ephemeral port
//! with the multicast egress interface pinned to its interface. Fragments go
//! out in `seq` order; ordering across interfaces is not defined.
//!
//! Two modes:
//! - one-shot with redundancy: the full fragment sequence is repeated
//!   `SenderPacing::rounds` times (default 3) with 10 ms + 300 ms pacing per
//!   fragment
//! - periodic: the sequence is emitted once per period with 10 ms pacing
//!   until the cancellation token is set
//!
//! Errors inside sender threads are logged, never propagated; a failing
//! interface does not affect the others.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{SenderPacing, INTER_FRAGMENT_DELAY, SHUTDOWN_POLL};
use crate::error::{Error, Result};
use crate::protocol::{fragment_message, message_id, Envelope};
use crate::transport::ifaces::{multicast_interfaces, NetInterface};

/// Cooperative cancellation signal shared with sender threads.
///
/// Observed before a one-shot emission begins and between periodic rounds; a
/// round already in flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One-shot multi-interface send of a typed envelope.
///
/// The payload is wrapped as `{type, payload}`, serialized, fragmented for
/// `mtu`, and handed to one sender thread per eligible interface. The call
/// returns once the threads are spawned; emission itself (roughly
/// `rounds x 310 ms x fragments`) continues in the background.
///
/// # Errors
///
/// Setup failures only: serialization, MTU too small, unresolvable group
/// address, interface enumeration, thread spawn.
pub fn send_with_envelope<T: Serialize + ?Sized>(
    cancel: &CancelToken,
    group_addr: &str,
    mtu: usize,
    msg_type: &str,
    payload: &T,
) -> Result<()> {
    let envelope = Envelope::new(msg_type, payload)?;
    let message = serde_json::to_vec(&envelope)?;
    let msg_id = message_id(Some(msg_type));
    let datagrams = Arc::new(fragment_message(&msg_id, &message, mtu)?);
    let dest = resolve_group(group_addr)?;
    let pacing = SenderPacing::from_env();

    for iface in eligible_interfaces()? {
        log::info!(
            "[sender] sending fragmented message via interface {}",
            iface.name
        );
        let cancel = cancel.clone();
        let datagrams = Arc::clone(&datagrams);
        thread::Builder::new()
            .name(format!("lanbus-tx-{}", iface.name))
            .spawn(move || oneshot_loop(&cancel, &iface, dest, &datagrams, pacing))?;
    }
    Ok(())
}

/// Periodic multi-interface send of a raw serializable payload.
///
/// The payload is serialized once and re-emitted every `period` on every
/// eligible interface until `cancel` is set. Unlike the one-shot path the
/// payload is not wrapped in an envelope; callers that want dispatch on the
/// receiving side pass an envelope-shaped value.
///
/// # Errors
///
/// Setup failures only, as for [`send_with_envelope`].
pub fn run_fragmented_sender_cycle<T: Serialize + ?Sized>(
    cancel: &CancelToken,
    group_addr: &str,
    mtu: usize,
    payload: &T,
    period: Duration,
) -> Result<()> {
    let message = serde_json::to_vec(payload)?;
    let msg_id = message_id(None);
    let datagrams = Arc::new(fragment_message(&msg_id, &message, mtu)?);
    let dest = resolve_group(group_addr)?;

    for iface in eligible_interfaces()? {
        log::info!(
            "[sender] starting periodic sender via interface {} (period {:?})",
            iface.name,
            period
        );
        let cancel = cancel.clone();
        let datagrams = Arc::clone(&datagrams);
        thread::Builder::new()
            .name(format!("lanbus-tx-{}", iface.name))
            .spawn(move || cycle_loop(&cancel, &iface, dest, &datagrams, period))?;
    }
    Ok(())
}

/// Resolve `host:port` to an IPv4 destination.
pub(crate) fn resolve_group(group_addr: &str) -> Result<SocketAddr> {
    let mut addrs = group_addr
        .to_socket_addrs()
        .map_err(|_| Error::AddrResolve(group_addr.to_owned()))?;
    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::AddrResolve(group_addr.to_owned()))
}

fn eligible_interfaces() -> Result<Vec<NetInterface>> {
    multicast_interfaces().map_err(Error::Interfaces)
}

/// Fresh sender socket with multicast egress pinned to `iface`.
fn egress_socket(iface: &NetInterface) -> std::io::Result<UdpSocket> {
    let iface_ip = iface.primary_ipv4().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "interface has no IPv4 address",
        )
    })?;
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind_addr.into())?;
    socket.set_multicast_if_v4(&iface_ip)?;
    // Loop datagrams back for intra-machine peers; keep the default
    // link-scope hop limit.
    socket.set_multicast_loop_v4(true)?;
    let _ = socket.set_multicast_ttl_v4(1);
    Ok(socket.into())
}

/// Emit all fragments `pacing.rounds` times, then exit.
fn oneshot_loop(
    cancel: &CancelToken,
    iface: &NetInterface,
    dest: SocketAddr,
    datagrams: &[Vec<u8>],
    pacing: SenderPacing,
) {
    let socket = match egress_socket(iface) {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("[sender] {}: failed to create UDP socket: {}", iface.name, e);
            return;
        }
    };

    if cancel.is_cancelled() {
        log::debug!("[sender] {}: sender canceled", iface.name);
        return;
    }

    for round in 1..=pacing.rounds {
        for datagram in datagrams {
            match socket.send_to(datagram, dest) {
                Ok(_) => log::debug!(
                    "[sender] {}: sent fragment ({} bytes, round {}/{})",
                    iface.name,
                    datagram.len(),
                    round,
                    pacing.rounds
                ),
                Err(e) => log::warn!("[sender] {}: send fragment failed: {}", iface.name, e),
            }
            thread::sleep(pacing.inter_fragment_delay);
            thread::sleep(pacing.inter_round_delay);
        }
    }
}

/// Emit all fragments once per period until canceled.
fn cycle_loop(
    cancel: &CancelToken,
    iface: &NetInterface,
    dest: SocketAddr,
    datagrams: &[Vec<u8>],
    period: Duration,
) {
    let socket = match egress_socket(iface) {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("[sender] {}: failed to create UDP socket: {}", iface.name, e);
            return;
        }
    };

    loop {
        // Sleep the period in short slices so cancellation latency stays
        // bounded by SHUTDOWN_POLL, not the period.
        let deadline = Instant::now() + period;
        loop {
            if cancel.is_cancelled() {
                log::debug!("[sender] {}: sender stopped", iface.name);
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }

        for datagram in datagrams {
            match socket.send_to(datagram, dest) {
                Ok(_) => log::debug!(
                    "[sender] {}: sent fragment ({} bytes)",
                    iface.name,
                    datagram.len()
                ),
                Err(e) => log::warn!("[sender] {}: send fragment failed: {}", iface.name, e),
            }
            thread::sleep(INTER_FRAGMENT_DELAY);
        }
    }
}
