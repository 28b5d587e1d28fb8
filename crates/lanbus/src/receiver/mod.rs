// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-interface multicast receivers.
//!
//! `run_receivers` joins the group on every eligible interface and spawns
//! one receive thread plus one reassembly-expiry thread per interface. Each
//! receive thread owns its socket and its reassembly cache; the expiry
//! thread shares only the cache mutex.
//!
//! The receive loop re-arms a 100 ms read deadline so shutdown latency stays
//! bounded; a deadline expiry is not an error. Malformed fragments are
//! dropped with a log record, completed messages go to handler dispatch.
//!
//! # Architecture
//!
//! ```text
//! recv_from() -> Fragment decode -> ReassemblyCache::insert()
//!                                        v (complete)
//!                            Envelope decode -> handler dispatch
//! ```

pub mod reassembly;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{
    EXPIRY_TICK, READ_BUFFER_BYTES, READ_DEADLINE, REASSEMBLY_TIMEOUT, RECV_DATAGRAM_BYTES,
    SHUTDOWN_POLL,
};
use crate::dispatch;
use crate::error::{Error, Result};
use crate::protocol::Fragment;
use crate::transport::ifaces::{multicast_interfaces, NetInterface};
use crate::transport::sender::resolve_group;

use reassembly::ReassemblyCache;

/// Receive-side counters shared by all receiver threads of one
/// [`ReceiverSet`].
#[derive(Debug, Default)]
pub struct RxMetrics {
    /// Datagrams read off the sockets.
    pub datagrams_received: AtomicU64,
    /// Total bytes read.
    pub bytes_received: AtomicU64,
    /// Datagrams that failed fragment decode or validation.
    pub invalid_fragments: AtomicU64,
    /// Messages reassembled and handed to dispatch.
    pub messages_delivered: AtomicU64,
    /// Partial messages dropped by the expiry thread.
    pub messages_expired: AtomicU64,
}

impl RxMetrics {
    /// Snapshot of (received, bytes, invalid, delivered, expired).
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.datagrams_received.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.invalid_fragments.load(Ordering::Relaxed),
            self.messages_delivered.load(Ordering::Relaxed),
            self.messages_expired.load(Ordering::Relaxed),
        )
    }
}

/// Handle over the spawned receiver threads.
///
/// Dropping the set (or calling [`ReceiverSet::shutdown`]) signals every
/// thread to stop and joins them; the read deadline bounds how long a thread
/// can take to notice.
pub struct ReceiverSet {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Aggregated receive counters, for diagnostics.
    pub metrics: Arc<RxMetrics>,
    interface_count: usize,
}

impl ReceiverSet {
    /// Number of interfaces receivers were started on.
    #[must_use]
    pub fn interface_count(&self) -> usize {
        self.interface_count
    }

    /// Signal all receiver threads to stop and wait for them.
    pub fn shutdown(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiverSet {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Join the multicast group on every eligible interface and start receiving.
///
/// # Errors
///
/// Fails synchronously when no handlers are registered, the group address
/// does not resolve to an IPv4 multicast endpoint, or interfaces cannot be
/// enumerated. Per-interface socket failures after that point terminate only
/// the affected thread, with a log record.
pub fn run_receivers(group_addr: &str) -> Result<ReceiverSet> {
    if dispatch::handler_count() == 0 {
        return Err(Error::EmptyHandlerTable);
    }

    let resolved = resolve_group(group_addr)?;
    let group = match resolved {
        SocketAddr::V4(v4) if v4.ip().is_multicast() => v4,
        other => return Err(Error::NotMulticast(other)),
    };

    let interfaces = multicast_interfaces().map_err(Error::Interfaces)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let metrics = Arc::new(RxMetrics::default());
    let interface_count = interfaces.len();
    let mut handles = Vec::with_capacity(interface_count * 2);

    for iface in interfaces {
        log::info!(
            "[receiver] starting receiver on interface {} [{}]",
            iface.name,
            iface.hw_addr.as_deref().unwrap_or("-")
        );

        let cache = Arc::new(Mutex::new(ReassemblyCache::new()));

        handles.push(
            thread::Builder::new()
                .name(format!("lanbus-expiry-{}", iface.name))
                .spawn({
                    let iface_name = iface.name.clone();
                    let cache = Arc::clone(&cache);
                    let shutdown = Arc::clone(&shutdown);
                    let metrics = Arc::clone(&metrics);
                    move || expiry_loop(&iface_name, &cache, &shutdown, &metrics)
                })?,
        );

        handles.push(
            thread::Builder::new()
                .name(format!("lanbus-rx-{}", iface.name))
                .spawn({
                    let group_addr = group_addr.to_owned();
                    let shutdown = Arc::clone(&shutdown);
                    let metrics = Arc::clone(&metrics);
                    move || receive_loop(&iface, group, &group_addr, &cache, &shutdown, &metrics)
                })?,
        );
    }

    Ok(ReceiverSet {
        handles,
        shutdown,
        metrics,
        interface_count,
    })
}

/// Group-membership socket for one interface.
///
/// All per-interface sockets share the group port via SO_REUSEADDR. The
/// requested 2048-byte OS read buffer is advisory; failure to apply it is
/// logged and ignored.
fn join_group_socket(iface: &NetInterface, group: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let iface_ip = iface.primary_ipv4().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "interface has no IPv4 address",
        )
    })?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(READ_BUFFER_BYTES) {
        log::warn!(
            "[receiver] {}: failed to set read buffer: {}",
            iface.name,
            e
        );
    }
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, group.port()).into();
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(group.ip(), &iface_ip)?;
    socket.set_read_timeout(Some(READ_DEADLINE))?;
    Ok(socket)
}

/// Main receive loop for one interface. Runs until shutdown or a fatal read
/// error.
fn receive_loop(
    iface: &NetInterface,
    group: SocketAddrV4,
    group_addr: &str,
    cache: &Mutex<ReassemblyCache>,
    shutdown: &AtomicBool,
    metrics: &RxMetrics,
) {
    let socket = match join_group_socket(iface, group) {
        Ok(socket) => socket,
        Err(e) => {
            log::error!(
                "[receiver] {}: failed to join multicast group {}: {}",
                iface.name,
                group,
                e
            );
            return;
        }
    };

    let mut buf = [0u8; RECV_DATAGRAM_BYTES];
    while !shutdown.load(Ordering::Relaxed) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _src)) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Read deadline expired; re-arm and re-check shutdown.
                continue;
            }
            Err(e) => {
                log::error!("[receiver] {}: UDP read failed: {}", iface.name, e);
                return;
            }
        };

        metrics.datagrams_received.fetch_add(1, Ordering::Relaxed);
        metrics
            .bytes_received
            .fetch_add(len as u64, Ordering::Relaxed);

        let fragment: Fragment = match serde_json::from_slice(&buf[..len]) {
            Ok(fragment) => fragment,
            Err(e) => {
                metrics.invalid_fragments.fetch_add(1, Ordering::Relaxed);
                log::warn!("[receiver] {}: invalid fragment record: {}", iface.name, e);
                continue;
            }
        };
        if let Err(e) = fragment.validate() {
            metrics.invalid_fragments.fetch_add(1, Ordering::Relaxed);
            log::warn!("[receiver] {}: rejected fragment: {}", iface.name, e);
            continue;
        }

        let complete = recover_lock(cache, "reassembly cache").insert(fragment);
        if let Some(message) = complete {
            metrics.messages_delivered.fetch_add(1, Ordering::Relaxed);
            dispatch::dispatch(&message, group_addr);
        }
    }
}

/// Eviction loop companion to one receive thread.
fn expiry_loop(
    iface_name: &str,
    cache: &Mutex<ReassemblyCache>,
    shutdown: &AtomicBool,
    metrics: &RxMetrics,
) {
    while !shutdown.load(Ordering::Relaxed) {
        // Sleep the tick in short slices so shutdown stays responsive.
        let deadline = Instant::now() + EXPIRY_TICK;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }

        let evicted = recover_lock(cache, "reassembly cache").evict_expired(REASSEMBLY_TIMEOUT);
        if evicted > 0 {
            metrics
                .messages_expired
                .fetch_add(evicted as u64, Ordering::Relaxed);
            log::debug!(
                "[receiver] {}: evicted {} expired partial message(s)",
                iface_name,
                evicted
            );
        }
    }
}

/// Lock the cache, recovering from a poisoned mutex.
fn recover_lock<'a>(
    cache: &'a Mutex<ReassemblyCache>,
    context: &str,
) -> MutexGuard<'a, ReassemblyCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[receiver] {} mutex poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}
