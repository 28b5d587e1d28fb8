// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Envelope type dispatch.
//!
//! The handler table is process-wide: written during initialization, read on
//! every delivered message. Registration while receivers are running is
//! undefined behavior at the protocol level (a handler may or may not see
//! in-flight messages); the internal lock only keeps it memory-safe.
//!
//! Handler errors are logged and discarded; a handler can itself originate
//! new multicast sends (the `hostinfoSend` built-in does).

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::value::RawValue;

use crate::error::Result;
use crate::protocol::Envelope;

/// Handler invoked with the raw payload of a matching envelope and the
/// multicast group address the message arrived on.
pub type Handler = Box<dyn Fn(&RawValue, &str) -> Result<()> + Send + Sync>;

static HANDLERS: OnceLock<RwLock<HashMap<String, Handler>>> = OnceLock::new();

fn table() -> &'static RwLock<HashMap<String, Handler>> {
    HANDLERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Install a handler for an envelope type.
///
/// Must complete before `run_receivers`; keys are unique, so a second
/// registration for the same type replaces the first with a log record.
pub fn register_handler<F>(msg_type: &str, handler: F)
where
    F: Fn(&RawValue, &str) -> Result<()> + Send + Sync + 'static,
{
    let mut handlers = recover_write(table(), "handler table");
    if handlers
        .insert(msg_type.to_owned(), Box::new(handler))
        .is_some()
    {
        log::warn!("[dispatch] handler for type '{}' replaced", msg_type);
    }
}

/// Number of registered envelope types.
#[must_use]
pub fn handler_count() -> usize {
    recover_read(table(), "handler table").len()
}

/// Decode a reassembled message and invoke the matching handler.
///
/// Called by the receiver threads. Undecodable envelopes, unknown types and
/// handler errors are logged; none of them propagate.
pub fn dispatch(message: &[u8], group_addr: &str) {
    let envelope: Envelope = match serde_json::from_slice(message) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("[dispatch] invalid message envelope: {}", e);
            return;
        }
    };

    let handlers = recover_read(table(), "handler table");
    match handlers.get(&envelope.msg_type) {
        None => log::warn!("[dispatch] no handler for type '{}'", envelope.msg_type),
        Some(handler) => {
            if let Err(e) = handler(&envelope.payload, group_addr) {
                log::warn!(
                    "[dispatch] handler for '{}' failed: {}",
                    envelope.msg_type,
                    e
                );
            }
        }
    }
}

fn recover_read<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[dispatch] {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

fn recover_write<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[dispatch] {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}
