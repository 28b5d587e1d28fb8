// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragmenter: splits a serialized message into wire-ready datagrams.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::FRAGMENT_OVERHEAD;
use crate::error::{Error, Result};
use crate::hostinfo::local_hostname;
use crate::protocol::Fragment;

/// Split `message` into fully serialized fragment datagrams.
///
/// Each datagram carries at most `mtu - FRAGMENT_OVERHEAD` payload bytes.
/// Slices are contiguous and non-overlapping, `seq` runs `1..=total`. An
/// empty message still produces one fragment with empty data so the receiver
/// observes the message at all.
///
/// # Errors
///
/// Returns `Error::InvalidMtu` when the MTU leaves no payload room and
/// `Error::Serialization` if a fragment record fails to encode.
pub fn fragment_message(msg_id: &str, message: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
    let max_payload = match mtu.checked_sub(FRAGMENT_OVERHEAD) {
        Some(n) if n > 0 => n,
        _ => return Err(Error::InvalidMtu(mtu)),
    };

    let total = message.len().div_ceil(max_payload).max(1);
    let mut datagrams = Vec::with_capacity(total);
    for seq in 1..=total {
        let start = (seq - 1) * max_payload;
        let end = (start + max_payload).min(message.len());
        let fragment = Fragment {
            id: msg_id.to_owned(),
            seq: seq as u32,
            total: total as u32,
            data: message[start..end].to_vec(),
        };
        datagrams.push(serde_json::to_vec(&fragment)?);
    }

    log::debug!(
        "[fragmenter] message {} split into {} fragment(s) ({} bytes, mtu {})",
        msg_id,
        total,
        message.len(),
        mtu
    );
    Ok(datagrams)
}

/// Generate a message ID.
///
/// One-shot envelope sends pass the envelope type so IDs read
/// `<type>-<hostname>-<nanos>`; other paths use `<hostname>-<nanos>`. The
/// shape is opaque to receivers; only uniqueness within the reassembly
/// window matters, which the nanosecond clock provides.
pub fn message_id(type_name: Option<&str>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    match type_name {
        Some(name) => format!("{}-{}-{}", name, local_hostname(), nanos),
        None => format!("{}-{}", local_hostname(), nanos),
    }
}
