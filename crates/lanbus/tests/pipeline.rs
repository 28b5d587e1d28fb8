// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send-path to receive-path pipeline tests, no sockets involved.
//!
//! Drives the fragmenter's wire output through the reassembly cache and the
//! dispatcher exactly as a receiver thread would, so the full datagram
//! lifecycle is exercised deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lanbus::protocol::{fragment_message, message_id};
use lanbus::receiver::reassembly::ReassemblyCache;
use lanbus::{dispatch, Envelope, Fragment};

fn decode_datagrams(datagrams: &[Vec<u8>]) -> Vec<Fragment> {
    datagrams
        .iter()
        .map(|d| serde_json::from_slice::<Fragment>(d).expect("datagram should decode"))
        .inspect(|f| f.validate().expect("sender output should validate"))
        .collect()
}

#[test]
fn fragmented_envelope_survives_reordering_and_duplicates() {
    let payload = "x".repeat(300);
    let envelope = Envelope::new("pipeline-echo", &payload).expect("envelope should build");
    let message = serde_json::to_vec(&envelope).expect("envelope should encode");

    let msg_id = message_id(Some("pipeline-echo"));
    let datagrams =
        fragment_message(&msg_id, &message, 200).expect("message should fragment at mtu 200");
    let mut fragments = decode_datagrams(&datagrams);
    assert!(fragments.len() >= 3, "payload must span several fragments");

    // Deliver in reverse order with the second fragment duplicated.
    fragments.reverse();
    fragments.insert(1, fragments[1].clone());

    let mut cache = ReassemblyCache::new();
    let mut delivered = None;
    for fragment in fragments {
        if let Some(bytes) = cache.insert(fragment) {
            assert!(delivered.is_none(), "message delivered more than once");
            delivered = Some(bytes);
        }
    }

    let bytes = delivered.expect("message should complete");
    assert_eq!(bytes, message, "reassembly must be byte-exact");
    assert_eq!(cache.pending_count(), 0, "cache must be empty after delivery");

    // The reassembled bytes drive the dispatcher like a receiver would.
    let seen = Arc::new(Mutex::new(String::new()));
    {
        let seen = Arc::clone(&seen);
        dispatch::register_handler("pipeline-echo", move |raw, _| {
            let decoded: String = serde_json::from_str(raw.get())?;
            *seen.lock().expect("test mutex") = decoded;
            Ok(())
        });
    }
    dispatch::dispatch(&bytes, "239.255.71.1:9999");
    assert_eq!(*seen.lock().expect("test mutex"), payload);
}

#[test]
fn unknown_envelope_type_is_dropped_without_side_effects() {
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        dispatch::register_handler("pipeline-known", move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let envelope = Envelope::new("nope", &()).expect("envelope should build");
    let message = serde_json::to_vec(&envelope).expect("envelope should encode");

    let mut cache = ReassemblyCache::new();
    let datagrams = fragment_message("t-unknown", &message, 1500).expect("should fragment");
    let fragments = decode_datagrams(&datagrams);
    assert_eq!(fragments.len(), 1, "small message must be one fragment");

    let bytes = cache
        .insert(fragments[0].clone())
        .expect("single fragment completes");
    dispatch::dispatch(&bytes, "239.255.71.1:9999");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no handler may fire");
}

#[test]
fn redundant_rounds_redeliver_complete_messages() {
    // The one-shot sender repeats the fragment sequence; each complete pass
    // reassembles independently. Registry-level dedup is what makes the
    // repeats harmless, not the cache.
    let envelope = Envelope::new("pipeline-rounds", &7u32).expect("envelope should build");
    let message = serde_json::to_vec(&envelope).expect("envelope should encode");
    let datagrams = fragment_message("t-rounds", &message, 1500).expect("should fragment");
    let fragments = decode_datagrams(&datagrams);

    let mut cache = ReassemblyCache::new();
    let mut deliveries = 0;
    for _round in 0..3 {
        for fragment in &fragments {
            if cache.insert(fragment.clone()).is_some() {
                deliveries += 1;
            }
        }
    }
    assert_eq!(deliveries, 3, "each full pass completes once");
}
