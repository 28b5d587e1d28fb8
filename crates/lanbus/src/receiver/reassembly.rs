// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-windowed fragment reassembly.
//!
//! Fragments can arrive out of order, duplicated, or never. The cache keeps
//! one entry per in-flight message ID and hands back the concatenated bytes
//! exactly once, when the last missing fragment lands. Partial messages are
//! evicted by the receiver's expiry thread once they outlive the reassembly
//! window.
//!
//! Not internally synchronized; the owning receiver wraps it in a `Mutex`
//! shared with its expiry thread.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocol::Fragment;

/// Partially received message.
struct ReassemblyEntry {
    /// Fragment data indexed by `seq` (1-based).
    slots: HashMap<u32, Vec<u8>>,
    /// Distinct fragments received so far.
    received: u32,
    /// Declared fragment count, taken from the first fragment seen.
    total: u32,
    /// Entry creation time, for age-based eviction.
    created_at: Instant,
}

/// Reassembly cache: message ID -> partial fragment set.
#[derive(Default)]
pub struct ReassemblyCache {
    entries: HashMap<String, ReassemblyEntry>,
}

impl ReassemblyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fragment and attempt reassembly.
    ///
    /// Returns the complete message bytes when this fragment finishes the
    /// message, `None` otherwise. Duplicate fragments neither overwrite nor
    /// count. A completed or abandoned message is removed, so it can never
    /// be delivered twice.
    pub fn insert(&mut self, fragment: Fragment) -> Option<Vec<u8>> {
        let Fragment {
            id,
            seq,
            total,
            data,
        } = fragment;

        let entry = self
            .entries
            .entry(id.clone())
            .or_insert_with(|| ReassemblyEntry {
                slots: HashMap::new(),
                received: 0,
                total,
                created_at: Instant::now(),
            });

        if entry.total != total {
            // All fragments of a message must agree on total; trust the
            // first one seen.
            log::debug!(
                "[reassembly] total mismatch in message {}: entry says {}, fragment says {}",
                id,
                entry.total,
                total
            );
        }

        if !entry.slots.contains_key(&seq) {
            entry.slots.insert(seq, data);
            entry.received += 1;
        }

        if entry.received < entry.total {
            return None;
        }

        // Take the entry out before assembling so delivery happens at most
        // once, whether the scan succeeds or abandons the message.
        let entry = self.entries.remove(&id)?;
        assemble(&id, entry)
    }

    /// Remove every entry older than `max_age`.
    ///
    /// Called by the expiry thread; returns the number of evicted messages.
    pub fn evict_expired(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|id, entry| {
            let age = now.duration_since(entry.created_at);
            if age > max_age {
                log::debug!(
                    "[reassembly] dropping expired message {} ({}/{} fragments after {:?})",
                    id,
                    entry.received,
                    entry.total,
                    age
                );
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// Number of in-flight partial messages.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }
}

/// Concatenate slots `1..=total`, defensively checking for holes.
fn assemble(id: &str, entry: ReassemblyEntry) -> Option<Vec<u8>> {
    let size: usize = entry.slots.values().map(Vec::len).sum();
    let mut message = Vec::with_capacity(size);
    for seq in 1..=entry.total {
        match entry.slots.get(&seq) {
            Some(data) => message.extend_from_slice(data),
            None => {
                // Should be unreachable given the duplicate rule; checked
                // anyway so a counting bug drops the message instead of
                // delivering garbage.
                log::warn!("[reassembly] missing fragment {} in message {}", seq, id);
                return None;
            }
        }
    }
    log::debug!(
        "[reassembly] message {} complete ({} fragments, {} bytes)",
        id,
        entry.total,
        message.len()
    );
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(id: &str, seq: u32, total: u32, data: &[u8]) -> Fragment {
        Fragment {
            id: id.to_owned(),
            seq,
            total,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_in_order_reassembly() {
        let mut cache = ReassemblyCache::new();
        assert!(cache.insert(frag("m", 1, 3, &[0xAA, 0xBB])).is_none());
        assert!(cache.insert(frag("m", 2, 3, &[0xCC, 0xDD])).is_none());
        let complete = cache
            .insert(frag("m", 3, 3, &[0xEE, 0xFF]))
            .expect("final fragment should complete the message");
        assert_eq!(complete, vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(cache.pending_count(), 0, "delivered entry must be removed");
    }

    #[test]
    fn test_reverse_order_with_duplicate() {
        // Arrival order 5,4,3,2,2,1: one delivery, duplicates ignored.
        let mut cache = ReassemblyCache::new();
        assert!(cache.insert(frag("m", 5, 5, b"e")).is_none());
        assert!(cache.insert(frag("m", 4, 5, b"d")).is_none());
        assert!(cache.insert(frag("m", 3, 5, b"c")).is_none());
        assert!(cache.insert(frag("m", 2, 5, b"b")).is_none());
        assert!(
            cache.insert(frag("m", 2, 5, b"X")).is_none(),
            "duplicate must not complete the message"
        );
        let complete = cache
            .insert(frag("m", 1, 5, b"a"))
            .expect("last missing fragment should complete the message");
        assert_eq!(complete, b"abcde");
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_keeps_first_bytes() {
        let mut cache = ReassemblyCache::new();
        assert!(cache.insert(frag("m", 1, 2, b"first")).is_none());
        assert!(cache.insert(frag("m", 1, 2, b"SECOND")).is_none());
        let complete = cache
            .insert(frag("m", 2, 2, b"!"))
            .expect("message should complete");
        assert_eq!(complete, b"first!");
    }

    #[test]
    fn test_single_fragment_message() {
        let mut cache = ReassemblyCache::new();
        let complete = cache
            .insert(frag("solo", 1, 1, b"payload"))
            .expect("single-fragment message completes immediately");
        assert_eq!(complete, b"payload");
    }

    #[test]
    fn test_empty_single_fragment() {
        let mut cache = ReassemblyCache::new();
        let complete = cache
            .insert(frag("empty", 1, 1, b""))
            .expect("empty message still completes");
        assert!(complete.is_empty());
    }

    #[test]
    fn test_expiry_removes_partials_only() {
        let mut cache = ReassemblyCache::new();
        cache.insert(frag("stale", 1, 3, b"a"));
        assert_eq!(cache.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(30));

        // Entry is younger than a generous window: kept.
        assert_eq!(cache.evict_expired(Duration::from_secs(15)), 0);
        assert_eq!(cache.pending_count(), 1);

        // Entry is older than a tiny window: evicted, never delivered.
        assert_eq!(cache.evict_expired(Duration::from_millis(10)), 1);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_late_fragments_start_fresh_entry() {
        let mut cache = ReassemblyCache::new();
        cache.insert(frag("m", 1, 3, b"a"));
        std::thread::sleep(Duration::from_millis(20));
        cache.evict_expired(Duration::from_millis(5));
        assert_eq!(cache.pending_count(), 0);

        // Fragments 2 and 3 arriving after expiry form a new incomplete
        // entry; the message is never delivered without a fresh fragment 1.
        assert!(cache.insert(frag("m", 2, 3, b"b")).is_none());
        assert!(cache.insert(frag("m", 3, 3, b"c")).is_none());
        assert_eq!(cache.pending_count(), 1);
    }

    #[test]
    fn test_round_trip_any_permutation() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let chunks: Vec<&[u8]> = payload.chunks(64).collect();
        let total = chunks.len() as u32;

        // A few representative permutations, including the identity.
        let orders: [Vec<usize>; 3] = [vec![0, 1, 2, 3], vec![3, 2, 1, 0], vec![2, 0, 3, 1]];
        for order in &orders {
            let mut cache = ReassemblyCache::new();
            let mut delivered = None;
            for &i in order {
                let result = cache.insert(frag("perm", i as u32 + 1, total, chunks[i]));
                if let Some(bytes) = result {
                    assert!(delivered.is_none(), "delivered more than once");
                    delivered = Some(bytes);
                }
            }
            assert_eq!(
                delivered.expect("message should complete"),
                payload,
                "order {:?} corrupted the payload",
                order
            );
        }
    }

    #[test]
    fn test_independent_messages_do_not_interfere() {
        let mut cache = ReassemblyCache::new();
        assert!(cache.insert(frag("a", 1, 2, b"a1")).is_none());
        assert!(cache.insert(frag("b", 1, 2, b"b1")).is_none());
        assert_eq!(cache.pending_count(), 2);

        let a = cache.insert(frag("a", 2, 2, b"a2")).expect("a completes");
        assert_eq!(a, b"a1a2");
        assert_eq!(cache.pending_count(), 1, "b is still pending");

        let b = cache.insert(frag("b", 2, 2, b"b2")).expect("b completes");
        assert_eq!(b, b"b1b2");
    }
}
