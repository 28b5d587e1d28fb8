// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host registry and the two built-in envelope handlers.
//!
//! Every peer announces a `HostInfo` record; the registry keeps the latest
//! one per hostname. Readers snapshot the whole table as a copy, the
//! `hostinfo` handler is the only writer in the core. Identical
//! announcements are deduplicated so a chatty network does not churn the
//! table.
//!
//! The `hostinfoSend` type is a content-free trigger: any peer can ask the
//! group "please re-announce" with a single small datagram instead of
//! scraping the full host table at join time.

use std::collections::{HashMap, HashSet};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::config::HOSTINFO_MTU;
use crate::dispatch::register_handler;
use crate::error::Result;
use crate::transport::ifaces::local_ipv4_addresses;
use crate::transport::sender::{send_with_envelope, CancelToken};

/// One peer's announced identity.
///
/// `hostname` is the primary key; `ips` is treated as an unordered set when
/// comparing records. The metadata fields default to empty so the minimal
/// `{hostname, ips}` wire shape decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    /// Software version of the announcing peer.
    #[serde(default)]
    pub version: String,
    /// Build timestamp of the announcing peer.
    #[serde(default)]
    pub build_date: String,
    /// VCS revision of the announcing peer.
    #[serde(default)]
    pub revision: String,
    /// Primary key: the peer's hostname.
    pub hostname: String,
    /// Non-loopback IPv4 addresses, dotted-quad, unordered.
    #[serde(default)]
    pub ips: Vec<String>,
    /// Service endpoint host, if the peer exposes one.
    #[serde(default)]
    pub endpoint: String,
    /// Service endpoint port, 0 when unset.
    #[serde(default)]
    pub endpoint_port: u16,
}

impl HostInfo {
    /// Identity of the local host: hostname plus non-loopback IPv4 set,
    /// metadata left empty for the embedding process to fill.
    #[must_use]
    pub fn local() -> Self {
        Self {
            hostname: local_hostname(),
            ips: local_ipv4_addresses(),
            ..Self::default()
        }
    }

    /// True when any announced field differs, with `ips` compared as an
    /// unordered set.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        !ips_equal(&self.ips, &other.ips)
            || self.endpoint != other.endpoint
            || self.endpoint_port != other.endpoint_port
            || self.version != other.version
            || self.build_date != other.build_date
            || self.revision != other.revision
    }
}

/// Order-insensitive IP list comparison.
fn ips_equal(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let set: HashSet<&str> = a.iter().map(String::as_str).collect();
    b.iter().all(|ip| set.contains(ip.as_str()))
}

/// Local hostname, `"unknown"` when the OS will not say.
pub(crate) fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned())
}

static HOST_DATA: OnceLock<RwLock<HashMap<String, HostInfo>>> = OnceLock::new();

fn host_data() -> &'static RwLock<HashMap<String, HostInfo>> {
    HOST_DATA.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Install the built-in handlers and seed the local host's record.
///
/// Call once, before `run_receivers`.
pub fn init() {
    register_handler("hostinfoSend", handle_host_info_send);
    register_handler("hostinfo", handle_host_info);

    let local = HostInfo::local();
    log::info!(
        "[registry] seeded local record for {} ({} address(es))",
        local.hostname,
        local.ips.len()
    );
    recover_write(host_data(), "host registry").insert(local.hostname.clone(), local);
}

/// Snapshot of the host registry, decoupled from future writes.
#[must_use]
pub fn get_host_data() -> HashMap<String, HostInfo> {
    recover_read(host_data(), "host registry").clone()
}

/// `hostinfoSend` built-in: re-announce the local record to the group.
///
/// The payload is ignored; the announcement carries the local registry
/// record as of the trigger, at the bus's announcement MTU.
fn handle_host_info_send(_payload: &RawValue, group_addr: &str) -> Result<()> {
    log::info!("[registry] re-announce triggered via {}", group_addr);

    let local = {
        let data = recover_read(host_data(), "host registry");
        data.get(&local_hostname()).cloned()
    };
    let local = local.unwrap_or_else(HostInfo::local);

    send_with_envelope(
        &CancelToken::new(),
        group_addr,
        HOSTINFO_MTU,
        "hostinfo",
        &local,
    )
}

/// `hostinfo` built-in: upsert the announced record if anything changed.
fn handle_host_info(payload: &RawValue, _group_addr: &str) -> Result<()> {
    let info: HostInfo = serde_json::from_str(payload.get())?;
    log::debug!(
        "[registry] received host info from {}: {:?}",
        info.hostname,
        info.ips
    );
    upsert(info);
    Ok(())
}

/// Idempotent registry update shared by the `hostinfo` handler.
fn upsert(info: HostInfo) {
    let mut data = recover_write(host_data(), "host registry");
    match data.get(&info.hostname) {
        Some(existing) if !existing.differs_from(&info) => {
            log::debug!("[registry] duplicate host data for {} ignored", info.hostname);
        }
        _ => {
            log::info!("[registry] updated host data for {}", info.hostname);
            data.insert(info.hostname.clone(), info);
        }
    }
}

fn recover_read<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[registry] {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

fn recover_write<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[registry] {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is process-global and shared across the test binary;
    // every test uses its own hostnames to stay independent.

    fn info(hostname: &str, ips: &[&str]) -> HostInfo {
        HostInfo {
            hostname: hostname.to_owned(),
            ips: ips.iter().map(|s| (*s).to_owned()).collect(),
            ..HostInfo::default()
        }
    }

    #[test]
    fn test_minimal_wire_shape_decodes() {
        let info: HostInfo = serde_json::from_str(r#"{"hostname":"h1","ips":["10.0.0.1"]}"#)
            .expect("minimal shape should decode");
        assert_eq!(info.hostname, "h1");
        assert_eq!(info.ips, vec!["10.0.0.1"]);
        assert!(info.version.is_empty());
        assert_eq!(info.endpoint_port, 0);
    }

    #[test]
    fn test_rich_wire_shape_uses_camel_case() {
        let wire = r#"{
            "version":"1.2.3","buildDate":"2026-07-01","revision":"abc123",
            "hostname":"h2","ips":["10.0.0.2"],"endpoint":"h2.lan","endpointPort":8080
        }"#;
        let info: HostInfo = serde_json::from_str(wire).expect("rich shape should decode");
        assert_eq!(info.build_date, "2026-07-01");
        assert_eq!(info.endpoint_port, 8080);

        let back = serde_json::to_string(&info).expect("should encode");
        assert!(back.contains("\"buildDate\""), "got: {}", back);
        assert!(back.contains("\"endpointPort\""), "got: {}", back);
        assert!(!back.contains("build_date"), "got: {}", back);
    }

    #[test]
    fn test_ip_comparison_is_unordered() {
        let a = info("x", &["10.0.0.1", "192.168.1.5"]);
        let b = info("x", &["192.168.1.5", "10.0.0.1"]);
        assert!(!a.differs_from(&b));

        let c = info("x", &["10.0.0.1"]);
        assert!(a.differs_from(&c));
    }

    #[test]
    fn test_metadata_changes_are_differences() {
        let base = info("x", &["10.0.0.1"]);
        let mut changed = base.clone();
        changed.endpoint_port = 9000;
        assert!(base.differs_from(&changed));

        let mut changed = base.clone();
        changed.revision = "deadbeef".to_owned();
        assert!(base.differs_from(&changed));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let record = info("idem-host", &["10.1.1.1", "10.1.1.2"]);
        upsert(record.clone());
        let first = get_host_data();
        assert_eq!(first.get("idem-host"), Some(&record));

        // Same content, different IP order: no-op on state.
        let mut reordered = record.clone();
        reordered.ips.reverse();
        upsert(reordered);
        assert_eq!(get_host_data().get("idem-host"), Some(&record));
    }

    #[test]
    fn test_upsert_replaces_changed_record() {
        upsert(info("chg-host", &["10.2.0.1"]));
        let mut updated = info("chg-host", &["10.2.0.1"]);
        updated.version = "2.0".to_owned();
        upsert(updated.clone());
        assert_eq!(get_host_data().get("chg-host"), Some(&updated));
    }

    #[test]
    fn test_snapshot_is_decoupled() {
        upsert(info("snap-host", &["10.3.0.1"]));
        let snapshot = get_host_data();
        upsert(info("snap-host", &["10.3.0.99"]));
        assert_eq!(
            snapshot
                .get("snap-host")
                .expect("snapshot should hold the record")
                .ips,
            vec!["10.3.0.1"],
            "snapshot must not see later writes"
        );
    }

    #[test]
    fn test_hostinfo_handler_rejects_garbage() {
        let raw = serde_json::value::RawValue::from_string("42".to_owned())
            .expect("raw value should build");
        assert!(handle_host_info(&raw, "239.0.0.1:1").is_err());
    }

    #[test]
    fn test_init_seeds_local_record() {
        init();
        let data = get_host_data();
        let local = data
            .get(&local_hostname())
            .expect("init should seed the local hostname");
        assert!(!local.ips.contains(&"127.0.0.1".to_owned()));
    }
}
