// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface enumeration.
//!
//! An interface is eligible for the bus when it is UP, multicast-capable,
//! and carries at least one IPv4 address. Enumeration is performed fresh on
//! each sender call and once at receiver startup; dynamic interface changes
//! are not tracked.
//!
//! - Unix: walks the `getifaddrs` list and checks `IFF_UP | IFF_MULTICAST`
//! - Other platforms: falls back to the `local-ip-address` crate, which
//!   exposes no flag information, so every IPv4-carrying interface is
//!   treated as eligible

use std::io;
use std::net::Ipv4Addr;

/// One eligible network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    /// OS interface name (e.g. `eth0`).
    pub name: String,
    /// Hardware address when the platform exposes it (Linux only).
    pub hw_addr: Option<String>,
    /// IPv4 addresses assigned to the interface, OS order.
    pub ipv4: Vec<Ipv4Addr>,
}

impl NetInterface {
    /// Address used to select this interface for multicast egress and group
    /// membership.
    #[must_use]
    pub fn primary_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4.first().copied()
    }
}

/// All UP, multicast-capable, IPv4-carrying interfaces in OS order.
///
/// # Errors
///
/// Returns the underlying OS error if the interface list cannot be read.
pub fn multicast_interfaces() -> io::Result<Vec<NetInterface>> {
    let interfaces = multicast_interfaces_platform()?;
    log::debug!(
        "[ifaces] {} eligible multicast interface(s)",
        interfaces.len()
    );
    Ok(interfaces)
}

/// Every non-loopback IPv4 address on the host, as dotted-quad strings.
///
/// Used to build the locally advertised `HostInfo` IP set; `127.0.0.1` is
/// excluded. Failures are logged and yield an empty list.
pub fn local_ipv4_addresses() -> Vec<String> {
    match enumerate_ipv4() {
        Ok(addrs) => addrs
            .into_iter()
            .filter(|(_, ip)| !ip.is_loopback())
            .map(|(_, ip)| ip.to_string())
            .collect(),
        Err(e) => {
            log::warn!("[ifaces] failed to read local addresses: {}", e);
            Vec::new()
        }
    }
}

// ===== Unix: getifaddrs =====

#[cfg(unix)]
fn multicast_interfaces_platform() -> io::Result<Vec<NetInterface>> {
    let required = (libc::IFF_UP | libc::IFF_MULTICAST) as u32;
    let mut interfaces: Vec<NetInterface> = Vec::new();

    for entry in system_ifaddrs()? {
        if entry.flags & required != required {
            continue;
        }
        let pos = match interfaces.iter().position(|i| i.name == entry.name) {
            Some(pos) => pos,
            None => {
                interfaces.push(NetInterface {
                    name: entry.name,
                    hw_addr: None,
                    ipv4: Vec::new(),
                });
                interfaces.len() - 1
            }
        };
        let slot = &mut interfaces[pos];
        if let Some(ip) = entry.ipv4 {
            slot.ipv4.push(ip);
        }
        if slot.hw_addr.is_none() {
            slot.hw_addr = entry.hw_addr;
        }
    }

    interfaces.retain(|i| !i.ipv4.is_empty());
    Ok(interfaces)
}

#[cfg(unix)]
fn enumerate_ipv4() -> io::Result<Vec<(String, Ipv4Addr)>> {
    Ok(system_ifaddrs()?
        .into_iter()
        .filter_map(|e| e.ipv4.map(|ip| (e.name, ip)))
        .collect())
}

/// One raw `getifaddrs` list entry. An interface appears once per address
/// family, so several entries may share a name.
#[cfg(unix)]
struct SysIfAddr {
    name: String,
    flags: u32,
    ipv4: Option<Ipv4Addr>,
    hw_addr: Option<String>,
}

#[cfg(unix)]
fn system_ifaddrs() -> io::Result<Vec<SysIfAddr>> {
    use std::ffi::CStr;

    let mut entries = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY:
    // - `ifaddrs` is a valid pointer to a null pointer, which getifaddrs will populate
    // - getifaddrs is a standard POSIX function that allocates and returns a linked list
    // - The returned list must be freed with freeifaddrs (done at end of function)
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY:
        // - `ifa` is checked to be non-null in the while condition
        // - The pointer comes from getifaddrs which returns valid ifaddrs structures
        // - The structure remains valid until freeifaddrs is called
        let entry = unsafe { &*ifa };

        // SAFETY:
        // - `entry.ifa_name` is guaranteed non-null and NUL-terminated by getifaddrs
        // - The string data is valid for the lifetime of the ifaddrs list
        // - We immediately convert to owned String, so no lifetime issues
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let mut ipv4 = None;
        let mut hw_addr = None;
        if !entry.ifa_addr.is_null() {
            // SAFETY:
            // - `entry.ifa_addr` is checked non-null above
            // - The sockaddr is allocated by getifaddrs and valid until freeifaddrs
            // - We only read sa_family to determine the address type
            let family = unsafe { (*entry.ifa_addr).sa_family };
            match i32::from(family) {
                libc::AF_INET => {
                    let sockaddr_in = entry.ifa_addr as *const libc::sockaddr_in;
                    // SAFETY:
                    // - sa_family == AF_INET guarantees this is a sockaddr_in structure
                    // - The pointer is valid as it comes from getifaddrs
                    // - sockaddr_in is properly aligned (same as sockaddr)
                    let raw = unsafe { (*sockaddr_in).sin_addr.s_addr };
                    ipv4 = Some(Ipv4Addr::from(u32::from_be(raw)));
                }
                #[cfg(target_os = "linux")]
                libc::AF_PACKET => {
                    let sockaddr_ll = entry.ifa_addr as *const libc::sockaddr_ll;
                    // SAFETY:
                    // - sa_family == AF_PACKET guarantees this is a sockaddr_ll structure
                    // - The pointer is valid as it comes from getifaddrs
                    // - sll_halen is bounded to the sll_addr array length before slicing
                    let (halen, addr) =
                        unsafe { ((*sockaddr_ll).sll_halen as usize, (*sockaddr_ll).sll_addr) };
                    let halen = halen.min(addr.len());
                    if halen > 0 {
                        hw_addr = Some(
                            addr[..halen]
                                .iter()
                                .map(|b| format!("{:02x}", b))
                                .collect::<Vec<_>>()
                                .join(":"),
                        );
                    }
                }
                _ => {}
            }
        }

        entries.push(SysIfAddr {
            name,
            flags: entry.ifa_flags,
            ipv4,
            hw_addr,
        });

        ifa = entry.ifa_next;
    }

    // SAFETY:
    // - `ifaddrs` is the pointer returned by getifaddrs at the start of the function
    // - The pointer is still valid (not freed yet)
    // - freeifaddrs is the correct function to free memory allocated by getifaddrs
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(entries)
}

// ===== Other platforms: local-ip-address crate =====

#[cfg(not(unix))]
fn multicast_interfaces_platform() -> io::Result<Vec<NetInterface>> {
    // No flag information is available here; every interface that carries an
    // IPv4 address is treated as eligible.
    let mut interfaces: Vec<NetInterface> = Vec::new();
    for (name, ip) in enumerate_ipv4()? {
        match interfaces.iter_mut().find(|i| i.name == name) {
            Some(slot) => slot.ipv4.push(ip),
            None => interfaces.push(NetInterface {
                name,
                hw_addr: None,
                ipv4: vec![ip],
            }),
        }
    }
    Ok(interfaces)
}

#[cfg(not(unix))]
fn enumerate_ipv4() -> io::Result<Vec<(String, Ipv4Addr)>> {
    use std::net::IpAddr;

    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(interfaces
        .into_iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(ipv4) => Some((name, ipv4)),
            IpAddr::V6(_) => None,
        })
        .collect())
}
