// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface discovery.
//!
//! Enumerates local IPv4 adapters once, classifies them (up, loopback,
//! broadcast-capable) and derives their broadcast addresses. The resulting
//! [`InterfaceRegistry`] is an immutable snapshot; re-discovery builds a new
//! one.
//!
//! Enumeration is behind [`InterfaceSource`]:
//! - Unix: `getifaddrs` (flags and netmask straight from the kernel)
//! - Other platforms: `local_ip_address` crate (flags inferred)
//! - [`StaticInterfaces`]: fixed adapter list for tests and pinned setups

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;

/// One IPv4 address as reported by the platform, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterAddress {
    /// Adapter name (e.g. "eth0").
    pub name: String,
    /// IPv4 address assigned to the adapter.
    pub address: Ipv4Addr,
    /// Subnet mask, when the platform reports one.
    pub netmask: Option<Ipv4Addr>,
    /// Broadcast address reported by the platform (overrides the computed one).
    pub broadcast_address: Option<Ipv4Addr>,
    pub is_up: bool,
    pub is_loopback: bool,
    pub is_broadcast: bool,
}

impl AdapterAddress {
    /// Create an adapter entry that is up, not loopback, not broadcast-capable.
    pub fn new(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address,
            netmask: None,
            broadcast_address: None,
            is_up: true,
            is_loopback: false,
            is_broadcast: false,
        }
    }

    /// Set the netmask from a CIDR prefix length.
    pub fn with_prefix_len(self, prefix_len: u8) -> Self {
        self.with_netmask(netmask_from_prefix(prefix_len))
    }

    pub fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = Some(netmask);
        self
    }

    pub fn with_broadcast_address(mut self, addr: Ipv4Addr) -> Self {
        self.broadcast_address = Some(addr);
        self
    }

    pub fn with_up(mut self, up: bool) -> Self {
        self.is_up = up;
        self
    }

    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.is_loopback = loopback;
        self
    }

    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.is_broadcast = broadcast;
        self
    }
}

/// A classified local network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Enumeration index; lower wins when picking the primary interface.
    pub id: u32,
    pub name: String,
    pub address: Ipv4Addr,
    /// `None` unless the interface is broadcast-capable and not loopback.
    pub broadcast_address: Option<Ipv4Addr>,
    pub is_up: bool,
    pub is_broadcast: bool,
    pub is_loopback: bool,
}

impl Interface {
    fn classify(id: u32, raw: AdapterAddress) -> Self {
        let broadcast_address = if raw.is_broadcast && !raw.is_loopback {
            raw.broadcast_address.or_else(|| {
                raw.netmask
                    .map(|mask| Ipv4Addr::from(u32::from(raw.address) | !u32::from(mask)))
            })
        } else {
            None
        };

        Self {
            id,
            name: raw.name,
            address: raw.address,
            broadcast_address,
            is_up: raw.is_up,
            is_broadcast: raw.is_broadcast,
            is_loopback: raw.is_loopback,
        }
    }

    /// Up, non-loopback, broadcast-capable, with an assigned address.
    pub fn is_primary_candidate(&self) -> bool {
        self.is_up && !self.is_loopback && self.is_broadcast && !self.address.is_unspecified()
    }

    /// Broadcast destination for this interface, if it can carry a broadcast.
    pub fn broadcast_target(&self) -> Option<Ipv4Addr> {
        if !self.is_up || !self.is_broadcast || self.is_loopback {
            return None;
        }
        self.broadcast_address.filter(|addr| !addr.is_unspecified())
    }
}

/// Platform adapter enumeration.
pub trait InterfaceSource: Send + Sync {
    /// List every IPv4 address on every adapter, in platform order.
    fn enumerate(&self) -> io::Result<Vec<AdapterAddress>>;
}

/// Enumerates the adapters of the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn enumerate(&self) -> io::Result<Vec<AdapterAddress>> {
        system_adapters()
    }
}

/// Fixed adapter list.
#[derive(Debug, Default, Clone)]
pub struct StaticInterfaces {
    adapters: Vec<AdapterAddress>,
}

impl StaticInterfaces {
    pub fn new(adapters: Vec<AdapterAddress>) -> Self {
        Self { adapters }
    }
}

impl InterfaceSource for StaticInterfaces {
    fn enumerate(&self) -> io::Result<Vec<AdapterAddress>> {
        Ok(self.adapters.clone())
    }
}

/// Immutable snapshot of the local interfaces, keyed by adapter name.
#[derive(Debug, Clone, Default)]
pub struct InterfaceRegistry {
    /// Sorted by id.
    interfaces: Vec<Interface>,
    by_name: HashMap<String, usize>,
}

impl InterfaceRegistry {
    /// Enumerate and classify adapters from `source`.
    pub fn discover(source: &dyn InterfaceSource) -> Result<Self> {
        let adapters = source.enumerate().map_err(EngineError::Discovery)?;
        let registry = Self::from_adapters(adapters);

        for iface in &registry.interfaces {
            log::debug!(
                "[IFACE] id={} name={} addr={} bcast={:?} up={} loopback={} broadcast={}",
                iface.id,
                iface.name,
                iface.address,
                iface.broadcast_address,
                iface.is_up,
                iface.is_loopback,
                iface.is_broadcast
            );
        }
        log::info!(
            "[IFACE] Discovered {} interfaces, primary={}",
            registry.len(),
            registry
                .primary_address()
                .map_or_else(|| "none".to_string(), |a| a.to_string())
        );
        Ok(registry)
    }

    /// Classify a raw adapter list. An adapter with several IPv4 addresses
    /// keeps only the first one.
    pub fn from_adapters(adapters: Vec<AdapterAddress>) -> Self {
        let mut registry = Self::default();
        for raw in adapters {
            if registry.by_name.contains_key(&raw.name) {
                log::trace!(
                    "[IFACE] Skipping secondary address {} on {}",
                    raw.address,
                    raw.name
                );
                continue;
            }
            let id = registry.interfaces.len() as u32;
            registry.by_name.insert(raw.name.clone(), registry.interfaces.len());
            registry.interfaces.push(Interface::classify(id, raw));
        }
        registry
    }

    /// Address of the lowest-id primary candidate.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.interfaces
            .iter()
            .filter(|iface| iface.is_primary_candidate())
            .min_by_key(|iface| iface.id)
            .map(|iface| iface.address)
    }

    /// Broadcast destinations of every eligible interface, in id order.
    pub fn broadcast_targets(&self) -> Vec<Ipv4Addr> {
        self.interfaces
            .iter()
            .filter_map(Interface::broadcast_target)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.by_name.get(name).map(|&idx| &self.interfaces[idx])
    }

    /// Interfaces in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

fn netmask_from_prefix(prefix_len: u8) -> Ipv4Addr {
    let bits = u32::MAX
        .checked_shl(32 - u32::from(prefix_len.min(32)))
        .unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Unix: walk the `getifaddrs` list, keeping AF_INET entries.
#[cfg(unix)]
fn system_adapters() -> io::Result<Vec<AdapterAddress>> {
    use std::ffi::CStr;

    let mut adapters = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY:
    // - `ifaddrs` is a valid pointer to a null pointer, which getifaddrs will populate
    // - The returned list must be freed with freeifaddrs (done at end of function)
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY:
        // - `ifa` is checked to be non-null in the while condition
        // - The structure remains valid until freeifaddrs is called
        let entry = unsafe { &*ifa };
        ifa = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        // SAFETY: `entry.ifa_addr` is checked non-null above; we only read sa_family
        let family = unsafe { (*entry.ifa_addr).sa_family };
        if i32::from(family) != libc::AF_INET {
            continue;
        }

        // SAFETY:
        // - `entry.ifa_name` is non-null and NUL-terminated per getifaddrs
        // - Converted to an owned String before the list is freed
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();
        // SAFETY: sa_family == AF_INET guarantees a sockaddr_in
        let address = unsafe { sockaddr_in_to_ipv4(entry.ifa_addr) };

        let netmask = if entry.ifa_netmask.is_null() {
            None
        } else {
            // SAFETY: non-null, allocated by getifaddrs; the netmask of an AF_INET
            // entry is a sockaddr_in
            Some(unsafe { sockaddr_in_to_ipv4(entry.ifa_netmask) })
        };

        let flags = entry.ifa_flags;
        let has = |flag: libc::c_int| flags & (flag as libc::c_uint) != 0;

        adapters.push(AdapterAddress {
            name,
            address,
            netmask,
            broadcast_address: None,
            is_up: has(libc::IFF_UP),
            is_loopback: has(libc::IFF_LOOPBACK),
            is_broadcast: has(libc::IFF_BROADCAST),
        });
    }

    // SAFETY: `ifaddrs` is the pointer returned by getifaddrs and not yet freed
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(adapters)
}

/// # Safety
///
/// `addr` must point to a valid `sockaddr_in`.
#[cfg(unix)]
unsafe fn sockaddr_in_to_ipv4(addr: *const libc::sockaddr) -> Ipv4Addr {
    let sockaddr_in = addr.cast::<libc::sockaddr_in>();
    Ipv4Addr::from(u32::from_be((*sockaddr_in).sin_addr.s_addr))
}

/// Other platforms: `local_ip_address` lists names and addresses only, so the
/// flags are inferred and broadcast goes to the limited broadcast address.
#[cfg(not(unix))]
fn system_adapters() -> io::Result<Vec<AdapterAddress>> {
    use std::net::IpAddr;

    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(interfaces
        .into_iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(address) => {
                let loopback = address.is_loopback();
                let mut adapter = AdapterAddress::new(name, address)
                    .with_loopback(loopback)
                    .with_broadcast(!loopback);
                if !loopback {
                    adapter = adapter.with_broadcast_address(Ipv4Addr::BROADCAST);
                }
                Some(adapter)
            }
            IpAddr::V6(_) => None,
        })
        .collect())
}
