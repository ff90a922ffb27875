//! Network interface selection and address discovery.
//!
//! The node binds and advertises on a single interface. The default UnixNetifs
//! implementation reports every interface on the host, so [`FilteredNetifs`]
//! narrows General Diagnostics down to the one in use.

use std::collections::BTreeSet;
use std::ffi::CString;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::{error, warn};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::{InterfaceFlags, if_nametoindex};
use nix::sys::socket::{AddressFamily, SockaddrLike};

use rs_matter::dm::clusters::gen_diag::{InterfaceTypeEnum, NetifDiag, NetifInfo};
use rs_matter::dm::networks::NetChangeNotif;
use rs_matter::error::{Error, ErrorCode};

/// Addresses and link state of one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub index: u32,
    pub operational: bool,
    pub hw_addr: [u8; 8],
    pub ipv4: Vec<Ipv4Addr>,
    /// Global IPv6 addresses; link-local (fe80::/10) ones are left out
    pub ipv6: Vec<Ipv6Addr>,
}

impl InterfaceSnapshot {
    /// All addresses as an ordered set, for change detection.
    pub fn addresses(&self) -> BTreeSet<IpAddr> {
        self.ipv4
            .iter()
            .copied()
            .map(IpAddr::V4)
            .chain(self.ipv6.iter().copied().map(IpAddr::V6))
            .collect()
    }
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80
}

/// Read the current state of `interface_name`, `None` if it doesn't exist.
pub fn scan_interface(interface_name: &str) -> Option<InterfaceSnapshot> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            error!("Failed to get interface addresses: {:?}", e);
            return None;
        }
    };

    let mut snapshot: Option<InterfaceSnapshot> = None;

    for ifaddr in addrs {
        if ifaddr.interface_name != interface_name {
            continue;
        }

        let snap = snapshot.get_or_insert_with(|| InterfaceSnapshot {
            name: interface_name.to_string(),
            ..Default::default()
        });

        if snap.index == 0
            && let Ok(cname) = CString::new(interface_name)
            && let Ok(idx) = if_nametoindex(cname.as_c_str())
        {
            snap.index = idx;
        }

        if ifaddr.flags.contains(InterfaceFlags::IFF_RUNNING) {
            snap.operational = true;
        }

        let Some(addr) = ifaddr.address else {
            continue;
        };
        match addr.family() {
            Some(AddressFamily::Inet) => {
                if let Some(sockaddr) = addr.as_sockaddr_in() {
                    snap.ipv4.push(sockaddr.ip());
                }
            }
            Some(AddressFamily::Inet6) => {
                if let Some(sockaddr) = addr.as_sockaddr_in6()
                    && !is_link_local(&sockaddr.ip())
                {
                    snap.ipv6.push(sockaddr.ip());
                }
            }
            Some(AddressFamily::Packet) => {
                if let Some(link_addr) = addr.as_link_addr()
                    && let Some(mac) = link_addr.addr()
                {
                    let len = mac.len().min(8);
                    snap.hw_addr[..len].copy_from_slice(&mac[..len]);
                }
            }
            _ => {}
        }
    }

    snapshot
}

/// Pick the first running, non-loopback interface that has an IPv4 address.
pub fn detect_interface() -> Option<String> {
    let addrs = getifaddrs().ok()?;
    addrs
        .filter(|ifaddr| {
            !ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK)
                && ifaddr.flags.contains(InterfaceFlags::IFF_RUNNING)
        })
        .find(|ifaddr| {
            ifaddr
                .address
                .as_ref()
                .is_some_and(|addr| addr.family() == Some(AddressFamily::Inet))
        })
        .map(|ifaddr| ifaddr.interface_name)
}

/// Resolve the interface to use: the configured one, else auto-detected.
pub fn resolve_interface(configured: Option<&str>) -> Result<String, Error> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }
    detect_interface().ok_or_else(|| {
        error!("No usable network interface found; set MATTER_INTERFACE");
        ErrorCode::NoNetworkInterface.into()
    })
}

/// A network interface implementation that only returns addresses from a specific interface.
#[derive(Clone, Copy)]
pub struct FilteredNetifs {
    /// The interface name to filter to (e.g., "enp14s0", "eth0")
    interface_name: &'static str,
}

impl FilteredNetifs {
    pub const fn new(interface_name: &'static str) -> Self {
        Self { interface_name }
    }

    pub fn interface_name(&self) -> &'static str {
        self.interface_name
    }
}

impl NetifDiag for FilteredNetifs {
    fn netifs(&self, f: &mut dyn FnMut(&NetifInfo) -> Result<(), Error>) -> Result<(), Error> {
        let Some(snapshot) = scan_interface(self.interface_name) else {
            warn!(
                "FilteredNetifs: interface '{}' not found",
                self.interface_name
            );
            return Ok(());
        };

        let info = NetifInfo {
            name: self.interface_name,
            operational: snapshot.operational,
            offprem_svc_reachable_ipv4: None,
            offprem_svc_reachable_ipv6: None,
            hw_addr: &snapshot.hw_addr,
            ipv4_addrs: &snapshot.ipv4,
            ipv6_addrs: &snapshot.ipv6,
            netif_type: InterfaceTypeEnum::Ethernet,
            netif_index: snapshot.index,
        };

        f(&info)
    }
}

impl NetChangeNotif for FilteredNetifs {
    async fn wait_changed(&self) {
        // Address changes are reported by the address monitor instead
        core::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_local_detection() {
        assert!(is_link_local(&"fe80::1".parse().unwrap()));
        assert!(is_link_local(&"febf::1".parse().unwrap()));
        assert!(!is_link_local(&"fd00::1".parse().unwrap()));
        assert!(!is_link_local(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_snapshot_addresses() {
        let snapshot = InterfaceSnapshot {
            name: "eth0".to_string(),
            ipv4: vec![Ipv4Addr::new(192, 168, 1, 20)],
            ipv6: vec!["2001:db8::20".parse().unwrap()],
            ..Default::default()
        };
        let addrs = snapshot.addresses();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
    }

    #[test]
    fn test_configured_interface_wins() {
        assert_eq!(resolve_interface(Some("eth7")).unwrap(), "eth7");
    }

    #[test]
    fn test_scan_missing_interface() {
        assert!(scan_interface("no-such-iface0").is_none());
    }
}
