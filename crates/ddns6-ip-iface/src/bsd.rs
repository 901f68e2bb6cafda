// # ioctl Address Reader (FreeBSD, OpenBSD)
//
// Enumerates the interface's IPv6 addresses with `getifaddrs`, then asks the
// kernel for each address's lifetimes with `SIOCGIFALIFETIME_IN6`. An address
// whose ioctl fails is skipped.

use async_trait::async_trait;
use ddns6_core::AddressRecord;
use ddns6_core::error::DiscoveryError;
use ddns6_core::traits::InterfaceAddressSource;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::if_nametoindex;
use std::net::{Ipv6Addr, UdpSocket};
use std::os::fd::AsRawFd;

use crate::kernel_lifetime;

/// `struct in6_addrlifetime`
#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct In6AddrLifetime {
    ia6t_expire: libc::time_t,
    ia6t_preferred: libc::time_t,
    ia6t_vltime: u32,
    ia6t_pltime: u32,
}

/// The `ifr_ifru` union of `struct in6_ifreq`
///
/// Only the members used here are spelled out; `_stats` gives the union the
/// size of its largest member (`struct icmp6_ifstat`), which is part of the
/// ioctl request code.
#[repr(C)]
union In6IfreqData {
    addr: libc::sockaddr_in6,
    lifetime: In6AddrLifetime,
    _stats: [u64; 34],
}

/// `struct in6_ifreq`
#[repr(C)]
struct In6Ifreq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_ifru: In6IfreqData,
}

nix::ioctl_readwrite!(siocgifalifetime_in6, b'i', 81, In6Ifreq);

/// Reads interface addresses and lifetimes via ioctl
#[derive(Debug, Default, Clone)]
pub struct IoctlReader;

impl IoctlReader {
    /// Create a new ioctl reader
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InterfaceAddressSource for IoctlReader {
    async fn list_addresses(&self, interface: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
        let name = interface.to_string();
        let records = tokio::task::spawn_blocking(move || read_interface(&name))
            .await
            .map_err(|e| DiscoveryError::Other(format!("ioctl task failed: {e}")))??;

        if records.is_empty() {
            return Err(DiscoveryError::NoGlobalAddress(interface.to_string()));
        }

        tracing::debug!("ioctl reported {} address(es) on {}", records.len(), interface);
        Ok(records)
    }

    fn mechanism(&self) -> &'static str {
        "ioctl"
    }
}

fn read_interface(interface: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
    if_nametoindex(interface).map_err(|_| DiscoveryError::NotFound(interface.to_string()))?;

    let addrs = getifaddrs()
        .map_err(|e| DiscoveryError::from_io(interface, &std::io::Error::from(e)))?;
    let socket = UdpSocket::bind("[::]:0").map_err(|e| DiscoveryError::from_io(interface, &e))?;

    let fd = socket.as_raw_fd();
    let candidates = addrs
        .filter(|a| a.interface_name == interface)
        .filter_map(|a| {
            let sin6 = a.address.as_ref()?.as_sockaddr_in6()?;
            Some((sin6.ip(), sin6.scope_id()))
        });

    Ok(collect_records(candidates, |address, scope_id| {
        query_lifetime(fd, interface, address, scope_id)
    }))
}

/// Classify each non-link-local candidate, skipping those whose lifetime
/// query fails
fn collect_records(
    candidates: impl Iterator<Item = (Ipv6Addr, u32)>,
    mut lifetime: impl FnMut(Ipv6Addr, u32) -> Option<(u32, u32)>,
) -> Vec<AddressRecord> {
    let mut records = Vec::new();
    for (address, scope_id) in candidates {
        if address.is_unicast_link_local() {
            continue;
        }

        match lifetime(address, scope_id) {
            Some((preferred, valid)) => {
                if let Some(record) =
                    AddressRecord::classify(address, kernel_lifetime(preferred), kernel_lifetime(valid))
                {
                    records.push(record);
                }
            }
            None => tracing::debug!("SIOCGIFALIFETIME_IN6 failed for {}, skipping", address),
        }
    }
    records
}

/// Returns `(pltime, vltime)` in seconds
fn query_lifetime(
    fd: libc::c_int,
    interface: &str,
    address: Ipv6Addr,
    scope_id: u32,
) -> Option<(u32, u32)> {
    // SAFETY: In6Ifreq is plain old data; all-zero is a valid value.
    let mut req: In6Ifreq = unsafe { std::mem::zeroed() };

    for (dst, src) in req
        .ifr_name
        .iter_mut()
        .zip(interface.bytes().take(libc::IFNAMSIZ - 1))
    {
        *dst = src as libc::c_char;
    }

    // SAFETY: sockaddr_in6 is plain old data; all-zero is a valid value.
    let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
    sin6.sin6_len = std::mem::size_of::<libc::sockaddr_in6>() as u8;
    sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sin6.sin6_addr.s6_addr = address.octets();
    sin6.sin6_scope_id = scope_id;
    req.ifr_ifru.addr = sin6;

    // SAFETY: `req` is a properly laid out in6_ifreq and `fd` is an open
    // AF_INET6 datagram socket for the duration of the call.
    unsafe { siocgifalifetime_in6(fd, &mut req) }.ok()?;

    // SAFETY: a successful SIOCGIFALIFETIME_IN6 fills the lifetime member.
    let lifetime = unsafe { req.ifr_ifru.lifetime };
    Some((lifetime.ia6t_pltime, lifetime.ia6t_vltime))
}
