// # Netlink Address Reader (Linux)
//
// Dumps the kernel's IPv6 address table with `RTM_GETADDR` and keeps the
// entries of one interface.
//
// ## Implementation Notes
//
// Uses `netlink-sys` for the raw socket and `netlink-packet-route` for
// (de)serialization. The dump is short and synchronous, so it runs on the
// blocking pool rather than through an async socket.

use async_trait::async_trait;
use ddns6_core::AddressRecord;
use ddns6_core::error::DiscoveryError;
use ddns6_core::traits::InterfaceAddressSource;
use netlink_packet_core::{
    NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::address::Nla;
use netlink_packet_route::{AddressMessage, RtnlMessage};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use std::ffi::CString;
use std::io;
use std::net::Ipv6Addr;

use crate::kernel_lifetime;

/// One raw entry from the address dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawAddress {
    pub address: Ipv6Addr,
    pub preferred: u32,
    pub valid: u32,
}

/// Reads interface addresses over rtnetlink
#[derive(Debug, Default, Clone)]
pub struct NetlinkReader;

impl NetlinkReader {
    /// Create a new netlink reader
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InterfaceAddressSource for NetlinkReader {
    async fn list_addresses(&self, interface: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
        let index = interface_index(interface)?;

        let raw = tokio::task::spawn_blocking(move || dump_ipv6_addresses(index))
            .await
            .map_err(|e| DiscoveryError::Other(format!("netlink task failed: {e}")))?
            .map_err(|e| DiscoveryError::from_io(interface, &e))?;

        let records = classify_raw(raw);
        if records.is_empty() {
            return Err(DiscoveryError::NoGlobalAddress(interface.to_string()));
        }

        tracing::debug!("netlink reported {} address(es) on {}", records.len(), interface);
        Ok(records)
    }

    fn mechanism(&self) -> &'static str {
        "netlink"
    }
}

/// Drop IPv4-mapped and link-local entries, then classify the rest
pub(crate) fn classify_raw(raw: Vec<RawAddress>) -> Vec<AddressRecord> {
    raw.into_iter()
        .filter(|r| !r.address.is_unicast_link_local())
        .filter_map(|r| {
            AddressRecord::classify(
                r.address,
                kernel_lifetime(r.preferred),
                kernel_lifetime(r.valid),
            )
        })
        .collect()
}

fn interface_index(interface: &str) -> Result<u32, DiscoveryError> {
    let name = CString::new(interface)
        .map_err(|_| DiscoveryError::NotFound(interface.to_string()))?;

    // SAFETY: `name` is a valid NUL-terminated string that outlives the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(DiscoveryError::NotFound(interface.to_string()));
    }
    Ok(index)
}

/// `struct ifa_cacheinfo` starts with `ifa_prefered` then `ifa_valid`
fn parse_cache_info(bytes: &[u8]) -> Option<(u32, u32)> {
    let preferred = u32::from_ne_bytes(bytes.get(0..4)?.try_into().ok()?);
    let valid = u32::from_ne_bytes(bytes.get(4..8)?.try_into().ok()?);
    Some((preferred, valid))
}

fn address_from_bytes(bytes: &[u8]) -> Option<Ipv6Addr> {
    let octets: [u8; 16] = bytes.try_into().ok()?;
    Some(Ipv6Addr::from(octets))
}

fn to_raw(message: &AddressMessage) -> Option<RawAddress> {
    let mut address = None;
    let mut local = None;
    let mut lifetimes = None;

    for nla in &message.nlas {
        match nla {
            Nla::Address(bytes) => address = address_from_bytes(bytes),
            Nla::Local(bytes) => local = address_from_bytes(bytes),
            Nla::CacheInfo(bytes) => lifetimes = parse_cache_info(bytes),
            _ => {}
        }
    }

    // Addresses without cache info are permanent.
    let (preferred, valid) = lifetimes.unwrap_or((u32::MAX, u32::MAX));
    Some(RawAddress {
        address: address.or(local)?,
        preferred,
        valid,
    })
}

fn dump_ipv6_addresses(index: u32) -> io::Result<Vec<RawAddress>> {
    let mut socket = Socket::new(NETLINK_ROUTE)?;
    socket.bind_auto()?;
    socket.connect(&SocketAddr::new(0, 0))?;

    let mut request = AddressMessage::default();
    request.header.family = libc::AF_INET6 as u8;

    let mut packet = NetlinkMessage::new(
        NetlinkHeader::default(),
        NetlinkPayload::from(RtnlMessage::GetAddress(request)),
    );
    packet.header.flags = NLM_F_DUMP | NLM_F_REQUEST;
    packet.header.sequence_number = 1;
    packet.finalize();

    let mut buf = vec![0u8; packet.header.length as usize];
    packet.serialize(&mut buf[..]);
    socket.send(&buf[..], 0)?;

    let mut addresses = Vec::new();
    let mut receive_buffer = vec![0u8; 16 * 1024];

    loop {
        let size = socket.recv(&mut &mut receive_buffer[..], 0)?;
        if size == 0 {
            return Ok(addresses);
        }

        let mut offset = 0;
        while offset < size {
            let bytes = &receive_buffer[offset..size];
            let message = NetlinkMessage::<RtnlMessage>::deserialize(bytes)
                .map_err(|e| io::Error::other(format!("failed to decode netlink message: {e}")))?;

            match &message.payload {
                NetlinkPayload::Done(_) => return Ok(addresses),
                NetlinkPayload::Error(err) => {
                    return Err(io::Error::other(format!("netlink error: {err:?}")));
                }
                NetlinkPayload::InnerMessage(RtnlMessage::NewAddress(msg)) => {
                    if msg.header.index == index && msg.header.family == libc::AF_INET6 as u8 {
                        if let Some(raw) = to_raw(msg) {
                            addresses.push(raw);
                        }
                    }
                }
                _ => {}
            }

            let length = message.header.length as usize;
            if length == 0 {
                break;
            }
            offset += length;
        }
    }
}
