// # ddns6-ip-iface
//
// Reads the IPv6 addresses configured on one named interface.
//
// ## Mechanisms
//
// | target               | reader            | source                          |
// |----------------------|-------------------|---------------------------------|
// | Linux                | [`NetlinkReader`] | `RTM_GETADDR` dump over rtnetlink |
// | FreeBSD, OpenBSD     | [`IoctlReader`]   | `getifaddrs` + `SIOCGIFALIFETIME_IN6` |
// | macOS, other Unix    | [`IfconfigReader`]| `ifconfig -L <iface>` text      |
//
// [`PlatformReader`] names the one selected for the build target. Every
// reader classifies through `AddressRecord::classify`.

use ddns6_core::INFINITE_LIFETIME;
use std::time::Duration;

#[cfg(unix)]
pub mod ifconfig;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
pub mod bsd;

#[cfg(unix)]
pub use ifconfig::{IfconfigReader, parse_ifconfig_output};
#[cfg(target_os = "linux")]
pub use linux::NetlinkReader;
#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
pub use bsd::IoctlReader;

/// Reader used on this target
#[cfg(target_os = "linux")]
pub type PlatformReader = NetlinkReader;

/// Reader used on this target
#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
pub type PlatformReader = IoctlReader;

/// Reader used on this target
#[cfg(all(
    unix,
    not(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd"))
))]
pub type PlatformReader = IfconfigReader;

/// Reader used on this target
#[cfg(not(unix))]
pub type PlatformReader = unsupported::UnsupportedReader;

/// Kernel lifetime value meaning "never expires"
pub const KERNEL_INFINITE: u32 = u32::MAX;

/// Convert a kernel lifetime in seconds, mapping [`KERNEL_INFINITE`] to the
/// ten-year sentinel
pub fn kernel_lifetime(raw: u32) -> Duration {
    if raw == KERNEL_INFINITE {
        INFINITE_LIFETIME
    } else {
        Duration::from_secs(u64::from(raw))
    }
}

#[cfg(not(unix))]
mod unsupported {
    use async_trait::async_trait;
    use ddns6_core::AddressRecord;
    use ddns6_core::error::DiscoveryError;
    use ddns6_core::traits::InterfaceAddressSource;

    /// Placeholder for targets without an interface reader
    #[derive(Debug, Default, Clone)]
    pub struct UnsupportedReader;

    impl UnsupportedReader {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl InterfaceAddressSource for UnsupportedReader {
        async fn list_addresses(
            &self,
            interface: &str,
        ) -> Result<Vec<AddressRecord>, DiscoveryError> {
            Err(DiscoveryError::Other(format!(
                "reading interface {interface} is not supported on this platform"
            )))
        }

        fn mechanism(&self) -> &'static str {
            "unsupported"
        }
    }
}
