//! `ifconfig -L` text reader
//!
//! Used on macOS and other Unix systems without a better interface. Matches
//! lines such as
//!
//! ```text
//! inet6 2001:db8::1 prefixlen 64 autoconf secured pltime 604654 vltime 2591854
//! inet6 fe80::1%en0 prefixlen 64 secured scopeid 0x4
//! ```
//!
//! Lines without lifetimes (link-local, static addresses on some systems) are
//! not candidates for publishing and are skipped.

use async_trait::async_trait;
use ddns6_core::error::DiscoveryError;
use ddns6_core::traits::InterfaceAddressSource;
use ddns6_core::{AddressRecord, INFINITE_LIFETIME};
use regex::Regex;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

static INET6_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"inet6\s+(\S+)\s+prefixlen\s+\d+.*?pltime\s+(\d+|forever|infinity)\s+vltime\s+(\d+|forever|infinity)",
    )
    .ok()
});

/// Reader that shells out to `ifconfig`
#[derive(Debug, Clone)]
pub struct IfconfigReader {
    program: PathBuf,
}

impl IfconfigReader {
    /// Use `ifconfig` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ifconfig")
    }

    /// Use a specific binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for IfconfigReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterfaceAddressSource for IfconfigReader {
    async fn list_addresses(&self, interface: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
        let output = Command::new(&self.program)
            .arg("-L")
            .arg(interface)
            .output()
            .await
            .map_err(|e| DiscoveryError::from_io(interface, &e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryError::Other(format!(
                "{} -L {} exited with {}: {}",
                self.program.display(),
                interface,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| {
            DiscoveryError::Other(format!("ifconfig output for {interface} is not UTF-8"))
        })?;

        let records = parse_ifconfig_output(&stdout)?;
        if records.is_empty() {
            return Err(DiscoveryError::NoGlobalAddress(interface.to_string()));
        }

        tracing::debug!("ifconfig reported {} address(es) on {}", records.len(), interface);
        Ok(records)
    }

    fn mechanism(&self) -> &'static str {
        "ifconfig"
    }
}

/// Parse `ifconfig` output into classified records
///
/// Link-local, loopback and IPv4-mapped addresses are dropped. Returns an
/// error when the output mentions `inet6` but no line has the expected shape,
/// or when a lifetime does not fit in seconds.
pub fn parse_ifconfig_output(output: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
    let re = INET6_LINE
        .as_ref()
        .ok_or_else(|| DiscoveryError::Other("ifconfig pattern failed to compile".into()))?;

    let mut matched_any = false;
    let mut records = Vec::new();

    for caps in re.captures_iter(output) {
        matched_any = true;

        let literal = caps[1].split('%').next().unwrap_or_default();
        let Ok(address) = literal.parse::<Ipv6Addr>() else {
            tracing::debug!("Skipping unparsable inet6 value '{}'", &caps[1]);
            continue;
        };
        if address.is_unicast_link_local() || address.is_loopback() {
            continue;
        }

        let preferred = parse_lifetime(&caps[2])?;
        let valid = parse_lifetime(&caps[3])?;
        if let Some(record) = AddressRecord::classify(address, preferred, valid) {
            records.push(record);
        }
    }

    if !matched_any && output.contains("inet6") {
        let with_lifetimes = output
            .lines()
            .filter(|l| l.contains("inet6"))
            .any(|l| l.contains("pltime") || l.contains("vltime"));
        if with_lifetimes {
            return Err(DiscoveryError::Other(
                "unrecognized ifconfig output format".into(),
            ));
        }
    }

    Ok(records)
}

fn parse_lifetime(value: &str) -> Result<Duration, DiscoveryError> {
    match value {
        "forever" | "infinity" => Ok(INFINITE_LIFETIME),
        secs => secs
            .parse()
            .map(Duration::from_secs)
            .map_err(|e| DiscoveryError::Other(format!("unparsable lifetime '{secs}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns6_core::{AddressState, Scope};

    const MACOS: &str = "\
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\toptions=6463<RXCSUM,TXCSUM,TSO4,TSO6,CHANNEL_IO,PARTIAL_CSUM,ZEROINVERT_CSUM>
\tether 3c:22:fb:00:00:01
\tinet6 fe80::1c8a:1234:5678:9abc%en0 prefixlen 64 secured scopeid 0x4
\tinet 192.0.2.10 netmask 0xffffff00 broadcast 192.0.2.255
\tinet6 2001:db8:1::10 prefixlen 64 autoconf secured pltime 604654 vltime 2591854
\tinet6 2001:db8:1::beef prefixlen 64 autoconf temporary pltime 85954 vltime 604654
\tinet6 fd00:1::10 prefixlen 64 autoconf secured pltime forever vltime forever
\tinet6 2001:db8:1::dead prefixlen 64 deprecated autoconf temporary pltime 0 vltime 3600
\tnd6 options=201<PERFORMNUD,DAD>
\tstatus: active
";

    #[test]
    fn parses_macos_output() {
        let records = parse_ifconfig_output(MACOS).unwrap();
        let addrs: Vec<String> = records.iter().map(|r| r.address().to_string()).collect();

        assert_eq!(
            addrs,
            vec!["2001:db8:1::10", "2001:db8:1::beef", "fd00:1::10", "2001:db8:1::dead"]
        );
        assert_eq!(records[0].preferred_lifetime(), Duration::from_secs(604_654));
        assert_eq!(records[0].state(), AddressState::PreferredDynamic);
        assert_eq!(records[2].scope(), Scope::UniqueLocal);
        assert_eq!(records[2].preferred_lifetime(), INFINITE_LIFETIME);
        assert_eq!(records[3].state(), AddressState::Deprecated);
        assert!(!records[3].is_candidate());
    }

    #[test]
    fn zone_suffix_is_stripped() {
        let out = "inet6 2001:db8::1%en0 prefixlen 64 pltime infinity vltime infinity\n";
        let records = parse_ifconfig_output(out).unwrap();
        assert_eq!(records[0].address(), "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(records[0].state(), AddressState::PreferredStatic);
    }

    #[test]
    fn link_local_and_loopback_only_yields_nothing() {
        let out = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet6 ::1 prefixlen 128 pltime forever vltime forever
\tinet6 fe80::1%lo0 prefixlen 64 pltime forever vltime forever
";
        assert!(parse_ifconfig_output(out).unwrap().is_empty());
    }

    #[test]
    fn ipv4_mapped_is_dropped() {
        let out = "inet6 ::ffff:192.0.2.1 prefixlen 96 pltime 100 vltime 100\n";
        assert!(parse_ifconfig_output(out).unwrap().is_empty());
    }

    #[test]
    fn lifetimes_in_unknown_layout_are_an_error() {
        let out = "inet6 addr: 2001:db8::1/64 Scope:Global pltime=100 vltime=200\n";
        assert!(matches!(
            parse_ifconfig_output(out),
            Err(DiscoveryError::Other(_))
        ));
    }

    #[test]
    fn overflowing_lifetime_is_an_error_not_expired() {
        let out = "inet6 2001:db8::1 prefixlen 64 autoconf pltime 99999999999999999999999 vltime forever\n";
        let err = parse_ifconfig_output(out).unwrap_err();
        assert!(err.to_string().contains("unparsable lifetime"), "{err}");
    }

    #[test]
    fn no_inet6_is_empty_not_error() {
        let out = "en1: flags=8863<UP> mtu 1500\n\tinet 192.0.2.1 netmask 0xffffff00\n";
        assert!(parse_ifconfig_output(out).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_command_is_other() {
        let reader = IfconfigReader::with_program("false");
        let err = reader.list_addresses("en0").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Other(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_other() {
        let reader = IfconfigReader::with_program("/nonexistent/ifconfig");
        let err = reader.list_addresses("en0").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Other(_)));
    }
}
