// # File State Store
//
// File-based implementation of StateStore.
//
// ## File Format
//
// A single IPv6 literal, optionally followed by whitespace:
//
// ```text
// 2001:db8::5
// ```
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to `<name>.tmp`, then is renamed
// - Unreadable or malformed content counts as "no cached address", so the
//   next run simply pushes the current address again

use async_trait::async_trait;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::Error;
use crate::traits::StateStore;

/// Cache file name used inside the work or config directory
pub const CACHE_FILE_NAME: &str = "cache.lastip";

/// File-based store for the last published address
///
/// # Example
///
/// ```rust,no_run
/// use ddns6_core::state::FileStateStore;
/// use ddns6_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ddns6/cache.lastip");
///
///     store.store_address("2001:db8::5".parse()?).await?;
///     assert_eq!(store.last_address().await?, Some("2001:db8::5".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a store backed by `path`; nothing is read until first use
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn last_address(&self) -> Result<Option<Ipv6Addr>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Cache file does not exist: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read cache file {}: {}. Treating as empty.",
                    self.path.display(),
                    e
                );
                return Ok(None);
            }
        };

        let literal = content.trim();
        if literal.is_empty() {
            return Ok(None);
        }

        match literal.parse::<Ipv6Addr>() {
            Ok(address) => Ok(Some(address)),
            Err(_) => {
                tracing::warn!(
                    "Cache file {} holds '{}', which is not an IPv6 address. Treating as empty.",
                    self.path.display(),
                    literal
                );
                Ok(None)
            }
        }
    }

    async fn store_address(&self, address: Ipv6Addr) -> Result<(), Error> {
        super::write_atomic(&self.path, address.to_string().as_bytes(), 0o644).await?;
        tracing::trace!("Cached {} in {}", address, self.path.display());
        Ok(())
    }
}
