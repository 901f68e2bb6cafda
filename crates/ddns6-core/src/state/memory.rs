// # Memory State Store
//
// In-memory implementation of StateStore. Nothing survives a restart, so the
// first run always pushes the current address. Useful for embedding and tests.

use async_trait::async_trait;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::StateStore;

/// In-memory state store implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<Ipv6Addr>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `address`
    pub fn with_address(address: Ipv6Addr) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(address))),
        }
    }

    /// Forget the cached address
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn last_address(&self) -> Result<Option<Ipv6Addr>, Error> {
        Ok(*self.inner.read().await)
    }

    async fn store_address(&self, address: Ipv6Addr) -> Result<(), Error> {
        *self.inner.write().await = Some(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStateStore::new();
        let clone = store.clone();
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();

        assert_eq!(store.last_address().await.unwrap(), None);
        clone.store_address(addr).await.unwrap();
        assert_eq!(store.last_address().await.unwrap(), Some(addr));

        store.clear().await;
        assert_eq!(clone.last_address().await.unwrap(), None);
    }
}
