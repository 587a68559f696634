//! Storage collaborators: the encrypted local record store and the remote
//! vault store with its advisory re-key lease.
//!
//! Both are traits so the backing stores (on-device database, remote row,
//! in-memory test double) are the caller's decision. The in-memory
//! implementations here back the test suites and small embedders.

use crate::{errors::StoreError, vault::RecoveryVault};
use async_trait::async_trait;
use sanctum_crypto::current_timestamp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Default advisory lease lifetime for a re-key transaction.
pub const LEASE_TTL_SECONDS: u64 = 300;

/// Helper to handle mutex lock with poison recovery
fn lock_map<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// The encrypted local key-value store holding user records.
///
/// Keys are opaque category names; values are serialized encrypted blobs.
/// The key set must be enumerable so the re-key transaction can visit
/// every record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record blob by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a record blob, overwriting any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Enumerate all stored keys.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// An advisory lease on an identity's re-key transaction.
///
/// The fencing token is strictly increasing per store, so a stale holder
/// can never release a lease acquired later by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RekeyLease {
    /// Fencing token
    pub token: u64,
    /// Unix timestamp after which the lease is considered abandoned
    pub expires_at: u64,
}

/// The remote single-record store keyed by identity, plus the advisory
/// lease that serializes concurrent re-key attempts.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Load the persisted vault for an identity.
    async fn load(&self, identity: &str) -> Result<Option<RecoveryVault>, StoreError>;

    /// Persist a vault for an identity, replacing any previous one.
    async fn store(&self, identity: &str, vault: &RecoveryVault) -> Result<(), StoreError>;

    /// Try to acquire the re-key lease for an identity.
    ///
    /// Returns `None` when a live lease is already held.
    async fn acquire_lease(
        &self,
        identity: &str,
        ttl_seconds: u64,
    ) -> Result<Option<RekeyLease>, StoreError>;

    /// Release a lease. A mismatched fencing token is ignored (the lease
    /// was expired and reclaimed by someone else).
    async fn release_lease(&self, identity: &str, lease: &RekeyLease) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// In-memory [`RecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(lock_map(&self.records).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        lock_map(&self.records).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        lock_map(&self.records).remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = lock_map(&self.records).keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory [`VaultStore`] with lease expiry and a fencing counter.
#[derive(Default)]
pub struct MemoryVaultStore {
    vaults: Mutex<HashMap<String, RecoveryVault>>,
    leases: Mutex<HashMap<String, RekeyLease>>,
    fencing_counter: AtomicU64,
}

impl MemoryVaultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn load(&self, identity: &str) -> Result<Option<RecoveryVault>, StoreError> {
        Ok(lock_map(&self.vaults).get(identity).cloned())
    }

    async fn store(&self, identity: &str, vault: &RecoveryVault) -> Result<(), StoreError> {
        lock_map(&self.vaults).insert(identity.to_string(), vault.clone());
        Ok(())
    }

    async fn acquire_lease(
        &self,
        identity: &str,
        ttl_seconds: u64,
    ) -> Result<Option<RekeyLease>, StoreError> {
        let now = current_timestamp();
        let mut leases = lock_map(&self.leases);

        if let Some(existing) = leases.get(identity) {
            if existing.expires_at > now {
                return Ok(None);
            }
            tracing::warn!(identity, "Reclaiming expired re-key lease");
        }

        let lease = RekeyLease {
            token: self.fencing_counter.fetch_add(1, Ordering::SeqCst) + 1,
            expires_at: now + ttl_seconds,
        };
        leases.insert(identity.to_string(), lease);
        Ok(Some(lease))
    }

    async fn release_lease(&self, identity: &str, lease: &RekeyLease) -> Result<(), StoreError> {
        let mut leases = lock_map(&self.leases);
        if leases.get(identity).map(|l| l.token) == Some(lease.token) {
            leases.remove(identity);
        }
        Ok(())
    }
}
