//! Lookup, insertion and removal of tethering connection profiles.
//!
//! Wraps a [`ConnectionStore`] and keys records by peer address and profile.
//! Every failure reported by the underlying store is mapped to
//! [`TetherError::StoreFailure`].

use log::{debug, info, warn};
use std::sync::Arc;

use crate::Result;
use crate::api::backend::ConnectionStore;
use crate::api::builders::ConnectionSettings;
use crate::api::models::{StoredConnection, TetherError};
use crate::types::address::PeerAddress;
use crate::types::capability::Profile;

#[derive(Clone)]
pub(crate) struct StoreAdapter {
    store: Arc<dyn ConnectionStore>,
}

impl StoreAdapter {
    pub(crate) fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Finds the first stored record for `peer` with the given profile.
    ///
    /// [`Profile::None`] matches a record of any Bluetooth type.
    pub(crate) async fn find(
        &self,
        peer: &PeerAddress,
        profile: Profile,
    ) -> Result<Option<StoredConnection>> {
        let records = self.store.list().await.map_err(store_failure)?;
        Ok(records.into_iter().find(|r| r.matches(peer, profile)))
    }

    /// Persists a new record.
    pub(crate) async fn insert(&self, settings: ConnectionSettings) -> Result<StoredConnection> {
        let stored = self.store.add(settings).await.map_err(store_failure)?;
        info!("Saved connection '{}' ({})", stored.id, stored.path);
        Ok(stored)
    }

    pub(crate) async fn delete(&self, stored: &StoredConnection) -> Result<()> {
        self.store.delete(stored).await.map_err(store_failure)?;
        debug!("Deleted connection '{}' ({})", stored.id, stored.path);
        Ok(())
    }

    /// Deletes every record belonging to `peer`, of any profile.
    ///
    /// Keeps looking up matches until none remain. Stops at the first failed
    /// delete, or when the store hands back a record already deleted, so a
    /// store that refuses to forget a record cannot make this loop forever.
    ///
    /// Returns the number of records removed.
    pub(crate) async fn purge(&self, peer: &PeerAddress) -> Result<usize> {
        let mut removed: Vec<String> = Vec::new();

        while let Some(stored) = self.find(peer, Profile::None).await? {
            if removed.contains(&stored.path) {
                warn!(
                    "Connection '{}' still listed after delete; giving up",
                    stored.path
                );
                break;
            }

            if let Err(e) = self.delete(&stored).await {
                warn!("Failed to delete connection '{}': {e}", stored.path);
                break;
            }
            removed.push(stored.path);
        }

        Ok(removed.len())
    }
}

fn store_failure(e: TetherError) -> TetherError {
    match e {
        TetherError::StoreFailure(_) => e,
        other => TetherError::StoreFailure(other.to_string()),
    }
}
