use log::{debug, info};
use std::sync::Arc;

use crate::Result;
use crate::api::backend::{Backend, Wizard};
use crate::api::control::TetherControl;
use crate::api::models::{StoredConnection, TimeoutConfig};
use crate::core::store::StoreAdapter;
use crate::system;
use crate::try_log;
use crate::types::address::PeerAddress;
use crate::types::capability::{Profile, classify};

/// Entry point for Bluetooth tethering.
///
/// A `Tether` decides which peers can be tethered to, hands out one
/// [`TetherControl`] per eligible peer and cleans up after peers that are
/// forgotten.
///
/// # Example
///
/// ```no_run
/// use nmtether::{Tether, TimeoutConfig};
/// use nmtether::backend::Wizard;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example(wizard: Arc<dyn Wizard>) -> nmtether::Result<()> {
/// let config = TimeoutConfig::new().with_negotiation_timeout(Duration::from_secs(60));
/// let tether = Tether::system(wizard).await?.with_timeout_config(config);
///
/// let services = ["NAP", "DialupNetworking"];
/// if tether.has_eligible_peer("00:1A:7D:DA:71:13", &services) {
///     let control = tether.build_control("00:1A:7D:DA:71:13", &services).await?;
///     assert!(control.is_some());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Tether {
    backend: Backend,
    config: TimeoutConfig,
}

impl Tether {
    /// Creates a `Tether` over the given services, with default timeouts.
    pub fn new(backend: Backend) -> Self {
        Self::with_config(backend, TimeoutConfig::default())
    }

    pub fn with_config(backend: Backend, config: TimeoutConfig) -> Self {
        Self { backend, config }
    }

    /// Creates a `Tether` backed by BlueZ, ModemManager and NetworkManager
    /// on the system bus.
    pub async fn system(wizard: Arc<dyn Wizard>) -> Result<Self> {
        let backend = system::system_backend(wizard).await?;
        Ok(Self::new(backend))
    }

    /// Replaces the timeout configuration used by new controls.
    pub fn with_timeout_config(mut self, config: TimeoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout_config(&self) -> TimeoutConfig {
        self.config
    }

    /// Returns `true` if a peer with these services can be tethered to.
    ///
    /// A malformed address is never eligible.
    pub fn has_eligible_peer<I, S>(&self, address: &str, services: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Err(e) = PeerAddress::parse(address) {
            debug!("{e}");
            return false;
        }
        classify(services).is_eligible()
    }

    /// Builds the control for a peer.
    ///
    /// Returns `Ok(None)` if the peer offers nothing to tether to. The
    /// control starts out on if a matching connection is already saved.
    pub async fn build_control<I, S>(
        &self,
        address: &str,
        services: I,
    ) -> Result<Option<TetherControl>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peer = PeerAddress::parse(address)?;
        let profile = classify(services);
        if !profile.is_eligible() {
            debug!("{peer} offers no tethering service");
            return Ok(None);
        }

        let existing = self.existing_connection(&peer, profile).await;
        if let Some(stored) = &existing {
            debug!("{peer} already has connection '{}'", stored.id);
        }

        Ok(Some(TetherControl::spawn(
            peer,
            profile,
            self.backend.clone(),
            self.config,
            existing.is_some(),
        )))
    }

    /// Deletes every saved connection for a peer that was removed.
    ///
    /// Returns the number of connections deleted.
    pub async fn peer_removed(&self, address: &str) -> Result<usize> {
        let peer = PeerAddress::parse(address)?;
        let removed = StoreAdapter::new(Arc::clone(&self.backend.store))
            .purge(&peer)
            .await?;
        if removed > 0 {
            info!("Removed {removed} connection(s) for {peer}");
        }
        Ok(removed)
    }

    async fn existing_connection(
        &self,
        peer: &PeerAddress,
        profile: Profile,
    ) -> Option<StoredConnection> {
        let store = StoreAdapter::new(Arc::clone(&self.backend.store));
        try_log!(
            store.find(peer, profile).await,
            "Failed to look up saved connection"
        )
    }
}
