//! Interfaces to the services a tethering negotiation depends on.
//!
//! The negotiation never talks to the system bus directly. Instead it is
//! handed a [`Backend`] holding one implementation of each trait below. The
//! [`system`](crate::system) module provides implementations backed by BlueZ,
//! ModemManager and NetworkManager; tests provide in-memory ones.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

use crate::api::builders::ConnectionSettings;
use crate::api::models::{StoredConnection, TechnologyFamily, WizardOutcome};
use crate::types::address::PeerAddress;
use crate::Result;

/// Entry point to the local Bluetooth stack.
#[async_trait]
pub trait AdapterRegistry: Send + Sync {
    /// Resolves the system's default Bluetooth adapter.
    async fn default_adapter(&self) -> Result<Box<dyn Adapter>>;
}

/// A local Bluetooth adapter.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Resolves a remote device known to this adapter.
    async fn find_peer(&self, address: &PeerAddress) -> Result<Arc<dyn SerialPeer>>;
}

/// A remote device that can carry a serial tunnel.
#[async_trait]
pub trait SerialPeer: Send + Sync {
    /// Opens a serial connection with the given role.
    ///
    /// Returns the name of the local tunnel interface, e.g. `/dev/rfcomm0`.
    async fn connect(&self, role: &str, timeout: Duration) -> Result<String>;

    /// Closes a tunnel previously returned by [`connect`](Self::connect).
    async fn disconnect(&self, interface: &str) -> Result<()>;

    /// Stream of property changes reported for this device.
    async fn property_changes(&self) -> Result<BoxStream<'static, PropertyChange>>;
}

/// Value carried by a [`PropertyChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    Other,
}

/// A single `PropertyChanged` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub name: String,
    pub value: PropertyValue,
}

impl PropertyChange {
    /// Convenience constructor for boolean properties.
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Bool(value),
        }
    }
}

/// Modem hot-plug notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    Added(String),
    Removed(String),
}

/// The modem properties relevant to correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemProperties {
    /// Backing device, e.g. `rfcomm0`.
    pub device: Option<String>,
    /// Raw modem type (1 = GSM, 2 = CDMA).
    pub modem_type: Option<u32>,
}

/// Registry of modems known to the system.
#[async_trait]
pub trait ModemRegistry: Send + Sync {
    /// Stream of modems being added or removed.
    async fn device_events(&self) -> Result<BoxStream<'static, ModemEvent>>;

    /// Paths of the modems currently present.
    async fn enumerate(&self) -> Result<Vec<String>>;

    /// Fetches the properties of one modem.
    async fn properties(&self, path: &str) -> Result<ModemProperties>;
}

/// Persistent store of connection profiles.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn add(&self, settings: ConnectionSettings) -> Result<StoredConnection>;

    async fn list(&self) -> Result<Vec<StoredConnection>>;

    async fn delete(&self, stored: &StoredConnection) -> Result<()>;
}

/// Interactive collection of carrier account parameters.
#[async_trait]
pub trait Wizard: Send + Sync {
    /// Shows the wizard for the given family and waits until it is closed.
    async fn present(&self, family: TechnologyFamily) -> WizardOutcome;
}

/// The set of services used by a tethering control.
#[derive(Clone)]
pub struct Backend {
    pub adapters: Arc<dyn AdapterRegistry>,
    pub modems: Arc<dyn ModemRegistry>,
    pub store: Arc<dyn ConnectionStore>,
    pub wizard: Arc<dyn Wizard>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
