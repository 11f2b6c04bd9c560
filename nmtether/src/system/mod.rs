//! Collaborators backed by the system bus.
//!
//! - [`BluezAdapters`]: adapter discovery and serial tunnels via BlueZ
//! - [`ModemManagerRegistry`]: modem discovery via ModemManager
//! - [`NmSettingsStore`]: connection profiles via NetworkManager Settings
//!
//! The wizard has no system implementation; the caller supplies one.

use log::debug;
use std::sync::Arc;
use zbus::Connection;

use crate::Result;
use crate::api::backend::{Backend, Wizard};

mod bluez;
mod modem_manager;
mod settings;

pub use bluez::BluezAdapters;
pub use modem_manager::ModemManagerRegistry;
pub use settings::NmSettingsStore;

/// Builds a [`Backend`] over a new system bus connection.
pub async fn system_backend(wizard: Arc<dyn Wizard>) -> Result<Backend> {
    let conn = Connection::system().await?;
    debug!("Connected to the system bus");
    Ok(backend_on(conn, wizard))
}

/// Builds a [`Backend`] over an existing bus connection.
pub fn backend_on(conn: Connection, wizard: Arc<dyn Wizard>) -> Backend {
    Backend {
        adapters: Arc::new(BluezAdapters::new(conn.clone())),
        modems: Arc::new(ModemManagerRegistry::new(conn.clone())),
        store: Arc::new(NmSettingsStore::new(conn)),
        wizard,
    }
}
