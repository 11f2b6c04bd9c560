//! Core connection builder for NetworkManager settings.
//!
//! The `ConnectionBuilder` fills in the sections every profile needs
//! (`connection`, `ipv4`) and lets the Bluetooth builders add their own
//! type-specific sections on top.
//!
//! # Example
//!
//! ```rust
//! use nmtether::builders::ConnectionBuilder;
//!
//! let settings = ConnectionBuilder::new("bluetooth", "C8:1F:E8:F0:51:57 PANU")
//!     .autoconnect(false)
//!     .ipv4_auto()
//!     .build();
//! assert!(settings.contains_key("ipv4"));
//! ```

use std::collections::HashMap;
use uuid::Uuid;
use zvariant::Value;

use super::ConnectionSettings;

/// Core connection settings builder.
pub struct ConnectionBuilder {
    settings: ConnectionSettings,
}

impl ConnectionBuilder {
    /// Creates a new connection builder with the specified type and ID.
    ///
    /// A random UUID is assigned.
    pub fn new(connection_type: &str, id: impl Into<String>) -> Self {
        let mut settings = HashMap::new();
        let mut connection = HashMap::new();

        connection.insert("type", Value::from(connection_type.to_string()));
        connection.insert("id", Value::from(id.into()));
        connection.insert("uuid", Value::from(Uuid::new_v4().to_string()));

        settings.insert("connection", connection);

        Self { settings }
    }

    /// Sets a specific UUID for the connection.
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        if let Some(conn) = self.settings.get_mut("connection") {
            conn.insert("uuid", Value::from(uuid.to_string()));
        }
        self
    }

    /// Enables or disables automatic connection on availability.
    pub fn autoconnect(mut self, enabled: bool) -> Self {
        if let Some(conn) = self.settings.get_mut("connection") {
            conn.insert("autoconnect", Value::from(enabled));
        }
        self
    }

    /// Configures IPv4 to use automatic configuration.
    pub fn ipv4_auto(mut self) -> Self {
        let mut ipv4 = HashMap::new();
        ipv4.insert("method", Value::from("auto"));
        self.settings.insert("ipv4", ipv4);
        self
    }

    /// Adds or replaces a whole settings section.
    pub fn with_section(
        mut self,
        name: &'static str,
        section: HashMap<&'static str, Value<'static>>,
    ) -> Self {
        self.settings.insert(name, section);
        self
    }

    /// Builds the final settings dictionary.
    pub fn build(self) -> ConnectionSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_connection_metadata() {
        let settings = ConnectionBuilder::new("gsm", "Vodafone connection")
            .autoconnect(false)
            .build();
        let conn = settings.get("connection").unwrap();

        assert_eq!(conn.get("type"), Some(&Value::from("gsm")));
        assert_eq!(conn.get("id"), Some(&Value::from("Vodafone connection")));
        assert_eq!(conn.get("autoconnect"), Some(&Value::from(false)));
        assert!(conn.contains_key("uuid"));
    }

    #[test]
    fn explicit_uuid_overrides_random_one() {
        let uuid = Uuid::new_v4();
        let settings = ConnectionBuilder::new("bluetooth", "x").uuid(uuid).build();
        assert_eq!(
            settings["connection"].get("uuid"),
            Some(&Value::from(uuid.to_string()))
        );
    }

    #[test]
    fn ipv4_auto_section() {
        let settings = ConnectionBuilder::new("bluetooth", "x").ipv4_auto().build();
        assert_eq!(settings["ipv4"].get("method"), Some(&Value::from("auto")));
    }
}
