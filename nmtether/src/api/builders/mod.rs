//! Connection builders for Bluetooth tethering profiles.
//!
//! This module provides functions to construct NetworkManager connection settings
//! dictionaries for PAN and DUN connections. These settings are handed to the
//! [`ConnectionStore`](crate::backend::ConnectionStore) when a control is enabled.
//!
//! Most users should go through [`TetherControl`](crate::TetherControl) instead
//! of calling these builders directly.

use std::collections::HashMap;
use zvariant::Value;

pub mod bluetooth;
pub mod connection_builder;

/// A NetworkManager settings dictionary, keyed by section then property.
pub type ConnectionSettings = HashMap<&'static str, HashMap<&'static str, Value<'static>>>;

pub use bluetooth::{
    build_dun_connection, build_pan_connection, describe_connection, stored_profile,
};
pub use connection_builder::ConnectionBuilder;
