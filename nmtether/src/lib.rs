//! Bluetooth tethering setup for NetworkManager.
//!
//! This crate turns a paired Bluetooth phone into a NetworkManager connection
//! profile. Two tethering profiles are supported:
//!
//! - **PAN** (Network Access Point): the phone provides IP connectivity
//!   directly, so enabling it just saves a `bluetooth`/`panu` profile.
//! - **DUN** (Dial-Up Networking): a serial tunnel is opened to the phone,
//!   the modem ModemManager exports for that tunnel is identified as GSM or
//!   CDMA, and a wizard collects the carrier details before a `gsm` or `cdma`
//!   profile is saved.
//!
//! # Example
//!
//! ```no_run
//! use nmtether::{SessionPhase, Tether};
//! use nmtether::backend::Wizard;
//! use std::sync::Arc;
//!
//! # async fn example(wizard: Arc<dyn Wizard>) -> nmtether::Result<()> {
//! let tether = Tether::system(wizard).await?;
//!
//! let services = ["DialupNetworking"];
//! let Some(control) = tether.build_control("00:1A:7D:DA:71:13", &services).await? else {
//!     return Ok(());
//! };
//!
//! control.enable().await?;
//! let state = control.wait_for(|s| !s.phase.is_active()).await?;
//! if state.phase == SessionPhase::Committed {
//!     println!("{}", state.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Negotiation
//!
//! Each [`TetherControl`] is driven by its own task. At most one negotiation
//! runs per control; enabling a control that is already negotiating returns
//! [`TetherError::AlreadyActive`]. A negotiation that has not found the modem
//! within [`TimeoutConfig::negotiation_timeout`] is aborted. Every failure
//! is final: the tunnel is released, the toggle goes back to off and a new
//! `enable()` is required.
//!
//! # Collaborators
//!
//! The negotiation reaches BlueZ, ModemManager and NetworkManager only
//! through the traits in [`backend`]. [`system`] implements them on the system
//! bus; the wizard is always supplied by the caller.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`.

// Internal implementation modules
mod core;
mod dbus;
mod types;
mod util;

// Public API modules
pub mod api;
pub mod system;

pub use api::backend;
pub use api::builders;
pub use api::models;

// Re-exported public API
pub use api::control::TetherControl;
pub use api::models::{
    AccessMethod, ControlState, ErrorKind, NegotiationStage, SessionPhase, StoredConnection,
    TechnologyFamily, TetherError, TimeoutConfig, TunnelState, WizardOutcome,
};
pub use api::tether::Tether;
pub use types::address::PeerAddress;
pub use types::capability::{Capabilities, Profile, classify};

/// A specialized `Result` type for tethering operations.
pub type Result<T> = std::result::Result<T, TetherError>;
