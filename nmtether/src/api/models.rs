use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

use crate::types::address::PeerAddress;
use crate::types::capability::Profile;
use crate::types::constants::{modem_type, timeouts};

/// Errors that can occur while setting up a tethered connection.
///
/// Negotiation failures (`AdapterUnavailable` through `NegotiationTimeout`)
/// all end the current session; none of them are retried automatically.
#[derive(Debug, Error)]
pub enum TetherError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// The textual Bluetooth address was malformed.
    #[error("invalid Bluetooth address: {0:?}")]
    InvalidAddress(String),

    /// No default Bluetooth adapter could be found.
    #[error("adapter discovery failed: {0}")]
    AdapterUnavailable(String),

    /// The adapter did not know the requested peer.
    #[error("peer discovery failed: {0}")]
    PeerNotFound(String),

    /// The serial tunnel to the peer could not be opened.
    #[error("tunnel open failed: {0}")]
    TunnelOpenFailed(String),

    /// The peer dropped the link while the negotiation was running.
    #[error("lost connection to the phone")]
    TunnelLost,

    /// The matched modem is neither GSM nor CDMA.
    #[error("unknown modem type")]
    ModemTypeUnknown,

    /// The negotiation did not reach the wizard before the deadline.
    #[error("timed out detecting phone details")]
    NegotiationTimeout,

    /// The user closed the wizard without finishing it.
    #[error("mobile wizard was canceled")]
    WizardCanceled,

    /// A negotiation is already running for this peer.
    #[error("a negotiation is already active")]
    AlreadyActive,

    /// Adding or deleting a connection profile failed.
    #[error("connection store failure: {0}")]
    StoreFailure(String),

    /// The peer offers no service that can be tethered to.
    #[error("peer offers no tethering service")]
    NotEligible,

    /// The controller task is no longer running.
    #[error("tether controller is gone")]
    ControllerGone,
}

impl TetherError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dbus(_) => ErrorKind::Dbus,
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::AdapterUnavailable(_) => ErrorKind::AdapterUnavailable,
            Self::PeerNotFound(_) => ErrorKind::PeerNotFound,
            Self::TunnelOpenFailed(_) => ErrorKind::TunnelOpenFailed,
            Self::TunnelLost => ErrorKind::TunnelLost,
            Self::ModemTypeUnknown => ErrorKind::ModemTypeUnknown,
            Self::NegotiationTimeout => ErrorKind::NegotiationTimeout,
            Self::WizardCanceled => ErrorKind::WizardCanceled,
            Self::AlreadyActive => ErrorKind::AlreadyActive,
            Self::StoreFailure(_) => ErrorKind::StoreFailure,
            Self::NotEligible => ErrorKind::NotEligible,
            Self::ControllerGone => ErrorKind::ControllerGone,
        }
    }
}

/// Copyable counterpart of [`TetherError`], used in published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Dbus,
    InvalidAddress,
    AdapterUnavailable,
    PeerNotFound,
    TunnelOpenFailed,
    TunnelLost,
    ModemTypeUnknown,
    NegotiationTimeout,
    WizardCanceled,
    AlreadyActive,
    StoreFailure,
    NotEligible,
    ControllerGone,
}

/// Timeout configuration for the DUN negotiation.
///
/// # Example
///
/// ```rust
/// use nmtether::TimeoutConfig;
/// use std::time::Duration;
///
/// let config = TimeoutConfig::new()
///     .with_negotiation_timeout(Duration::from_secs(60))
///     .with_connect_timeout(Duration::from_secs(30));
/// assert_eq!(config.negotiation_timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Deadline from session start until the wizard is shown.
    pub negotiation_timeout: Duration,
    /// Bound on the serial tunnel connect call.
    pub connect_timeout: Duration,
}

impl TimeoutConfig {
    /// Creates a configuration with the default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overall negotiation deadline.
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Sets the serial tunnel connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: timeouts::negotiation_timeout(),
            connect_timeout: timeouts::connect_timeout(),
        }
    }
}

/// Cellular technology family of the phone's modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TechnologyFamily {
    Gsm,
    Cdma,
}

impl TechnologyFamily {
    /// Maps a ModemManager `Type` value to a family.
    pub fn from_modem_type(code: u32) -> Option<Self> {
        match code {
            modem_type::GSM => Some(Self::Gsm),
            modem_type::CDMA => Some(Self::Cdma),
            _ => None,
        }
    }

    /// NetworkManager connection type for this family.
    pub fn setting_name(self) -> &'static str {
        match self {
            Self::Gsm => "gsm",
            Self::Cdma => "cdma",
        }
    }
}

impl Display for TechnologyFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gsm => write!(f, "GSM"),
            Self::Cdma => write!(f, "CDMA"),
        }
    }
}

/// Carrier account parameters collected by the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMethod {
    /// Technology family the parameters apply to.
    pub family: TechnologyFamily,
    /// Mobile provider name, e.g. "T-Mobile".
    pub provider_name: String,
    /// Optional plan name, used in the connection name.
    pub plan_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Access point name (GSM only).
    pub gsm_apn: Option<String>,
}

impl AccessMethod {
    /// Creates an access method with only the provider set.
    pub fn new(family: TechnologyFamily, provider_name: impl Into<String>) -> Self {
        Self {
            family,
            provider_name: provider_name.into(),
            plan_name: None,
            username: None,
            password: None,
            gsm_apn: None,
        }
    }

    /// Name given to the resulting connection profile.
    pub fn connection_name(&self) -> String {
        match &self.plan_name {
            Some(plan) => format!("{} {}", self.provider_name, plan),
            None => format!("{} connection", self.provider_name),
        }
    }
}

/// How the wizard was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    Completed(AccessMethod),
    Canceled,
}

/// A connection profile as held by the connection store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConnection {
    /// Store-specific reference, e.g. a NetworkManager settings object path.
    pub path: String,
    /// Connection name (`connection.id`).
    pub id: String,
    /// Peer address from the `bluetooth` section, if any.
    pub bdaddr: Option<PeerAddress>,
    /// Value of `bluetooth.type`, if any.
    pub bluetooth_type: Option<String>,
}

impl StoredConnection {
    /// Whether this record belongs to `peer` and `profile`.
    ///
    /// [`Profile::None`] matches any Bluetooth profile for the peer.
    pub fn matches(&self, peer: &PeerAddress, profile: Profile) -> bool {
        if self.bdaddr.as_ref() != Some(peer) {
            return false;
        }
        match (profile.bluetooth_type(), self.bluetooth_type.as_deref()) {
            (None, _) => true,
            (Some(want), Some(have)) => want == have,
            (Some(_), None) => false,
        }
    }
}

/// Progress of the tunnel negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    DiscoveringAdapter,
    LocatingPeer,
    OpeningTunnel,
    TunnelOpen,
    Closed,
    Failed(ErrorKind),
}

impl TunnelState {
    /// Returns `true` once the negotiator can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }
}

impl Display for TunnelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::DiscoveringAdapter => write!(f, "discovering adapter"),
            Self::LocatingPeer => write!(f, "locating peer"),
            Self::OpeningTunnel => write!(f, "opening tunnel"),
            Self::TunnelOpen => write!(f, "tunnel open"),
            Self::Closed => write!(f, "closed"),
            Self::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Which sub-component a negotiating session is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    Tunnel,
    Modem,
}

/// Phase of a control's negotiation, as published to the UI.
///
/// `Committed` and `Aborted` describe how the last session ended; the
/// session itself is gone by the time they are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    NotStarted,
    Negotiating(NegotiationStage),
    AwaitingWizard(TechnologyFamily),
    Committed,
    Aborted(ErrorKind),
}

impl SessionPhase {
    /// Returns `true` while a session exists.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Negotiating(_) | Self::AwaitingWizard(_))
    }
}

/// State of a tethering control, suitable for driving a toggle widget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlState {
    /// Toggle position.
    pub active: bool,
    /// Whether the toggle accepts input.
    pub sensitive: bool,
    /// Whether a progress indicator should be shown.
    pub busy: bool,
    /// Status line shown next to the toggle.
    pub status: String,
    pub phase: SessionPhase,
}

impl ControlState {
    pub(crate) fn idle(active: bool) -> Self {
        Self {
            active,
            sensitive: true,
            busy: false,
            status: String::new(),
            phase: SessionPhase::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modem_type_mapping() {
        assert_eq!(TechnologyFamily::from_modem_type(1), Some(TechnologyFamily::Gsm));
        assert_eq!(TechnologyFamily::from_modem_type(2), Some(TechnologyFamily::Cdma));
        assert_eq!(TechnologyFamily::from_modem_type(0), None);
        assert_eq!(TechnologyFamily::from_modem_type(3), None);
    }

    #[test]
    fn connection_name_uses_plan_when_present() {
        let mut method = AccessMethod::new(TechnologyFamily::Gsm, "Vodafone");
        assert_eq!(method.connection_name(), "Vodafone connection");

        method.plan_name = Some("Pay as you go".into());
        assert_eq!(method.connection_name(), "Vodafone Pay as you go");
    }

    #[test]
    fn stored_connection_matching() {
        let peer: PeerAddress = "00:1A:7D:DA:71:13".parse().unwrap();
        let other: PeerAddress = "00:1A:7D:DA:71:14".parse().unwrap();
        let stored = StoredConnection {
            path: "/org/freedesktop/NetworkManager/Settings/4".into(),
            id: "Vodafone connection".into(),
            bdaddr: Some(peer),
            bluetooth_type: Some("dun".into()),
        };

        assert!(stored.matches(&peer, Profile::Dun));
        assert!(stored.matches(&peer, Profile::None));
        assert!(!stored.matches(&peer, Profile::Pan));
        assert!(!stored.matches(&other, Profile::Dun));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(TetherError::TunnelLost.kind(), ErrorKind::TunnelLost);
        assert_eq!(
            TetherError::AdapterUnavailable("no adapter".into()).kind(),
            ErrorKind::AdapterUnavailable
        );
        assert_eq!(
            TetherError::NegotiationTimeout.to_string(),
            "timed out detecting phone details"
        );
    }

    #[test]
    fn timeout_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.negotiation_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }
}
