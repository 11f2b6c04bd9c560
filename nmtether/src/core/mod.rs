//! Core negotiation logic.
//!
//! This module contains the internal implementation of a tethering
//! negotiation: the tunnel negotiator, the modem correlator, the session
//! controller that drives both, and the connection store adapter.

pub(crate) mod deadline;
pub(crate) mod modem;
pub(crate) mod session;
pub(crate) mod store;
pub(crate) mod tunnel;

/// Callback through which a child task reports to its owner.
pub(crate) type Notify<E> = Box<dyn Fn(E) + Send + Sync>;
