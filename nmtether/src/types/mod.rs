//! Type definitions and constants.
//!
//! This module contains the address codec, the capability classifier and
//! the D-Bus constants used throughout the crate.

pub(crate) mod address;
pub(crate) mod capability;
pub(crate) mod constants;
