//! Public API module.
//!
//! This module contains the high-level user-facing API for the `nmtether` crate.

pub mod backend;
pub mod builders;
pub mod control;
pub mod models;
pub mod tether;
