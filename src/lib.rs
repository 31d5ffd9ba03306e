//! Strata: an entity pass compositor with a recording canvas in front of it.
//!
//! The renderer lives in [`strata_core`], recording in [`strata_canvas`] and
//! settings in [`strata_config`]. This crate re-exports all three.

pub use strata_canvas::*;
pub use strata_config::{BackendKind, ConfigError, StrataConfig};
pub use strata_core::*;

pub use strata_canvas;
pub use strata_config;
pub use strata_core;
