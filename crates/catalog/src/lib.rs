//! Signal catalog and derivation for shift-bridge.
//!
//! A [`Catalog`] is loaded once from YAML and validated up front; [`derive_all`]
//! then turns each telemetry snapshot into a [`SignalValues`] map.

pub mod catalog;
pub mod derive;
pub mod error;
pub mod fuzzy;

pub use catalog::{Case, Catalog, Derivation, Predicate, SignalDef, SignalType, DEFAULT_FALLBACK_PREFIX};
pub use derive::{derive_all, derive_signal, SignalValues};
pub use error::{CatalogError, DeriveError, ReferenceError, Result};
