//! SQLite-backed storage for MFA factor records.
//!
//! This crate owns the durable state of an MfaKit installation: the factor
//! table itself plus a small key/value flag table that other components use
//! for persisted one-time probes (e.g. the seed vault's encryption-support
//! cache). Consumers interact only with [`FactorStore`]; SQL never leaks
//! across the crate boundary.
//!
//! SQLite serializes writes, so the store is the natural consistency
//! boundary for concurrent callers.

mod error;
mod factor;
mod store;

pub use error::{StoreError, StoreResult};
pub use factor::Factor;
pub use store::FactorStore;
