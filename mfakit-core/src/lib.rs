//! MFA client engine: registers, stores, refreshes, and generates codes
//! for TOTP factors against a OneLogin-style provider.
//!
//! The entry point is [`MfaClient`]; construct one per configuration and
//! database. Code generation is pure and synchronous through
//! [`TotpGenerator`]; everything that touches the network is async and
//! cancellable through the client handle.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod client;
pub use client::{MfaClient, RefreshOutcome};

mod config;
pub use config::MfaConfig;

mod device;
pub use device::{is_device_rooted, is_device_secure};

mod error;
pub use error::MfaError;

mod totp;
pub use totp::{Clock, TotpGenerator};

mod vault;
pub use vault::{KeyProvider, OsKeychainProvider, SeedVault};

// private modules
mod code;
mod manager;
mod net;
mod web_login;

pub use mfakit_store::{Factor, FactorStore};
