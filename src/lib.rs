// src/lib.rs

//! # Resource Registry
//!
//! Append-only registry of versioned resources (schemas, credential
//! definitions, any binary artifact) anchored to DID documents.
//!
//! ## Architecture Overview
//! 1. **Models**: identity documents, verification methods, resources
//! 2. **Services**: signature verification, version-chain manager, chain
//!    repair migration, argument-checked queries
//! 3. **Storage**: host store traits and an in-memory implementation
//! 4. **Utils**: hashing, key decoding, canonical serialization
//!
//! The library is synchronous and never initialises a logger; the host (or the
//! `resource-registry` binary) does.

pub mod config;
pub mod errors;
pub mod genesis;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use config::Settings;
pub use errors::{ErrorKind, RegistryError};
pub use services::query::Registry;
pub use services::resource_manager::ResourceManager;
