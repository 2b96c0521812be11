// src/services/mod.rs
//! Registry services: signature verification, version-chain management,
//! chain repair and the client-facing query layer.

pub mod chain_repair;
pub mod query;
pub mod resource_manager;
pub mod verifier;
