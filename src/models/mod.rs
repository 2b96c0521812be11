// src/models/mod.rs
//! Data structures shared by the registry services.

pub mod did;
pub mod resource;
pub mod verification_method;
