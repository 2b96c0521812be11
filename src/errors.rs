// src/errors.rs
//! Error taxonomy for the resource registry.
//!
//! Every failure surfaced by the verifier, the version-chain manager and the
//! query layer is a typed [`RegistryError`]. The finer grained enums are kept
//! separate so callers can match on authorization or validation failures
//! without caring about storage details.

use thiserror::Error;
use uuid::Uuid;

use crate::models::resource::FamilyKey;

/// Malformed or missing input, detected before any state is read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("at least one signature is required")]
    EmptySignatures,

    #[error("{0}: resource id must be a UUID")]
    InvalidResourceId(String),

    #[error("collection {collection_id} does not match owner document {document_id}")]
    CollectionMismatch {
        collection_id: String,
        document_id: String,
    },

    #[error("verification method {id}: {reason}")]
    InvalidVerificationMethod { id: String, reason: String },

    #[error("resource data is {size} bytes, limit is {limit}")]
    ResourceTooLarge { size: usize, limit: usize },
}

/// Signature and signer-set failures raised by the verifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("signer: {signer}: signature is required but not found")]
    MissingSignature { signer: String },

    #[error("verification method {method_id}: invalid signature")]
    InvalidSignature { method_id: String },

    #[error("verification method {method_id}: not found on any required signer")]
    UnknownVerificationMethod { method_id: String },

    #[error(
        "verification method {method_id} belongs to {controller}, which is not an authorized signer"
    )]
    KeyMismatch { method_id: String, controller: String },

    #[error("verification method {method_id}: signature type {method_type} is not supported")]
    UnsupportedSignatureType {
        method_id: String,
        method_type: String,
    },
}

/// Failures of the host key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),

    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no transaction is open")]
    NoTransaction,

    #[error("a transaction is already open")]
    TransactionOpen,
}

/// Coarse classification of a [`RegistryError`], mirroring how callers report
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Internal,
}

/// Top-level error returned by every registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Authorization(#[from] AuthError),

    #[error("{0}: resource exists")]
    ResourceExists(Uuid),

    #[error("{0}: not found")]
    DocumentNotFound(String),

    #[error("collection {0}: not found")]
    CollectionNotFound(String),

    #[error("resource {collection_id}:{id}: not found")]
    ResourceNotFound { collection_id: String, id: Uuid },

    #[error("version chain of {family} is broken at {at}")]
    BrokenChain { family: FamilyKey, at: Uuid },

    #[error("logical time {now} is earlier than head {head} created at {head_created}")]
    ClockRegression {
        now: String,
        head: Uuid,
        head_created: String,
    },

    #[error(transparent)]
    Internal(#[from] StoreError),
}

impl RegistryError {
    /// Returns the error class this failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::Authorization(_) => ErrorKind::Authorization,
            RegistryError::ResourceExists(_) => ErrorKind::Conflict,
            RegistryError::DocumentNotFound(_)
            | RegistryError::CollectionNotFound(_)
            | RegistryError::ResourceNotFound { .. } => ErrorKind::NotFound,
            RegistryError::BrokenChain { .. }
            | RegistryError::ClockRegression { .. }
            | RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Fatal failures of the chain repair migration.
///
/// Per-family write failures are not errors; they are collected into the
/// repair report so the remaining families still get repaired.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("scanning resources: {0}")]
    Scan(#[source] StoreError),

    #[error("repair page size must be at least 1")]
    InvalidPageSize,
}

/// Invariant violations found while validating a genesis state.
#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("duplicated id for resource {0}")]
    DuplicateResource(Uuid),

    #[error("duplicated identity document {0}")]
    DuplicateDocument(String),

    #[error("resource {id}: checksum does not match data")]
    ChecksumMismatch { id: Uuid },

    #[error("resource {id}: collection {collection_id} has no identity document")]
    OrphanResource { id: Uuid, collection_id: String },

    #[error("identity document {id}: {source}")]
    InvalidDocument {
        id: String,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
