// src/models/did.rs
//! Identity document data model.
//!
//! The registry consumes identity documents owned by an external DID module.
//! Only the parts needed to authorize resource creation are modelled: the
//! verification methods, the `authentication` relationship and the
//! `resources` backlink list that the registry appends to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::models::verification_method::{find_verification_method, VerificationMethod};

/// An identity (DID) document.
///
/// # Fields
/// - `id`: The DID, `did:<method>:<namespace>:<collection id>`
/// - `controller`: DIDs allowed to control this document
/// - `verification_method`: Public keys scoped to this document
/// - `authentication`: Ids of the methods that may approve mutations
/// - `resources`: Ids of resources anchored to this document
///
/// # Security Considerations
/// - `authentication` entries must reference methods declared on the document;
///   dangling references are ignored when computing required signers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub id: String,

    #[serde(default)]
    pub controller: Vec<String>,

    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,

    #[serde(default)]
    pub authentication: Vec<String>,

    #[serde(default)]
    pub resources: Vec<Uuid>,
}

impl IdentityDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controller: Vec::new(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Adds a verification method and, when `authentication` is set, lists it
    /// in the authentication relationship.
    pub fn with_method(mut self, method: VerificationMethod, authentication: bool) -> Self {
        if authentication {
            self.authentication.push(method.id.clone());
        }
        self.verification_method.push(method);
        self
    }

    /// Methods of this document usable for authentication.
    pub fn authentication_methods(&self) -> impl Iterator<Item = &VerificationMethod> + '_ {
        self.authentication
            .iter()
            .filter_map(|id| find_verification_method(&self.verification_method, id))
    }

    pub fn is_authentication_method(&self, method_id: &str) -> bool {
        self.authentication.iter().any(|id| id == method_id)
    }

    /// The identities whose signatures are required to mutate this document
    /// or anything anchored to it.
    ///
    /// These are the controllers of the authentication methods. A document
    /// with no resolvable authentication method requires its own signature,
    /// which it cannot produce, so such documents are effectively frozen.
    pub fn required_signers(&self) -> Vec<String> {
        let mut signers: Vec<String> = Vec::new();
        for vm in self.authentication_methods() {
            if !signers.contains(&vm.controller) {
                signers.push(vm.controller.clone());
            }
        }
        if signers.is_empty() {
            signers.push(self.id.clone());
        }
        signers
    }

    /// Records a newly anchored resource.
    pub fn add_resource(&mut self, id: Uuid) {
        if !self.resources.contains(&id) {
            self.resources.push(id);
        }
    }

    /// Checks the document's methods and that its id is a DID.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if split_did(&self.id).is_none() {
            return Err(ValidationError::InvalidVerificationMethod {
                id: self.id.clone(),
                reason: "document id is not a DID".to_string(),
            });
        }
        for vm in &self.verification_method {
            vm.validate()?;
        }
        let mut seen: Vec<&str> = Vec::new();
        for vm in &self.verification_method {
            if seen.contains(&vm.id.as_str()) {
                return Err(ValidationError::InvalidVerificationMethod {
                    id: vm.id.clone(),
                    reason: "there are verification method duplicates".to_string(),
                });
            }
            seen.push(&vm.id);
        }
        Ok(())
    }
}

/// Builds `did:<method>:<namespace>:<id>`.
pub fn join_did(method: &str, namespace: &str, unique_id: &str) -> String {
    format!("did:{method}:{namespace}:{unique_id}")
}

/// Splits a DID into method, namespace (possibly empty) and unique id.
///
/// Returns `None` if `did` is not of the form `did:<method>[:<namespace>]:<id>`.
pub fn split_did(did: &str) -> Option<(&str, &str, &str)> {
    let rest = did.strip_prefix("did:")?;
    let (method, rest) = rest.split_once(':')?;
    if method.is_empty() || rest.is_empty() {
        return None;
    }
    match rest.rsplit_once(':') {
        Some((namespace, unique_id)) if !unique_id.is_empty() => {
            Some((method, namespace, unique_id))
        }
        Some(_) => None,
        None => Some((method, "", rest)),
    }
}

/// The DID part of a DID URL, i.e. everything before `#`, `?` or `/`.
pub fn did_of_url(did_url: &str) -> &str {
    let end = did_url.find(['#', '?', '/']).unwrap_or(did_url.len());
    &did_url[..end]
}
