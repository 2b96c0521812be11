// src/services/verifier.rs
//! Signature verification service for the registry.
//!
//! Decides whether a set of signatures authorizes a state change: every
//! required signer identity must have produced a valid signature with one of
//! the verification methods listed in its document's `authentication`
//! relationship.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::errors::{AuthError, RegistryError};
use crate::models::did::{did_of_url, IdentityDocument};
use crate::models::verification_method::{
    find_verification_method, SignInfo, VerificationMaterial, VerificationMethod, JSON_WEB_KEY_2020,
};
use crate::storage::IdentityStore;
use crate::utils::crypto::{decode_ed25519_multibase, verify_ed25519, verify_jwk, KeyError};

/// A provided signature that played no part in the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredSignature {
    pub verification_method_id: String,
    pub reason: AuthError,
}

/// Outcome of a successful verification.
///
/// `ignored` lists entries that did not map to any required signer's
/// authentication methods. They never authorize anything and are reported for
/// diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub satisfied: Vec<String>,
    pub ignored: Vec<IgnoredSignature>,
}

/// Signature verifier backed by read access to identity documents.
///
/// The verifier has no side effects: its result is a pure function of the
/// message, the signer set, the signatures and the documents it reads.
pub struct Verifier<'a, S: IdentityStore + ?Sized> {
    documents: &'a S,
}

impl<'a, S: IdentityStore + ?Sized> Verifier<'a, S> {
    pub fn new(documents: &'a S) -> Self {
        Self { documents }
    }

    /// Verifies that every required signer has signed `message`.
    ///
    /// # Arguments
    /// * `message` - Canonical bytes that were signed
    /// * `required_signers` - DIDs that must all approve
    /// * `provided` - `(verification method id, signature)` pairs
    ///
    /// # Errors
    /// - [`RegistryError::DocumentNotFound`] if a required signer has no document
    /// - [`AuthError::InvalidSignature`] if any entry using a required signer's
    ///   authentication method does not verify
    /// - [`AuthError::UnsupportedSignatureType`] if such a method's key type
    ///   cannot be verified
    /// - for an unmet signer: the reason the first unusable entry naming one of
    ///   the signer's own method ids was rejected ([`AuthError::KeyMismatch`]
    ///   or [`AuthError::UnknownVerificationMethod`]), otherwise
    ///   [`AuthError::MissingSignature`]
    pub fn verify_signatures(
        &self,
        message: &[u8],
        required_signers: &[String],
        provided: &[SignInfo],
    ) -> Result<VerificationReport, RegistryError> {
        let mut signers: Vec<IdentityDocument> = Vec::new();
        for signer in required_signers {
            if signers.iter().any(|doc| &doc.id == signer) {
                continue;
            }
            let doc = self
                .documents
                .get_document(signer)?
                .ok_or_else(|| RegistryError::DocumentNotFound(signer.clone()))?;
            signers.push(doc);
        }

        let mut satisfied: BTreeSet<&str> = BTreeSet::new();
        let mut ignored: Vec<IgnoredSignature> = Vec::new();

        for entry in provided {
            let method_id = entry.verification_method_id.as_str();
            let owner = signers.iter().find_map(|doc| {
                find_verification_method(&doc.verification_method, method_id).map(|vm| (doc, vm))
            });

            match owner {
                Some((doc, vm)) if doc.is_authentication_method(method_id) => {
                    if let Err(e) = verify_method(vm, message, &entry.signature) {
                        warn!("signature check failed for {}: {}", method_id, e);
                        return Err(e.into());
                    }
                    debug!("signer {} authorized by {}", doc.id, method_id);
                    satisfied.insert(doc.id.as_str());
                }
                Some((doc, _)) => ignored.push(IgnoredSignature {
                    verification_method_id: method_id.to_string(),
                    reason: AuthError::KeyMismatch {
                        method_id: method_id.to_string(),
                        controller: doc.id.clone(),
                    },
                }),
                None => ignored.push(IgnoredSignature {
                    verification_method_id: method_id.to_string(),
                    reason: self.classify_foreign(method_id)?,
                }),
            }
        }

        for doc in &signers {
            if satisfied.contains(doc.id.as_str()) {
                continue;
            }
            let err = match ignored
                .iter()
                .find(|entry| did_of_url(&entry.verification_method_id) == doc.id)
            {
                Some(own) => own.reason.clone(),
                None => AuthError::MissingSignature { signer: doc.id.clone() },
            };
            warn!("signer {} not satisfied: {}", doc.id, err);
            return Err(err.into());
        }

        Ok(VerificationReport {
            satisfied: signers.iter().map(|doc| doc.id.clone()).collect(),
            ignored,
        })
    }

    /// Verifies `provided` against the signers required by `document`.
    pub fn verify_document_signers(
        &self,
        document: &IdentityDocument,
        message: &[u8],
        provided: &[SignInfo],
    ) -> Result<VerificationReport, RegistryError> {
        self.verify_signatures(message, &document.required_signers(), provided)
    }

    /// Why a method that is not on any required signer's document is unusable.
    fn classify_foreign(&self, method_id: &str) -> Result<AuthError, RegistryError> {
        let did = did_of_url(method_id);
        let known = self
            .documents
            .get_document(did)?
            .is_some_and(|doc| {
                find_verification_method(&doc.verification_method, method_id).is_some()
            });

        Ok(if known {
            AuthError::KeyMismatch {
                method_id: method_id.to_string(),
                controller: did.to_string(),
            }
        } else {
            AuthError::UnknownVerificationMethod {
                method_id: method_id.to_string(),
            }
        })
    }
}

/// Verifies one signature with one verification method.
///
/// # Errors
/// - [`AuthError::InvalidSignature`] if the key does not decode or the
///   signature does not verify
/// - [`AuthError::UnsupportedSignatureType`] for JWK key types without a
///   verifier
pub fn verify_method(
    vm: &VerificationMethod,
    message: &[u8],
    signature: &[u8],
) -> Result<(), AuthError> {
    let invalid = || AuthError::InvalidSignature { method_id: vm.id.clone() };

    match &vm.material {
        VerificationMaterial::Ed25519VerificationKey2020 { public_key_multibase } => {
            let key = decode_ed25519_multibase(public_key_multibase).map_err(|_| invalid())?;
            if verify_ed25519(&key, message, signature) {
                Ok(())
            } else {
                Err(invalid())
            }
        }
        VerificationMaterial::JsonWebKey2020 { public_key_jwk } => {
            match verify_jwk(public_key_jwk, message, signature) {
                Ok(true) => Ok(()),
                Ok(false) => Err(invalid()),
                Err(KeyError::Unsupported { kty, crv }) => Err(AuthError::UnsupportedSignatureType {
                    method_id: vm.id.clone(),
                    method_type: format!("{JSON_WEB_KEY_2020} ({kty}/{crv})"),
                }),
                Err(_) => Err(invalid()),
            }
        }
    }
}
