//! Patient references, pseudonyms and bloom-filter digests.

use fhir::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pointer to a patient, before or after pseudonymization.
///
/// On the sending side a patient is first known by an absolute reference into the local
/// repository. Once resolved, the reference is replaced by an identifier in the destination
/// pseudonym naming system.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "form", rename_all = "camelCase")]
pub enum PatientReference {
    /// Absolute reference, e.g. `https://dic.example.org/fhir/Patient/42`.
    Absolute { reference: String },
    /// Identifier form, e.g. `{system: dic-pseudonym, value: "PSN-7"}`.
    Identifier { identifier: Identifier },
}

impl PatientReference {
    pub fn absolute(reference: impl Into<String>) -> Self {
        PatientReference::Absolute {
            reference: reference.into(),
        }
    }

    /// Identifier-form reference for a resolved pseudonym.
    pub fn pseudonymized(system: impl Into<String>, pseudonym: &Pseudonym) -> Self {
        PatientReference::Identifier {
            identifier: Identifier::new(system, pseudonym.as_str()),
        }
    }

    /// Returns the absolute reference, if this is the reference form.
    pub fn absolute_reference(&self) -> Option<&str> {
        match self {
            PatientReference::Absolute { reference } => Some(reference),
            PatientReference::Identifier { .. } => None,
        }
    }

    /// Returns the identifier value if this reference is an identifier in `system`.
    pub fn identifier_value(&self, system: &str) -> Option<&str> {
        match self {
            PatientReference::Identifier { identifier } if identifier.has_system(system) => {
                identifier.non_empty_value()
            }
            _ => None,
        }
    }
}

impl fmt::Display for PatientReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientReference::Absolute { reference } => f.write_str(reference),
            PatientReference::Identifier { identifier } => write!(
                f,
                "{}|{}",
                identifier.system.as_deref().unwrap_or(""),
                identifier.value.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Site-scoped pseudonym value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Pseudonym(String);

impl Pseudonym {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque bloom-filter digest taken from a patient's identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BloomFilterDigest(String);

impl BloomFilterDigest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
