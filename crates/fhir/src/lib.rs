//! FHIR wire/boundary support for cross-site data transfer.
//!
//! This crate provides **wire models** and **parse/render helpers** for the FHIR resources the
//! transfer core handles:
//! - `Bundle` payloads exchanged between sites
//! - `Patient` records carrying bloom-filter and pseudonym identifiers
//! - `OperationOutcome` issues returned by a repository on validation failure
//! - `StructureDefinition` profiles (differential and snapshot element lists)
//!
//! This crate focuses on:
//! - serialisation/deserialisation (JSON on the wire, YAML accepted for profiles)
//! - canonical rendering, so serialized bundles are byte-stable
//! - small typed accessors over the parts of each resource the core touches
//!
//! Resources keep any fields they do not model in a flattened JSON map so that a
//! read-modify-write cycle never drops data owned by the repository.

pub mod bundle;
pub mod identifier;
pub mod operation_outcome;
pub mod patient;
pub mod structure_definition;

pub use bundle::{Bundle, BundleEntry};
pub use identifier::{CodeableConcept, Coding, Identifier};
pub use operation_outcome::{IssueSeverity, OperationOutcome, OperationOutcomeIssue};
pub use patient::Patient;
pub use structure_definition::{
    Binding, BindingStrength, ElementDefinition, ElementList, MaxCardinality,
    StructureDefinition, TypeRef,
};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialize JSON text into `T`, reporting the failing field path on mismatch.
pub(crate) fn parse_json<T>(text: &str, what: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let value = serde_path_to_error::deserialize::<_, T>(&mut deserializer)
        .map_err(|err| schema_mismatch(what, err.path().to_string(), err.into_inner()))?;
    deserializer.end()?;
    Ok(value)
}

/// Deserialize YAML text into `T`, reporting the failing field path on mismatch.
pub(crate) fn parse_yaml<T>(text: &str, what: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let deserializer = serde_yaml::Deserializer::from_str(text);
    serde_path_to_error::deserialize::<_, T>(deserializer)
        .map_err(|err| schema_mismatch(what, err.path().to_string(), err.into_inner()))
}

fn schema_mismatch(what: &str, path: String, source: impl std::fmt::Display) -> FhirError {
    let path = if path.is_empty() || path == "." {
        "<root>".to_string()
    } else {
        path
    };
    FhirError::Translation(format!("{what} schema mismatch at {path}: {source}"))
}

/// Check the `resourceType` discriminator of a parsed resource.
pub(crate) fn expect_resource_type(actual: &str, expected: &str) -> FhirResult<()> {
    if actual != expected {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{expected}', got '{actual}'"
        )));
    }
    Ok(())
}
