//! FHIR-aligned patient wire model.
//!
//! The transfer core only reads and rewrites a patient's identifier list: it looks up an
//! existing pseudonym, extracts the bloom-filter digest, and swaps the digest for the resolved
//! pseudonym. Every other field (names, birth date, meta, extensions) belongs to the repository
//! and is carried through untouched in `extra`.
//!
//! Notes:
//! - The record is mutated in memory and persisted by the repository client
//! - A record should hold at most one identifier per pseudonym naming system

use crate::identifier::Identifier;
use crate::{expect_resource_type, parse_json, FhirError, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const RESOURCE_TYPE: &str = "Patient";

/// Patient resource, as exchanged with the clinical-data repository.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Patient {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    /// Create an empty patient with the given logical id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: RESOURCE_TYPE.to_string(),
            id: Some(id.into()),
            identifier: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a patient resource from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the JSON does not match the wire model or the
    /// `resourceType` is not `Patient`.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let patient: Patient = parse_json(json_text, RESOURCE_TYPE)?;
        expect_resource_type(&patient.resource_type, RESOURCE_TYPE)?;
        Ok(patient)
    }

    /// Render this patient as JSON text.
    pub fn render(&self) -> FhirResult<String> {
        serde_json::to_string(self)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }

    /// Returns the first identifier in `system` that carries a non-empty value.
    pub fn identifier_value(&self, system: &str) -> Option<&str> {
        self.identifier
            .iter()
            .filter(|i| i.has_system(system))
            .find_map(Identifier::non_empty_value)
    }

    /// Removes every identifier in `system`, returning how many were removed.
    pub fn remove_identifiers(&mut self, system: &str) -> usize {
        let before = self.identifier.len();
        self.identifier.retain(|i| !i.has_system(system));
        before - self.identifier.len()
    }

    /// Replaces all identifiers in `identifier.system` with `identifier`.
    ///
    /// Keeps the "one identifier per naming system" invariant when attaching pseudonyms.
    pub fn set_identifier(&mut self, identifier: Identifier) {
        if let Some(system) = identifier.system.clone() {
            self.remove_identifiers(&system);
        }
        self.identifier.push(identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOOM: &str = "http://example.org/sid/bloom-filter";
    const PSN: &str = "http://example.org/sid/dic-pseudonym";

    #[test]
    fn parses_patient_and_preserves_other_fields() {
        let input = r#"{
            "resourceType": "Patient",
            "id": "42",
            "identifier": [{"system": "http://example.org/sid/bloom-filter", "value": "BF123"}],
            "birthDate": "1992-03-20",
            "name": [{"family": "Williams"}]
        }"#;

        let patient = Patient::parse(input).expect("parse patient");
        assert_eq!(patient.id.as_deref(), Some("42"));
        assert_eq!(patient.identifier_value(BLOOM), Some("BF123"));

        let rendered = patient.render().expect("render patient");
        assert!(rendered.contains(r#""birthDate":"1992-03-20""#));
        assert!(rendered.contains(r#""family":"Williams""#));
    }

    #[test]
    fn rejects_invalid_resource_type() {
        let err = Patient::parse(r#"{"resourceType":"Observation","id":"1"}"#)
            .expect_err("should reject resourceType");
        match err {
            FhirError::InvalidInput(msg) => {
                assert!(msg.contains("Patient"));
                assert!(msg.contains("Observation"));
            }
            other => panic!("expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn reports_path_of_wrong_types() {
        let err = Patient::parse(r#"{"resourceType":"Patient","identifier":"nope"}"#)
            .expect_err("should reject identifier string");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("identifier")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn set_identifier_keeps_one_per_system() {
        let mut patient = Patient::new("1");
        patient.identifier.push(Identifier::new(PSN, "old"));
        patient.identifier.push(Identifier::new(BLOOM, "BF1"));

        patient.set_identifier(Identifier::new(PSN, "new"));

        let values: Vec<_> = patient
            .identifier
            .iter()
            .filter(|i| i.has_system(PSN))
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(patient.identifier_value(PSN), Some("new"));
        assert_eq!(patient.identifier_value(BLOOM), Some("BF1"));
    }

    #[test]
    fn identifier_value_skips_empty_values() {
        let mut patient = Patient::new("1");
        patient.identifier.push(Identifier::new(BLOOM, ""));
        patient.identifier.push(Identifier::new(BLOOM, "BF2"));
        assert_eq!(patient.identifier_value(BLOOM), Some("BF2"));
        assert_eq!(patient.remove_identifiers(BLOOM), 2);
        assert!(patient.identifier.is_empty());
    }
}
