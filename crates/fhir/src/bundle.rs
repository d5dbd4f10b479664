//! FHIR `Bundle` wire model.
//!
//! A bundle is the unit of exchange between sites: it is encrypted as a whole, stored as a
//! transaction, and (on validation failure) replaced by the repository's response bundle.
//!
//! Entry resources are kept as raw JSON values. The core never interprets clinical content; it
//! only needs a byte-stable rendering so that literal substitution on the serialized form is
//! unambiguous. `serde_json` object maps are ordered by key, and struct fields render in
//! declaration order, so [`Bundle::to_canonical_bytes`] is deterministic for a given value.

use crate::operation_outcome::OperationOutcome;
use crate::{expect_resource_type, parse_json, FhirError, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const RESOURCE_TYPE: &str = "Bundle";

/// A single bundle entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BundleEntry {
    /// Returns the `resourceType` of the entry's resource, if any.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
    }
}

/// Bundle resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub bundle_type: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    /// Create an empty bundle of the given type (for example `transaction`).
    pub fn new(bundle_type: impl Into<String>) -> Self {
        Self {
            resource_type: RESOURCE_TYPE.to_string(),
            id: None,
            bundle_type: bundle_type.into(),
            entry: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Append an entry carrying `resource`.
    pub fn push_resource(&mut self, full_url: Option<String>, resource: Value) {
        self.entry.push(BundleEntry {
            full_url,
            resource: Some(resource),
            ..BundleEntry::default()
        });
    }

    /// Parse a bundle from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the JSON does not match the wire model or the
    /// `resourceType` is not `Bundle`.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let bundle: Bundle = parse_json(json_text, RESOURCE_TYPE)?;
        expect_resource_type(&bundle.resource_type, RESOURCE_TYPE)?;
        Ok(bundle)
    }

    /// Parse a bundle from UTF-8 JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> FhirResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FhirError::InvalidInput(format!("bundle is not UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Render this bundle as compact canonical JSON text.
    pub fn to_canonical_string(&self) -> FhirResult<String> {
        serde_json::to_string(self)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise bundle: {e}")))
    }

    /// Render this bundle as compact canonical JSON bytes.
    pub fn to_canonical_bytes(&self) -> FhirResult<Vec<u8>> {
        self.to_canonical_string().map(String::into_bytes)
    }

    /// Render this bundle as indented JSON, for humans.
    pub fn render_pretty(&self) -> FhirResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise bundle: {e}")))
    }

    /// Collects the OperationOutcome resources carried by this bundle.
    ///
    /// Outcomes are looked up in entry resources and in `entry.response.outcome`, which is
    /// where transaction responses place per-entry validation results.
    pub fn operation_outcomes(&self) -> Vec<OperationOutcome> {
        self.entry
            .iter()
            .flat_map(|entry| {
                let from_resource = entry
                    .resource
                    .as_ref()
                    .filter(|_| entry.resource_type() == Some("OperationOutcome"));
                let from_response = entry.response.as_ref().and_then(|r| r.get("outcome"));
                from_resource.into_iter().chain(from_response)
            })
            .filter_map(|value| serde_json::from_value::<OperationOutcome>(value.clone()).ok())
            .collect()
    }
}
