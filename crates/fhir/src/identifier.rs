//! FHIR `Identifier`, `CodeableConcept` and `Coding` datatypes.
//!
//! Identifiers carry the values the transfer core cares most about: bloom-filter digests and
//! site-scoped pseudonyms. Both are distinguished only by their naming-system URI.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to a code defined by a terminology system.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A concept expressed by one or more codings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// An identifier scoped to a naming system.
///
/// Fields outside `system`, `value` and `type` (for example `use` or `period`) are preserved
/// verbatim in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Identifier {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<CodeableConcept>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identifier {
    /// Create an identifier with a system and value.
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_: None,
            system: Some(system.into()),
            value: Some(value.into()),
            extra: Map::new(),
        }
    }

    /// Attach a single-coding type to this identifier.
    pub fn with_type_coding(mut self, system: impl Into<String>, code: impl Into<String>) -> Self {
        self.type_ = Some(CodeableConcept {
            coding: vec![Coding {
                system: Some(system.into()),
                code: Some(code.into()),
                display: None,
            }],
            text: None,
        });
        self
    }

    /// Returns `true` if this identifier belongs to the given naming system.
    pub fn has_system(&self, system: &str) -> bool {
        self.system.as_deref() == Some(system)
    }

    /// Returns the value if present and non-empty.
    pub fn non_empty_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}
