//! FHIR `StructureDefinition` and `ElementDefinition` wire models.
//!
//! Only the parts of an element definition that take part in snapshot generation are modelled
//! explicitly (cardinality, types, binding, documentation, must-support). Everything else, such
//! as `fixed[x]`, `pattern[x]` or `constraint`, is kept in `extra` and merged key by key.

use crate::{expect_resource_type, parse_json, parse_yaml, FhirError, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const RESOURCE_TYPE: &str = "StructureDefinition";

/// Upper bound of an element's cardinality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaxCardinality {
    Bounded(u32),
    Unbounded,
}

impl FromStr for MaxCardinality {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(MaxCardinality::Unbounded),
            other => other
                .parse::<u32>()
                .map(MaxCardinality::Bounded)
                .map_err(|_| FhirError::InvalidInput(format!("invalid max cardinality '{s}'"))),
        }
    }
}

impl fmt::Display for MaxCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxCardinality::Bounded(n) => write!(f, "{n}"),
            MaxCardinality::Unbounded => f.write_str("*"),
        }
    }
}

/// Strength of a terminology binding.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl BindingStrength {
    /// Higher is stricter.
    pub fn strictness(self) -> u8 {
        match self {
            BindingStrength::Required => 3,
            BindingStrength::Extensible => 2,
            BindingStrength::Preferred => 1,
            BindingStrength::Example => 0,
        }
    }
}

/// Terminology binding of a coded element.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Binding {
    pub strength: BindingStrength,

    #[serde(rename = "valueSet", skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Allowed datatype of an element.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TypeRef {
    pub code: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,

    #[serde(rename = "targetProfile", default, skip_serializing_if = "Vec::is_empty")]
    pub target_profile: Vec<String>,
}

impl TypeRef {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            profile: Vec::new(),
            target_profile: Vec::new(),
        }
    }
}

/// A single element constraint, either from a differential or a snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ElementDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub path: String,

    #[serde(rename = "sliceName", skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeRef>,

    #[serde(rename = "mustSupport", skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementDefinition {
    /// Create an element with only a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Element key used for matching: the `id` if present, else the `path`.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.path)
    }

    /// Parsed `max`, if present.
    pub fn max_cardinality(&self) -> Option<FhirResult<MaxCardinality>> {
        self.max.as_deref().map(str::parse)
    }
}

/// Wrapper for `differential.element` / `snapshot.element`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ElementList {
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

/// StructureDefinition resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StructureDefinition {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub type_: String,

    #[serde(rename = "baseDefinition", skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ElementList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<ElementList>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructureDefinition {
    /// Create a definition with no element lists.
    pub fn new(url: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            resource_type: RESOURCE_TYPE.to_string(),
            id: None,
            url: url.into(),
            version: None,
            name: None,
            type_: type_.into(),
            base_definition: None,
            derivation: None,
            snapshot: None,
            differential: None,
            extra: Map::new(),
        }
    }

    /// Parse a structure definition from JSON text.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let definition: StructureDefinition = parse_json(json_text, RESOURCE_TYPE)?;
        expect_resource_type(&definition.resource_type, RESOURCE_TYPE)?;
        Ok(definition)
    }

    /// Parse a structure definition from YAML text.
    pub fn parse_yaml(yaml_text: &str) -> FhirResult<Self> {
        let definition: StructureDefinition = parse_yaml(yaml_text, RESOURCE_TYPE)?;
        expect_resource_type(&definition.resource_type, RESOURCE_TYPE)?;
        Ok(definition)
    }

    /// Render as indented JSON.
    pub fn render_pretty(&self) -> FhirResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            FhirError::Translation(format!("Failed to serialise structure definition: {e}"))
        })
    }

    /// Canonical reference: `url|version` when versioned, else `url`.
    pub fn canonical(&self) -> String {
        match &self.version {
            Some(version) => format!("{}|{}", self.url, version),
            None => self.url.clone(),
        }
    }

    /// Differential elements, empty if there is no differential.
    pub fn differential_elements(&self) -> &[ElementDefinition] {
        self.differential
            .as_ref()
            .map(|d| d.element.as_slice())
            .unwrap_or(&[])
    }

    /// Snapshot elements, empty if no snapshot has been generated.
    pub fn snapshot_elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .map(|s| s.element.as_slice())
            .unwrap_or(&[])
    }
}
