//! FHIR `OperationOutcome` wire model.
//!
//! Repositories return outcomes inside the result bundle when they reject a transaction; the
//! snapshot generator reuses [`IssueSeverity`] for its own messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity of an outcome issue.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    /// Returns `true` for `fatal` and `error`.
    pub fn is_error(self) -> bool {
        matches!(self, IssueSeverity::Fatal | IssueSeverity::Error)
    }

    fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single issue reported in an outcome.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,

    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OperationOutcomeIssue {
    /// Best-effort location: the first `expression`, else the first `location`.
    pub fn display_location(&self) -> &str {
        self.expression
            .first()
            .or_else(|| self.location.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// OperationOutcome resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(default)]
    pub issue: Vec<OperationOutcomeIssue>,
}

impl OperationOutcome {
    /// Returns `true` if any issue is `error` or `fatal`.
    pub fn has_errors(&self) -> bool {
        self.issue.iter().any(|i| i.severity.is_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_puts_fatal_first() {
        assert!(IssueSeverity::Fatal < IssueSeverity::Error);
        assert!(IssueSeverity::Error < IssueSeverity::Warning);
        assert!(IssueSeverity::Warning.to_string() == "warning");
    }

    #[test]
    fn display_location_prefers_expression() {
        let issue: OperationOutcomeIssue = serde_json::from_str(
            r#"{"severity":"error","code":"invalid","location":["Bundle.entry[0]"],
                "expression":["Bundle.entry[0].resource.status"]}"#,
        )
        .expect("parse issue");
        assert_eq!(issue.display_location(), "Bundle.entry[0].resource.status");
        assert!(issue.severity.is_error());
    }
}
