//! Classification of bundle storage attempts.
//!
//! Storing a transferred bundle ends in one of three ways. A committed transaction continues
//! the workflow normally; a validation rejection is a value that routes the result bundle back
//! to the sending site; anything else is a [`TransferError::Store`] fault.

use crate::clients::{PatientRepository, StoreOutcome};
use crate::{TransferError, TransferResult};
use fhir::{Bundle, IssueSeverity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch selector handed back to the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContinueStatus {
    Success,
    ValidationError,
}

impl fmt::Display for ContinueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinueStatus::Success => f.write_str("SUCCESS"),
            ContinueStatus::ValidationError => f.write_str("VALIDATION_ERROR"),
        }
    }
}

/// Result of a classified store.
///
/// `bundle` is the repository's transaction response on success and the validation result
/// bundle on rejection. The submitted bundle is never echoed back.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferOutcome {
    pub status: ContinueStatus,
    pub bundle: Bundle,
}

/// Stores bundles and classifies the result.
pub struct OutcomeClassifier;

impl OutcomeClassifier {
    /// Store `bundle` through `repository` and classify the result.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Store`] for any failure that is not a validation rejection.
    pub fn classify(
        bundle: &Bundle,
        repository: &dyn PatientRepository,
    ) -> TransferResult<TransferOutcome> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(text) = bundle.to_canonical_string() {
                tracing::debug!("Executing bundle: {text}");
            }
        }

        match repository.store_bundle(bundle) {
            Ok(StoreOutcome::Stored(response)) => {
                tracing::info!(entries = response.entry.len(), "bundle stored");
                Ok(TransferOutcome {
                    status: ContinueStatus::Success,
                    bundle: response,
                })
            }
            Ok(StoreOutcome::Rejected(result)) => {
                log_validation_issues(&result);
                Ok(TransferOutcome {
                    status: ContinueStatus::ValidationError,
                    bundle: result,
                })
            }
            Err(e) => {
                tracing::warn!("Error while executing bundle: {e}");
                Err(TransferError::Store)
            }
        }
    }
}

fn log_validation_issues(result: &Bundle) {
    let issues: Vec<_> = result
        .operation_outcomes()
        .into_iter()
        .flat_map(|outcome| outcome.issue)
        .collect();

    tracing::warn!(issues = issues.len(), "bundle rejected by validation");

    for issue in &issues {
        let diagnostics = issue.diagnostics.as_deref().unwrap_or("");
        match issue.severity {
            IssueSeverity::Fatal | IssueSeverity::Error => tracing::warn!(
                "Validation {} at {}: {}",
                issue.severity,
                issue.display_location(),
                diagnostics
            ),
            IssueSeverity::Warning | IssueSeverity::Information => tracing::debug!(
                "Validation {} at {}: {}",
                issue.severity,
                issue.display_location(),
                diagnostics
            ),
        }
    }
}
