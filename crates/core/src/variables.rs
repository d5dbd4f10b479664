//! Named variables exchanged with the workflow sequencer.
//!
//! The sequencer hands each service task a variable store and reads it back afterwards. Tasks
//! never reach into it directly; they go through the typed getters here, which turn missing or
//! mistyped values into [`TransferError::MissingVariable`] / [`TransferError::VariableType`].

use crate::outcome::ContinueStatus;
use crate::reference::PatientReference;
use crate::{TransferError, TransferResult};
use fhir::Bundle;
use std::collections::HashMap;

/// A single execution variable value.
#[derive(Clone, Debug, PartialEq)]
pub enum Variable {
    Bundle(Bundle),
    Bytes(Vec<u8>),
    Text(String),
    PatientReference(PatientReference),
    ContinueStatus(ContinueStatus),
}

impl Variable {
    fn type_name(&self) -> &'static str {
        match self {
            Variable::Bundle(_) => "bundle",
            Variable::Bytes(_) => "bytes",
            Variable::Text(_) => "text",
            Variable::PatientReference(_) => "patient reference",
            Variable::ContinueStatus(_) => "continue status",
        }
    }
}

/// Key/value store of execution variables for one workflow instance.
#[derive(Clone, Debug, Default)]
pub struct ExecutionVariables {
    values: HashMap<String, Variable>,
}

macro_rules! typed_getter {
    ($(#[$doc:meta])* $fn_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        $(#[$doc])*
        pub fn $fn_name(&self, name: &'static str) -> TransferResult<&$ty> {
            match self.require(name)? {
                Variable::$variant(value) => Ok(value),
                other => Err(mistyped(name, other, $expected)),
            }
        }
    };
}

impl ExecutionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Variable) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn require(&self, name: &'static str) -> TransferResult<&Variable> {
        self.values
            .get(name)
            .ok_or(TransferError::MissingVariable { name })
    }

    typed_getter!(bundle, Bundle, Bundle, "bundle");
    typed_getter!(bytes, Bytes, Vec<u8>, "bytes");
    typed_getter!(
        /// Text value; empty strings are returned as is.
        text,
        Text,
        String,
        "text"
    );
    typed_getter!(patient_reference, PatientReference, PatientReference, "patient reference");
    typed_getter!(continue_status, ContinueStatus, ContinueStatus, "continue status");
}

fn mistyped(name: &'static str, found: &Variable, expected: &'static str) -> TransferError {
    tracing::warn!(
        "execution variable '{name}' holds {}, expected {expected}",
        found.type_name()
    );
    TransferError::VariableType { name, expected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{VARIABLE_BUNDLE, VARIABLE_PSEUDONYM};
    use crate::error::ErrorKind;

    #[test]
    fn typed_access_returns_stored_value() {
        let mut vars = ExecutionVariables::new();
        vars.set(VARIABLE_BUNDLE, Variable::Bundle(Bundle::new("transaction")));

        let bundle = vars.bundle(VARIABLE_BUNDLE).expect("bundle");
        assert_eq!(bundle.bundle_type, "transaction");
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let vars = ExecutionVariables::new();
        let err = vars.text(VARIABLE_PSEUDONYM).expect_err("missing");
        assert!(matches!(err, TransferError::MissingVariable { name } if name == VARIABLE_PSEUDONYM));
        assert_eq!(err.kind(), ErrorKind::Variables);
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut vars = ExecutionVariables::new();
        vars.set(VARIABLE_BUNDLE, Variable::Bytes(vec![1, 2, 3]));

        let err = vars.bundle(VARIABLE_BUNDLE).expect_err("mistyped");
        assert!(matches!(
            err,
            TransferError::VariableType {
                expected: "bundle",
                ..
            }
        ));
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut vars = ExecutionVariables::new();
        vars.set(VARIABLE_BUNDLE, Variable::Bytes(vec![1]));
        vars.set(VARIABLE_BUNDLE, Variable::Bundle(Bundle::new("batch")));

        assert!(vars.bundle(VARIABLE_BUNDLE).is_ok());
        assert!(vars.remove(VARIABLE_BUNDLE).is_some());
        assert!(!vars.contains(VARIABLE_BUNDLE));
    }
}
