//! Service tasks invoked by the workflow sequencer.
//!
//! Each task reads a typed input from the [`ExecutionVariables`], runs one component and writes
//! a typed output back. Failures are returned as [`TransferError`]s; the sequencer maps them to
//! a workflow error via [`TransferError::error_code`] and [`TransferError::is_retryable`].
//!
//! | task                    | reads                                  | writes                          |
//! |-------------------------|----------------------------------------|---------------------------------|
//! | `ResolvePseudonym`      | `patientReference`                     | `pseudonym`, `patientReference` |
//! | `DecryptData`           | `bundle` (bytes), `aesReturnKey`       | `bundle`                        |
//! | `InsertData`            | `bundle`                               | `continueStatus`, `bundle`      |
//! | `EncryptValidationError`| `bundle`, `pseudonym`, `aesReturnKey`  | `bundle` (bytes)                |

use crate::clients::PatientRepository;
use crate::codec::{PayloadCodec, Redaction, ReturnKey};
use crate::config::TransferConfig;
use crate::constants::{
    RETURN_AAD, VARIABLE_AES_RETURN_KEY, VARIABLE_BUNDLE, VARIABLE_CONTINUE_STATUS,
    VARIABLE_PATIENT_REFERENCE, VARIABLE_PSEUDONYM,
};
use crate::outcome::{ContinueStatus, OutcomeClassifier};
use crate::pseudonym::PseudonymResolver;
use crate::reference::{PatientReference, Pseudonym};
use crate::variables::{ExecutionVariables, Variable};
use crate::TransferResult;
use fhir::Bundle;
use std::sync::Arc;

/// A step of the transfer workflow.
pub trait ServiceTask {
    type Input;
    type Output;

    /// Name used in log lines.
    const NAME: &'static str;

    fn read_input(vars: &ExecutionVariables) -> TransferResult<Self::Input>;

    fn write_output(output: Self::Output, vars: &mut ExecutionVariables);

    fn execute(&self, input: Self::Input) -> TransferResult<Self::Output>;

    /// Read input, execute and write output. Variables are untouched on failure.
    fn run(&self, vars: &mut ExecutionVariables) -> TransferResult<()> {
        let input = Self::read_input(vars)?;
        match self.execute(input) {
            Ok(output) => {
                Self::write_output(output, vars);
                Ok(())
            }
            Err(e) => {
                let (system, code) = e.error_coding();
                tracing::error!(
                    task = Self::NAME,
                    system,
                    code,
                    retryable = e.is_retryable(),
                    "task failed: {e}"
                );
                Err(e)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// ResolvePseudonym
// ----------------------------------------------------------------------------

pub struct ResolvePseudonymInput {
    pub patient_reference: PatientReference,
}

pub struct ResolvePseudonymOutput {
    pub pseudonym: Pseudonym,
    pub patient_reference: PatientReference,
}

/// Replaces the outgoing patient reference with its pseudonymized form.
pub struct ResolvePseudonym {
    resolver: PseudonymResolver,
}

impl ResolvePseudonym {
    pub fn new(resolver: PseudonymResolver) -> Self {
        Self { resolver }
    }
}

impl ServiceTask for ResolvePseudonym {
    type Input = ResolvePseudonymInput;
    type Output = ResolvePseudonymOutput;

    const NAME: &'static str = "ResolvePseudonym";

    fn read_input(vars: &ExecutionVariables) -> TransferResult<Self::Input> {
        Ok(ResolvePseudonymInput {
            patient_reference: vars.patient_reference(VARIABLE_PATIENT_REFERENCE)?.clone(),
        })
    }

    fn write_output(output: Self::Output, vars: &mut ExecutionVariables) {
        vars.set(
            VARIABLE_PSEUDONYM,
            Variable::Text(output.pseudonym.as_str().to_string()),
        );
        vars.set(
            VARIABLE_PATIENT_REFERENCE,
            Variable::PatientReference(output.patient_reference),
        );
    }

    fn execute(&self, input: Self::Input) -> TransferResult<Self::Output> {
        let pseudonym = self.resolver.resolve(&input.patient_reference)?;
        let patient_reference = self.resolver.pseudonymized(&pseudonym);
        Ok(ResolvePseudonymOutput {
            pseudonym,
            patient_reference,
        })
    }
}

// ----------------------------------------------------------------------------
// DecryptData
// ----------------------------------------------------------------------------

pub struct DecryptDataInput {
    pub ciphertext: Vec<u8>,
    pub key: ReturnKey,
}

/// Decrypts a bundle received from the peer site.
pub struct DecryptData {
    aad: &'static [u8],
}

impl DecryptData {
    pub fn new(aad: &'static [u8]) -> Self {
        Self { aad }
    }
}

impl Default for DecryptData {
    /// Decrypts validation-error bundles returned by the peer.
    fn default() -> Self {
        Self::new(RETURN_AAD)
    }
}

impl ServiceTask for DecryptData {
    type Input = DecryptDataInput;
    type Output = Bundle;

    const NAME: &'static str = "DecryptData";

    fn read_input(vars: &ExecutionVariables) -> TransferResult<Self::Input> {
        Ok(DecryptDataInput {
            ciphertext: vars.bytes(VARIABLE_BUNDLE)?.clone(),
            key: ReturnKey::from_bytes(vars.bytes(VARIABLE_AES_RETURN_KEY)?.clone()),
        })
    }

    fn write_output(output: Self::Output, vars: &mut ExecutionVariables) {
        vars.set(VARIABLE_BUNDLE, Variable::Bundle(output));
    }

    fn execute(&self, input: Self::Input) -> TransferResult<Self::Output> {
        PayloadCodec::decrypt(&input.ciphertext, self.aad, &input.key)
    }
}

// ----------------------------------------------------------------------------
// InsertData
// ----------------------------------------------------------------------------

pub struct InsertDataOutput {
    pub status: ContinueStatus,
    pub bundle: Bundle,
}

/// Stores a decrypted bundle and records how the store went.
pub struct InsertData {
    repository: Arc<dyn PatientRepository>,
}

impl InsertData {
    pub fn new(repository: Arc<dyn PatientRepository>) -> Self {
        Self { repository }
    }
}

impl ServiceTask for InsertData {
    type Input = Bundle;
    type Output = InsertDataOutput;

    const NAME: &'static str = "InsertData";

    fn read_input(vars: &ExecutionVariables) -> TransferResult<Self::Input> {
        Ok(vars.bundle(VARIABLE_BUNDLE)?.clone())
    }

    fn write_output(output: Self::Output, vars: &mut ExecutionVariables) {
        vars.set(
            VARIABLE_CONTINUE_STATUS,
            Variable::ContinueStatus(output.status),
        );
        vars.set(VARIABLE_BUNDLE, Variable::Bundle(output.bundle));
    }

    fn execute(&self, input: Self::Input) -> TransferResult<Self::Output> {
        let outcome = OutcomeClassifier::classify(&input, self.repository.as_ref())?;
        Ok(InsertDataOutput {
            status: outcome.status,
            bundle: outcome.bundle,
        })
    }
}

// ----------------------------------------------------------------------------
// EncryptValidationError
// ----------------------------------------------------------------------------

pub struct EncryptValidationErrorInput {
    pub bundle: Bundle,
    pub pseudonym: String,
    pub key: ReturnKey,
}

/// Encrypts a validation result for return to the sending site, with this site's pseudonym
/// replaced by the placeholder and its naming system by the sender's.
pub struct EncryptValidationError {
    cfg: Arc<TransferConfig>,
}

impl EncryptValidationError {
    pub fn new(cfg: Arc<TransferConfig>) -> Self {
        Self { cfg }
    }
}

impl ServiceTask for EncryptValidationError {
    type Input = EncryptValidationErrorInput;
    type Output = Vec<u8>;

    const NAME: &'static str = "EncryptValidationError";

    fn read_input(vars: &ExecutionVariables) -> TransferResult<Self::Input> {
        Ok(EncryptValidationErrorInput {
            bundle: vars.bundle(VARIABLE_BUNDLE)?.clone(),
            pseudonym: vars.text(VARIABLE_PSEUDONYM)?.clone(),
            key: ReturnKey::from_bytes(vars.bytes(VARIABLE_AES_RETURN_KEY)?.clone()),
        })
    }

    fn write_output(output: Self::Output, vars: &mut ExecutionVariables) {
        vars.set(VARIABLE_BUNDLE, Variable::Bytes(output));
    }

    fn execute(&self, input: Self::Input) -> TransferResult<Self::Output> {
        let redaction = Redaction {
            pseudonym: &input.pseudonym,
            placeholder: self.cfg.pseudonym_placeholder(),
            own_system: self.cfg.dic_pseudonym_system(),
            peer_system: self.cfg.crr_pseudonym_system(),
        };
        PayloadCodec::encrypt_with_pseudonym_redaction(&input.bundle, &redaction, RETURN_AAD, &input.key)
    }
}
