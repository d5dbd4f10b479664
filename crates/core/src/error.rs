//! Error types for the transfer core.
//!
//! Faults are a closed set of kinds. The sequencer only ever sees the kind, the workflow error
//! code and the display text; cryptographic and store faults carry no detail beyond that.
//! Validation rejections are not errors at all (see [`crate::outcome`]).

use crate::constants::{
    DATA_TRANSFER_ERROR_SYSTEM, ERROR_BLOOM_FILTER_MISSING, ERROR_CONFIGURATION,
    ERROR_DECRYPTION_FAILED, ERROR_ENCRYPTION_FAILED, ERROR_INSERT_INTO_CRR_FAILED,
    ERROR_INVALID_EXECUTION_VARIABLES, ERROR_NO_DIC_PSEUDONYM_FOR_BLOOMFILTER,
    ERROR_PATIENT_NOT_FOUND, ERROR_PATIENT_READ_FAILED, ERROR_PATIENT_UPDATE_FAILED,
    ERROR_PSEUDONYM_SERVICE_FAILED, ERROR_UNSUPPORTED_PATIENT_REFERENCE,
};

/// Failure reported by an external collaborator (repository, resolution service).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("not authorised: {0}")]
    Unauthorised(String),
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Category of a [`TransferError`], used by the sequencer to pick a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required data is missing from a record; an upstream defect.
    DataIntegrity,
    /// The referenced patient does not exist.
    NotFound,
    /// The resolution service has no answer (yet).
    Resolution,
    /// Any encryption or decryption failure.
    Cryptographic,
    /// Infrastructure failure while storing a bundle.
    Store,
    /// Infrastructure failure while reading or updating a patient.
    Repository,
    /// Invalid configuration detected at startup.
    Configuration,
    /// The sequencer supplied missing or mistyped execution variables.
    Variables,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("patient at {reference} not found")]
    PatientNotFound { reference: String },

    #[error("no bloom filter present in patient {patient_id}")]
    MissingBloomFilter { patient_id: String },

    #[error("patient reference {0} cannot be resolved to a pseudonym")]
    UnsupportedReference(String),

    #[error("unable to get DIC pseudonym for given bloom filter")]
    NoPseudonymForDigest,

    #[error("pseudonym resolution service failed: {0}")]
    ResolutionService(#[source] ClientError),

    #[error("failed to read patient {reference}: {source}")]
    PatientRead {
        reference: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to update patient {patient_id}: {source}")]
    PatientUpdate {
        patient_id: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to encrypt data")]
    Encryption,

    #[error("unable to decrypt data")]
    Decryption,

    #[error("unable to insert data into CRR")]
    Store,

    #[error("execution variable '{name}' is missing")]
    MissingVariable { name: &'static str },

    #[error("execution variable '{name}' has unexpected type, expected {expected}")]
    VariableType {
        name: &'static str,
        expected: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read schema directory {path}: {source}", path = path.display())]
    SchemaDirectory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
}

impl TransferError {
    /// The fault category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::PatientNotFound { .. } => ErrorKind::NotFound,
            TransferError::MissingBloomFilter { .. } | TransferError::UnsupportedReference(_) => {
                ErrorKind::DataIntegrity
            }
            TransferError::NoPseudonymForDigest | TransferError::ResolutionService(_) => {
                ErrorKind::Resolution
            }
            TransferError::PatientRead { .. } | TransferError::PatientUpdate { .. } => {
                ErrorKind::Repository
            }
            TransferError::Encryption | TransferError::Decryption => ErrorKind::Cryptographic,
            TransferError::Store => ErrorKind::Store,
            TransferError::MissingVariable { .. } | TransferError::VariableType { .. } => {
                ErrorKind::Variables
            }
            TransferError::InvalidConfig(_)
            | TransferError::SchemaDirectory { .. }
            | TransferError::Fhir(_) => ErrorKind::Configuration,
        }
    }

    /// Workflow error code reported to the sequencer.
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::PatientNotFound { .. } => ERROR_PATIENT_NOT_FOUND,
            TransferError::MissingBloomFilter { .. } => ERROR_BLOOM_FILTER_MISSING,
            TransferError::UnsupportedReference(_) => ERROR_UNSUPPORTED_PATIENT_REFERENCE,
            TransferError::NoPseudonymForDigest => ERROR_NO_DIC_PSEUDONYM_FOR_BLOOMFILTER,
            TransferError::ResolutionService(_) => ERROR_PSEUDONYM_SERVICE_FAILED,
            TransferError::PatientRead { .. } => ERROR_PATIENT_READ_FAILED,
            TransferError::PatientUpdate { .. } => ERROR_PATIENT_UPDATE_FAILED,
            TransferError::Encryption => ERROR_ENCRYPTION_FAILED,
            TransferError::Decryption => ERROR_DECRYPTION_FAILED,
            TransferError::Store => ERROR_INSERT_INTO_CRR_FAILED,
            TransferError::MissingVariable { .. } | TransferError::VariableType { .. } => {
                ERROR_INVALID_EXECUTION_VARIABLES
            }
            TransferError::InvalidConfig(_)
            | TransferError::SchemaDirectory { .. }
            | TransferError::Fhir(_) => ERROR_CONFIGURATION,
        }
    }

    /// The error code as a coding (`system`, `code`) in the data-transfer error code system.
    pub fn error_coding(&self) -> (&'static str, &'static str) {
        (DATA_TRANSFER_ERROR_SYSTEM, self.error_code())
    }

    /// Whether the sequencer may retry the step unchanged.
    ///
    /// Only resolution faults and transient repository faults qualify; resolution is
    /// idempotent, so a retry after a failed patient update is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Resolution | ErrorKind::Repository)
    }
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;
