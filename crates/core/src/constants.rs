//! Constants used throughout the transfer core.
//!
//! Naming systems, workflow variable keys and error codes are shared with the sequencer's
//! process definition and with the peer sites, so they live here in one place.

// ----------------------------------------------------------------------------
// Naming systems
// ----------------------------------------------------------------------------

/// Naming system of bloom-filter digests on patient records.
pub const NAMING_SYSTEM_BLOOM_FILTER: &str =
    "http://www.netzwerk-universitaetsmedizin.de/sid/bloom-filter";

/// Naming system of pseudonyms assigned for the data-integration site.
pub const NAMING_SYSTEM_DIC_PSEUDONYM: &str =
    "http://www.netzwerk-universitaetsmedizin.de/sid/dic-pseudonym";

/// Naming system of pseudonyms assigned for the central research repository.
pub const NAMING_SYSTEM_CRR_PSEUDONYM: &str =
    "http://www.netzwerk-universitaetsmedizin.de/sid/crr-pseudonym";

/// Code system of the identifier type attached to resolved pseudonyms.
pub const IDENTIFIER_PSEUDONYM_TYPE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v2-0203";

/// Identifier type code for anonymized identifiers.
pub const IDENTIFIER_PSEUDONYM_TYPE_CODE: &str = "ANON";

// ----------------------------------------------------------------------------
// Payload protection
// ----------------------------------------------------------------------------

/// Token substituted for the receiving site's pseudonym in returned error payloads.
pub const PSEUDONYM_PLACEHOLDER: &str = "<PSEUDONYM>";

/// Associated data bound into every validation-error return ciphertext.
pub const RETURN_AAD: &[u8] = b"num-codex/data-transfer/validation-error-return";

/// AES-GCM nonce length in bytes.
pub const AES_GCM_NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const AES_GCM_TAG_LEN: usize = 16;

/// Length in bytes of generated return keys (AES-256).
pub const RETURN_KEY_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Execution variable keys
// ----------------------------------------------------------------------------

pub const VARIABLE_PATIENT_REFERENCE: &str = "patientReference";
pub const VARIABLE_BUNDLE: &str = "bundle";
pub const VARIABLE_PSEUDONYM: &str = "pseudonym";
pub const VARIABLE_AES_RETURN_KEY: &str = "aesReturnKey";
pub const VARIABLE_CONTINUE_STATUS: &str = "continueStatus";

// ----------------------------------------------------------------------------
// Workflow error codes
// ----------------------------------------------------------------------------

/// Code system of the error codes reported to the sequencer.
pub const DATA_TRANSFER_ERROR_SYSTEM: &str =
    "http://www.netzwerk-universitaetsmedizin.de/fhir/CodeSystem/data-transfer-error";

pub const ERROR_PATIENT_NOT_FOUND: &str = "patient-not-found";
pub const ERROR_BLOOM_FILTER_MISSING: &str = "bloom-filter-missing";
pub const ERROR_UNSUPPORTED_PATIENT_REFERENCE: &str = "unsupported-patient-reference";
pub const ERROR_NO_DIC_PSEUDONYM_FOR_BLOOMFILTER: &str = "no-dic-pseudonym-for-bloomfilter";
pub const ERROR_PSEUDONYM_SERVICE_FAILED: &str = "pseudonym-service-failed";
pub const ERROR_PATIENT_READ_FAILED: &str = "patient-read-failed";
pub const ERROR_PATIENT_UPDATE_FAILED: &str = "patient-update-failed";
pub const ERROR_ENCRYPTION_FAILED: &str = "encryption-of-data-failed";
pub const ERROR_DECRYPTION_FAILED: &str = "decryption-of-data-failed";
pub const ERROR_INSERT_INTO_CRR_FAILED: &str = "insert-into-crr-fhir-repository-failed";
pub const ERROR_INVALID_EXECUTION_VARIABLES: &str = "invalid-execution-variables";
pub const ERROR_CONFIGURATION: &str = "configuration-error";

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Default directory scanned for StructureDefinition files.
pub const DEFAULT_SCHEMA_DIR: &str = "profiles";
