//! Interfaces of the external collaborators the core depends on.
//!
//! The core never talks to a network directly: the clinical-data repository, the pseudonym
//! resolution service and the profile registry are reached through these traits. All calls are
//! blocking from the core's point of view.
//!
//! Implementations shipped here:
//! - [`memory`]: in-memory collaborators for tests and local runs
//! - [`directory`]: a schema lookup backed by profile files on disk

pub mod directory;
pub mod memory;

use crate::error::ClientError;
use crate::reference::{BloomFilterDigest, Pseudonym};
use fhir::{Bundle, Patient, StructureDefinition};

/// Result of a transactional bundle store that reached the repository.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOutcome {
    /// The transaction was committed; carries the repository's response bundle.
    Stored(Bundle),
    /// The repository rejected the bundle on structural or profile validation; carries the
    /// result bundle describing the violations.
    Rejected(Bundle),
}

/// Client of the clinical-data repository.
pub trait PatientRepository: Send + Sync {
    /// Read a patient by absolute reference. `Ok(None)` if the record does not exist.
    fn get_patient(&self, reference: &str) -> Result<Option<Patient>, ClientError>;

    /// Replace a patient record.
    fn update_patient(&self, patient: &Patient) -> Result<(), ClientError>;

    /// Execute `bundle` as a transaction.
    ///
    /// Validation rejections are reported as `Ok(StoreOutcome::Rejected(_))`; `Err` is reserved
    /// for infrastructure faults.
    fn store_bundle(&self, bundle: &Bundle) -> Result<StoreOutcome, ClientError>;
}

/// Client of the pseudonym resolution service.
pub trait PseudonymResolutionService: Send + Sync {
    /// Resolve a bloom-filter digest. `Ok(None)` if the service has no pseudonym for it.
    fn resolve_digest(&self, digest: &BloomFilterDigest) -> Result<Option<Pseudonym>, ClientError>;
}

/// Lookup of structure definitions by canonical URL.
pub trait SchemaLookup: Send + Sync {
    /// Fetch by `url` or `url|version`.
    fn fetch_by_url(&self, url: &str) -> Option<StructureDefinition>;
}
