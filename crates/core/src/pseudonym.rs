//! Pseudonym resolution for outgoing patient references.
//!
//! Before data leaves the sending site, the local patient reference is replaced by the patient's
//! pseudonym in the destination naming system. The pseudonym is obtained once from the
//! resolution service (keyed by the patient's bloom-filter digest) and cached on the patient
//! record, so that retries under at-least-once execution never resolve twice.
//!
//! Resolution order:
//! 1. Fetch the patient; absent is terminal
//! 2. Existing pseudonym identifier: return it, no further calls
//! 3. Extract the bloom-filter digest; absent is a data-integrity fault
//! 4. Ask the resolution service; no answer is retryable
//! 5. Swap the digest for the pseudonym identifier and persist before returning

use crate::clients::{PatientRepository, PseudonymResolutionService};
use crate::config::TransferConfig;
use crate::constants::{IDENTIFIER_PSEUDONYM_TYPE_CODE, IDENTIFIER_PSEUDONYM_TYPE_SYSTEM};
use crate::reference::{BloomFilterDigest, PatientReference, Pseudonym};
use crate::{TransferError, TransferResult};
use fhir::{Identifier, Patient};
use std::sync::Arc;

/// Resolves patient references to destination-site pseudonyms.
#[derive(Clone)]
pub struct PseudonymResolver {
    cfg: Arc<TransferConfig>,
    repository: Arc<dyn PatientRepository>,
    resolution: Arc<dyn PseudonymResolutionService>,
}

impl PseudonymResolver {
    pub fn new(
        cfg: Arc<TransferConfig>,
        repository: Arc<dyn PatientRepository>,
        resolution: Arc<dyn PseudonymResolutionService>,
    ) -> Self {
        Self {
            cfg,
            repository,
            resolution,
        }
    }

    /// Resolve `reference` to the patient's pseudonym.
    ///
    /// An identifier-form reference already in the pseudonym naming system is returned as is.
    ///
    /// # Errors
    ///
    /// - [`TransferError::PatientNotFound`] if the repository has no such patient
    /// - [`TransferError::MissingBloomFilter`] if neither pseudonym nor digest is on the record
    /// - [`TransferError::NoPseudonymForDigest`] if the service cannot resolve the digest
    /// - [`TransferError::PatientUpdate`] if persisting the pseudonym fails; no pseudonym is
    ///   returned in that case
    /// - [`TransferError::UnsupportedReference`] for identifiers in any other naming system
    pub fn resolve(&self, reference: &PatientReference) -> TransferResult<Pseudonym> {
        let system = self.cfg.dic_pseudonym_system();

        if let Some(value) = reference.identifier_value(system) {
            tracing::debug!(%reference, "reference is already pseudonymized");
            return Ok(Pseudonym::new(value));
        }

        let absolute = reference
            .absolute_reference()
            .ok_or_else(|| TransferError::UnsupportedReference(reference.to_string()))?;

        tracing::info!("Resolving DIC pseudonym for patient {absolute}");

        let mut patient = self.fetch_patient(absolute)?;

        if let Some(pseudonym) = patient.identifier_value(system) {
            tracing::debug!("Patient {absolute} has DIC pseudonym {pseudonym}");
            return Ok(Pseudonym::new(pseudonym));
        }

        tracing::debug!("Patient {absolute} has no DIC pseudonym");

        let digest = self.bloom_filter(&patient)?;
        let pseudonym = self.resolve_digest(&digest)?;

        self.attach_pseudonym(&mut patient, &pseudonym);
        self.repository
            .update_patient(&patient)
            .map_err(|source| TransferError::PatientUpdate {
                patient_id: patient_id(&patient),
                source,
            })?;

        tracing::info!("Stored DIC pseudonym on patient {absolute}");
        Ok(pseudonym)
    }

    /// Identifier-form reference for `pseudonym` in the pseudonym naming system.
    pub fn pseudonymized(&self, pseudonym: &Pseudonym) -> PatientReference {
        PatientReference::pseudonymized(self.cfg.dic_pseudonym_system(), pseudonym)
    }

    fn fetch_patient(&self, reference: &str) -> TransferResult<Patient> {
        match self.repository.get_patient(reference) {
            Ok(Some(patient)) => Ok(patient),
            Ok(None) => {
                tracing::warn!("Patient {reference} not found");
                Err(TransferError::PatientNotFound {
                    reference: reference.to_string(),
                })
            }
            Err(source) => Err(TransferError::PatientRead {
                reference: reference.to_string(),
                source,
            }),
        }
    }

    fn bloom_filter(&self, patient: &Patient) -> TransferResult<BloomFilterDigest> {
        patient
            .identifier_value(self.cfg.bloom_filter_system())
            .map(BloomFilterDigest::new)
            .ok_or_else(|| {
                let patient_id = patient_id(patient);
                tracing::error!("No bloom filter present in patient {patient_id}");
                TransferError::MissingBloomFilter { patient_id }
            })
    }

    fn resolve_digest(&self, digest: &BloomFilterDigest) -> TransferResult<Pseudonym> {
        match self.resolution.resolve_digest(digest) {
            Ok(Some(pseudonym)) if !pseudonym.as_str().is_empty() => Ok(pseudonym),
            Ok(_) => {
                tracing::warn!("Unable to get DIC pseudonym for given bloom filter");
                Err(TransferError::NoPseudonymForDigest)
            }
            Err(source) => {
                tracing::warn!("Pseudonym resolution service failed: {source}");
                Err(TransferError::ResolutionService(source))
            }
        }
    }

    /// Replace the digest with the pseudonym identifier, keeping one per naming system.
    fn attach_pseudonym(&self, patient: &mut Patient, pseudonym: &Pseudonym) {
        patient.remove_identifiers(self.cfg.bloom_filter_system());
        patient.set_identifier(
            Identifier::new(self.cfg.dic_pseudonym_system(), pseudonym.as_str())
                .with_type_coding(IDENTIFIER_PSEUDONYM_TYPE_SYSTEM, IDENTIFIER_PSEUDONYM_TYPE_CODE),
        );
    }
}

fn patient_id(patient: &Patient) -> String {
    patient.id.clone().unwrap_or_else(|| "<no id>".to_string())
}
