//! In-memory collaborators.
//!
//! These keep their state behind a mutex and count calls, which lets tests assert on side
//! effects (how often the resolution service was hit, what was persisted).

use super::{PatientRepository, PseudonymResolutionService, SchemaLookup, StoreOutcome};
use crate::error::ClientError;
use crate::reference::{BloomFilterDigest, Pseudonym};
use fhir::{Bundle, Patient, StructureDefinition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted response for [`InMemoryRepository::store_bundle`].
#[derive(Clone, Debug)]
pub enum StoreBehaviour {
    /// Commit and echo the bundle back as `transaction-response`.
    Accept,
    /// Reject with the given result bundle.
    Reject(Bundle),
    /// Fail with a connection error.
    Unavailable,
}

/// Patient repository keyed by absolute reference.
#[derive(Debug)]
pub struct InMemoryRepository {
    patients: Mutex<HashMap<String, Patient>>,
    stored: Mutex<Vec<Bundle>>,
    store_behaviour: Mutex<StoreBehaviour>,
    fail_updates: Mutex<bool>,
    updates: AtomicUsize,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self {
            patients: Mutex::new(HashMap::new()),
            stored: Mutex::new(Vec::new()),
            store_behaviour: Mutex::new(StoreBehaviour::Accept),
            fail_updates: Mutex::new(false),
            updates: AtomicUsize::new(0),
        }
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a patient under `reference`.
    pub fn insert_patient(&self, reference: impl Into<String>, patient: Patient) {
        lock(&self.patients).insert(reference.into(), patient);
    }

    /// Current copy of the patient stored under `reference`.
    pub fn patient(&self, reference: &str) -> Option<Patient> {
        lock(&self.patients).get(reference).cloned()
    }

    pub fn set_store_behaviour(&self, behaviour: StoreBehaviour) {
        *lock(&self.store_behaviour) = behaviour;
    }

    pub fn set_fail_updates(&self, fail: bool) {
        *lock(&self.fail_updates) = fail;
    }

    /// Number of successful patient updates.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Bundles committed so far.
    pub fn stored_bundles(&self) -> Vec<Bundle> {
        lock(&self.stored).clone()
    }
}

impl PatientRepository for InMemoryRepository {
    fn get_patient(&self, reference: &str) -> Result<Option<Patient>, ClientError> {
        Ok(lock(&self.patients).get(reference).cloned())
    }

    fn update_patient(&self, patient: &Patient) -> Result<(), ClientError> {
        if *lock(&self.fail_updates) {
            return Err(ClientError::Connection("repository unavailable".into()));
        }

        let mut patients = lock(&self.patients);
        let entry = patients
            .iter_mut()
            .find(|(_, stored)| stored.id.is_some() && stored.id == patient.id)
            .ok_or_else(|| {
                ClientError::Server {
                    status: 404,
                    message: format!("patient {:?} does not exist", patient.id),
                }
            })?;
        *entry.1 = patient.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn store_bundle(&self, bundle: &Bundle) -> Result<StoreOutcome, ClientError> {
        let behaviour = lock(&self.store_behaviour).clone();
        match behaviour {
            StoreBehaviour::Accept => {
                lock(&self.stored).push(bundle.clone());
                let mut response = bundle.clone();
                response.bundle_type = "transaction-response".to_string();
                Ok(StoreOutcome::Stored(response))
            }
            StoreBehaviour::Reject(result) => Ok(StoreOutcome::Rejected(result)),
            StoreBehaviour::Unavailable => {
                Err(ClientError::Connection("connection refused".into()))
            }
        }
    }
}

/// Resolution service backed by a digest → pseudonym map.
#[derive(Debug, Default)]
pub struct InMemoryResolutionService {
    pseudonyms: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl InMemoryResolutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, digest: impl Into<String>, pseudonym: impl Into<String>) {
        lock(&self.pseudonyms).insert(digest.into(), pseudonym.into());
    }

    /// Number of `resolve_digest` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PseudonymResolutionService for InMemoryResolutionService {
    fn resolve_digest(&self, digest: &BloomFilterDigest) -> Result<Option<Pseudonym>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.pseudonyms)
            .get(digest.as_str())
            .map(|p| Pseudonym::new(p.as_str())))
    }
}

/// Schema lookup over a fixed set of definitions.
#[derive(Debug, Default)]
pub struct InMemorySchemaLookup {
    definitions: HashMap<String, StructureDefinition>,
}

impl InMemorySchemaLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` under its `url` and, when versioned, `url|version`.
    pub fn insert(&mut self, definition: StructureDefinition) {
        if definition.version.is_some() {
            self.definitions
                .insert(definition.canonical(), definition.clone());
        }
        self.definitions.insert(definition.url.clone(), definition);
    }
}

impl SchemaLookup for InMemorySchemaLookup {
    fn fetch_by_url(&self, url: &str) -> Option<StructureDefinition> {
        self.definitions.get(url).cloned()
    }
}
