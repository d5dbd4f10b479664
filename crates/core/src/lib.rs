//! # Transfer Core
//!
//! Core logic for moving clinical data bundles between sites.
//!
//! This crate contains the four components of a transfer and the service tasks that wrap them:
//! - [`codec`]: authenticated encryption of bundles, with pseudonym redaction on the return path
//! - [`pseudonym`]: replacing a local patient reference with the destination pseudonym
//! - [`outcome`]: storing a bundle and classifying the result for the sequencer
//! - [`snapshot`]: merging differential profiles over their base definitions
//!
//! **No transport concerns**: repositories, the pseudonym resolution service and profile
//! lookup are reached through the traits in [`clients`]. In-memory and filesystem
//! implementations are provided for tests and the CLI.

pub mod clients;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod outcome;
pub mod pseudonym;
pub mod reference;
pub mod snapshot;
pub mod tasks;
pub mod validation;
pub mod variables;

pub use clients::{PatientRepository, PseudonymResolutionService, SchemaLookup, StoreOutcome};
pub use codec::{PayloadCodec, Redaction, ReturnKey};
pub use config::TransferConfig;
pub use error::{ClientError, ErrorKind, TransferError, TransferResult};
pub use outcome::{ContinueStatus, OutcomeClassifier, TransferOutcome};
pub use pseudonym::PseudonymResolver;
pub use reference::{BloomFilterDigest, PatientReference, Pseudonym};
pub use snapshot::{SnapshotGenerator, SnapshotWithMessages, ValidationMessage};
pub use tasks::{DecryptData, EncryptValidationError, InsertData, ResolvePseudonym, ServiceTask};
pub use variables::{ExecutionVariables, Variable};
