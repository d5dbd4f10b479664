//! Schema lookup backed by a directory of profile files.
//!
//! Every `*.json`, `*.yaml` and `*.yml` file below the directory that parses as a
//! StructureDefinition is indexed by `url` and, when versioned, by `url|version`. Files that do
//! not parse are logged and skipped so that one broken profile does not take down the lookup.

use super::memory::InMemorySchemaLookup;
use super::SchemaLookup;
use crate::{TransferError, TransferResult};
use fhir::StructureDefinition;
use std::fs;
use std::path::Path;

/// Read-only lookup loaded once from disk.
#[derive(Debug, Default)]
pub struct DirectorySchemaLookup {
    inner: InMemorySchemaLookup,
    loaded: usize,
}

impl DirectorySchemaLookup {
    /// Load all structure definitions found under `dir` (recursively).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::SchemaDirectory`] if `dir` or one of its subdirectories cannot
    /// be read.
    pub fn load(dir: &Path) -> TransferResult<Self> {
        let mut lookup = Self::default();
        lookup.scan(dir)?;
        tracing::debug!(dir = %dir.display(), definitions = lookup.loaded, "loaded profiles");
        Ok(lookup)
    }

    /// Number of definitions indexed.
    pub fn len(&self) -> usize {
        self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.loaded == 0
    }

    fn scan(&mut self, dir: &Path) -> TransferResult<()> {
        let io_err = |source| TransferError::SchemaDirectory {
            path: dir.to_path_buf(),
            source,
        };

        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();

            // Symlinked directories are not followed.
            if entry.file_type().map_err(io_err)?.is_dir() {
                self.scan(&path)?;
                continue;
            }

            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let parsed = match extension {
                "json" => fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|text| StructureDefinition::parse(&text).map_err(|e| e.to_string())),
                "yaml" | "yml" => fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|text| {
                        StructureDefinition::parse_yaml(&text).map_err(|e| e.to_string())
                    }),
                _ => continue,
            };

            match parsed {
                Ok(definition) => {
                    self.inner.insert(definition);
                    self.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("skipping profile {}: {}", path.display(), e);
                }
            }
        }

        Ok(())
    }
}

impl SchemaLookup for DirectorySchemaLookup {
    fn fetch_by_url(&self, url: &str) -> Option<StructureDefinition> {
        self.inner.fetch_by_url(url)
    }
}
