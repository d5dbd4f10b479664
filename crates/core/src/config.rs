//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Services never read environment variables while handling a
//! workflow step.

use crate::constants::{
    DEFAULT_SCHEMA_DIR, NAMING_SYSTEM_BLOOM_FILTER, NAMING_SYSTEM_CRR_PSEUDONYM,
    NAMING_SYSTEM_DIC_PSEUDONYM, PSEUDONYM_PLACEHOLDER,
};
use crate::validation::{validate_naming_system_url, validate_placeholder};
use crate::{TransferError, TransferResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    bloom_filter_system: String,
    dic_pseudonym_system: String,
    crr_pseudonym_system: String,
    pseudonym_placeholder: String,
    schema_dir: PathBuf,
}

impl TransferConfig {
    /// Create a new `TransferConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] if a naming system is not a valid URL, the
    /// placeholder is unusable, or two naming systems coincide.
    pub fn new(
        bloom_filter_system: String,
        dic_pseudonym_system: String,
        crr_pseudonym_system: String,
        pseudonym_placeholder: String,
        schema_dir: PathBuf,
    ) -> TransferResult<Self> {
        validate_naming_system_url("bloom_filter_system", &bloom_filter_system)?;
        validate_naming_system_url("dic_pseudonym_system", &dic_pseudonym_system)?;
        validate_naming_system_url("crr_pseudonym_system", &crr_pseudonym_system)?;
        validate_placeholder(&pseudonym_placeholder)?;

        if dic_pseudonym_system == crr_pseudonym_system {
            return Err(TransferError::InvalidConfig(
                "dic_pseudonym_system and crr_pseudonym_system must differ".into(),
            ));
        }
        if bloom_filter_system == dic_pseudonym_system {
            return Err(TransferError::InvalidConfig(
                "bloom_filter_system and dic_pseudonym_system must differ".into(),
            ));
        }

        Ok(Self {
            bloom_filter_system,
            dic_pseudonym_system,
            crr_pseudonym_system,
            pseudonym_placeholder,
            schema_dir,
        })
    }

    /// Build a configuration from optional raw values (for example environment variables).
    ///
    /// `None` or empty/whitespace values fall back to the built-in defaults.
    pub fn from_env_values(
        bloom_filter_system: Option<String>,
        dic_pseudonym_system: Option<String>,
        crr_pseudonym_system: Option<String>,
        pseudonym_placeholder: Option<String>,
        schema_dir: Option<String>,
    ) -> TransferResult<Self> {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self::new(
            or_default(bloom_filter_system, NAMING_SYSTEM_BLOOM_FILTER),
            or_default(dic_pseudonym_system, NAMING_SYSTEM_DIC_PSEUDONYM),
            or_default(crr_pseudonym_system, NAMING_SYSTEM_CRR_PSEUDONYM),
            or_default(pseudonym_placeholder, PSEUDONYM_PLACEHOLDER),
            PathBuf::from(or_default(schema_dir, DEFAULT_SCHEMA_DIR)),
        )
    }

    pub fn bloom_filter_system(&self) -> &str {
        &self.bloom_filter_system
    }

    /// Naming system the resolver attaches pseudonyms under.
    pub fn dic_pseudonym_system(&self) -> &str {
        &self.dic_pseudonym_system
    }

    /// Naming system written into payloads returned to the originating site.
    pub fn crr_pseudonym_system(&self) -> &str {
        &self.crr_pseudonym_system
    }

    pub fn pseudonym_placeholder(&self) -> &str {
        &self.pseudonym_placeholder
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            bloom_filter_system: NAMING_SYSTEM_BLOOM_FILTER.to_string(),
            dic_pseudonym_system: NAMING_SYSTEM_DIC_PSEUDONYM.to_string(),
            crr_pseudonym_system: NAMING_SYSTEM_CRR_PSEUDONYM.to_string(),
            pseudonym_placeholder: PSEUDONYM_PLACEHOLDER.to_string(),
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_env_values_fall_back_to_defaults() {
        let cfg = TransferConfig::from_env_values(None, Some("  ".into()), None, None, None)
            .expect("defaults are valid");
        assert_eq!(cfg.bloom_filter_system(), NAMING_SYSTEM_BLOOM_FILTER);
        assert_eq!(cfg.dic_pseudonym_system(), NAMING_SYSTEM_DIC_PSEUDONYM);
        assert_eq!(cfg.crr_pseudonym_system(), NAMING_SYSTEM_CRR_PSEUDONYM);
        assert_eq!(cfg.pseudonym_placeholder(), PSEUDONYM_PLACEHOLDER);
        assert_eq!(cfg.schema_dir(), Path::new(DEFAULT_SCHEMA_DIR));
    }

    #[test]
    fn rejects_identical_pseudonym_systems() {
        let err = TransferConfig::from_env_values(
            None,
            Some("https://example.org/sid/psn".into()),
            Some("https://example.org/sid/psn".into()),
            None,
            None,
        )
        .expect_err("systems must differ");
        assert!(matches!(err, TransferError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_url_system() {
        let err = TransferConfig::from_env_values(Some("bloom".into()), None, None, None, None)
            .expect_err("not a url");
        assert!(err.to_string().contains("bloom_filter_system"));
    }
}
