//! Binary configuration.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use stratum_enforce::MaskingConfig;
use stratum_engine::LifecycleConfig;
use stratum_storage::StoreConfig;

/// Everything the `stratum` binary can be configured with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratumConfig {
    /// Filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Masking placeholders and lengths
    pub masking: MaskingConfig,
    /// Store limits
    pub store: StoreConfig,
    /// Lifecycle options
    pub lifecycle: LifecycleConfig,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            log_filter: "stratum=info".to_string(),
            masking: MaskingConfig::default(),
            store: StoreConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl StratumConfig {
    /// Load from a JSON file, or defaults when `path` is `None`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&json).wrap_err_with(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_path() {
        let config = StratumConfig::load(None).unwrap();
        assert_eq!(config, StratumConfig::default());
        assert_eq!(config.masking.placeholder, "***");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"masking": {{"placeholder": "[hidden]"}}, "lifecycle": {{"require_rollback_reason": true}}}}"#
        )
        .unwrap();

        let config = StratumConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.masking.placeholder, "[hidden]");
        assert_eq!(config.masking.partial_keep, 2);
        assert!(config.lifecycle.require_rollback_reason);
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.log_filter, StratumConfig::default().log_filter);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(StratumConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StratumConfig::load(Some(&dir.path().join("absent.json"))).is_err());
    }
}
