//! Guide configuration.
//!
//! Everything has a default, so an empty file (or `GuideConfig::default()`)
//! is valid. Example YAML:
//!
//! ```yaml
//! capabilities:
//!   singleFlightActions: true
//! state:
//!   initialPage: birthChart
//!   useDefaultRules: true
//!   modalFlags:
//!     settings: preferences.isSettingsOpen
//!   loadingFlags:
//!     - preferences.isSaving
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::GuideResult;
use crate::types::FlagPath;

/// Top-level guide configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuideConfig {
    pub capabilities: CapabilityConfig,
    pub state: StateConfig,
}

/// Capability registry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityConfig {
    /// Reject a call to an action that is still running from an earlier call.
    pub single_flight_actions: bool,
}

/// State registry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateConfig {
    /// `global.currentPage` before any feature sets it.
    pub initial_page: String,

    /// Start from the built-in modal/loading table.
    pub use_default_rules: bool,

    /// Extra modal name → flag path entries.
    pub modal_flags: IndexMap<String, FlagPath>,

    /// Extra loading flags.
    pub loading_flags: Vec<FlagPath>,
}

impl GuideConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> GuideResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> GuideResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&content)?;
        log::debug!("[GuideConfig] Loaded {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuideError;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = GuideConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, GuideConfig::default());
        assert!(!config.capabilities.single_flight_actions);
        assert!(!config.state.use_default_rules);
    }

    #[test]
    fn test_full_yaml() {
        let config = GuideConfig::from_yaml_str(
            r#"
capabilities:
  singleFlightActions: true
state:
  initialPage: birthChart
  useDefaultRules: true
  modalFlags:
    settings: preferences.isSettingsOpen
    about: preferences.about.isOpen
  loadingFlags:
    - preferences.isSaving
"#,
        )
        .unwrap();

        assert!(config.capabilities.single_flight_actions);
        assert_eq!(config.state.initial_page, "birthChart");
        assert_eq!(
            config.state.modal_flags.keys().collect::<Vec<_>>(),
            vec!["settings", "about"]
        );
        assert_eq!(
            config.state.modal_flags["about"].to_string(),
            "preferences.about.isOpen"
        );
        assert_eq!(config.state.loading_flags.len(), 1);
    }

    #[test]
    fn test_invalid_flag_path_rejected() {
        let err = GuideConfig::from_yaml_str("state:\n  loadingFlags: [justamodule]\n").unwrap_err();
        assert!(matches!(err, GuideError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "state:\n  initialPage: journal").unwrap();

        let config = GuideConfig::from_file(file.path()).unwrap();
        assert_eq!(config.state.initial_page, "journal");
        assert!(!config.capabilities.single_flight_actions);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GuideConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, GuideError::Io(_)));
    }
}
