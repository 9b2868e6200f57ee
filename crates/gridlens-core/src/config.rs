//! Analysis configuration, loaded from TOML.
//!
//! ```toml
//! structural_constants = [0, 1, 12, 100]
//! dominance_scope = "same_sheet"
//! disabled_detectors = ["cross_sheet_spaghetti"]
//!
//! [recovery]
//! provider = "command"
//! command = ["label-helper", "--json"]
//! timeout_ms = 3000
//! ```

use serde::Deserialize;
use std::path::Path;

use gridlens_engine::engine::{MAX_DEPENDENCY_RANGE_CELLS, TraversalScope};

use crate::error::{GridlensError, Result};

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominanceScope {
    #[default]
    AllSheets,
    SameSheet,
}

impl From<DominanceScope> for TraversalScope {
    fn from(scope: DominanceScope) -> Self {
        match scope {
            DominanceScope::AllSheets => TraversalScope::AllSheets,
            DominanceScope::SameSheet => TraversalScope::SameSheet,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryProvider {
    #[default]
    None,
    /// Run an external program that answers label requests on stdin/stdout.
    Command,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryConfig {
    pub provider: RecoveryProvider,
    pub command: Vec<String>,
    pub timeout_ms: u64,
    /// Extra attempts after a failed call.
    pub retries: u32,
    /// Rows above and below the target included in the request window.
    pub window_rows: usize,
    /// Columns left and right of the target included in the request window.
    pub window_cols: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            provider: RecoveryProvider::None,
            command: Vec::new(),
            timeout_ms: 5000,
            retries: 1,
            window_rows: 2,
            window_cols: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Literals that carry no business meaning; reported at Low severity.
    pub structural_constants: Vec<f64>,
    /// User additions to `structural_constants`.
    pub allowed_constants: Vec<f64>,
    /// How many rows above a cell are scanned for a column label.
    pub header_rows: usize,
    pub max_cycles: usize,
    pub dominance_scope: DominanceScope,
    /// Graphs with more nodes than this use bounded-radius dominance.
    pub neighborhood_threshold: usize,
    pub neighborhood_radius: usize,
    pub max_range_cells: usize,
    /// Detector names to skip (see `DetectorRegistry::names`).
    pub disabled_detectors: Vec<String>,
    pub recovery: RecoveryConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            structural_constants: vec![0.0, 1.0, 12.0, 24.0, 60.0, 100.0, 365.0, 1000.0, 1_000_000.0],
            allowed_constants: Vec::new(),
            header_rows: 20,
            max_cycles: 100,
            dominance_scope: DominanceScope::AllSheets,
            neighborhood_threshold: 50_000,
            neighborhood_radius: 3,
            max_range_cells: MAX_DEPENDENCY_RANGE_CELLS,
            disabled_detectors: Vec::new(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GridlensError::Config(e.to_string()))
    }

    /// Literal counts as structurally meaningless.
    pub fn is_allowed_constant(&self, value: f64) -> bool {
        self.structural_constants
            .iter()
            .chain(self.allowed_constants.iter())
            .any(|c| (c - value).abs() < 1e-9)
    }

    pub fn detector_enabled(&self, name: &str) -> bool {
        !self.disabled_detectors.iter().any(|d| d == name)
    }
}

/// Load configuration from `path` if given and present.
///
/// Problems never abort: defaults are used and a warning is returned for
/// each one. `explicit` marks a user-supplied path, whose absence is worth a
/// warning.
pub fn load_config(path: Option<&Path>, explicit: bool) -> (AnalysisConfig, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(path) = path else {
        return (AnalysisConfig::default(), warnings);
    };
    if !path.exists() {
        if explicit {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (AnalysisConfig::default(), warnings);
    }
    let config = match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            None
        }
        Ok(_) => match std::fs::read_to_string(path) {
            Ok(content) => match AnalysisConfig::from_toml_str(&content) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                    None
                }
            },
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                None
            }
        },
        Err(err) => {
            warnings.push(format!(
                "Failed to read metadata for {}: {}",
                path.display(),
                err
            ));
            None
        }
    };
    (config.unwrap_or_default(), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_empty() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert!(config.is_allowed_constant(12.0));
        assert!(!config.is_allowed_constant(201.26));
    }

    #[test]
    fn test_partial_override() {
        let config = AnalysisConfig::from_toml_str(
            "allowed_constants = [7.5]\ndominance_scope = \"same_sheet\"\n[recovery]\ntimeout_ms = 10\n",
        )
        .unwrap();
        assert!(config.is_allowed_constant(7.5));
        assert_eq!(config.dominance_scope, DominanceScope::SameSheet);
        assert_eq!(config.recovery.timeout_ms, 10);
        assert_eq!(config.recovery.window_rows, 2);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = AnalysisConfig::from_toml_str("max_cycle = 3").unwrap_err();
        assert!(matches!(err, GridlensError::Config(_)));
    }

    #[test]
    fn test_load_config_reports_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "header_rows = \"many\"").unwrap();
        let (config, warnings) = load_config(Some(file.path()), true);
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Failed to parse"));
    }

    #[test]
    fn test_missing_default_path_is_silent() {
        let (_, warnings) = load_config(Some(Path::new("/nonexistent/gridlens.toml")), false);
        assert!(warnings.is_empty());
        let (_, warnings) = load_config(Some(Path::new("/nonexistent/gridlens.toml")), true);
        assert_eq!(warnings.len(), 1);
    }
}
