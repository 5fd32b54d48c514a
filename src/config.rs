//! Server configuration.
//!
//! The editor sends configuration as `initializationOptions` and later via
//! `workspace/didChangeConfiguration`.  Either the bare object or one nested
//! under `fusionLsp` is accepted; every field is optional.
use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use tower_lsp::lsp_types::DiagnosticSeverity;

/// Key the configuration is nested under in editor settings.
pub const SECTION: &str = "fusionLsp";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to deserialize configuration")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Configuration {
    pub folders: FoldersConfig,
    pub diagnostics: DiagnosticsConfig,
    pub log: LogConfig,
    pub code: CodeConfig,
    pub inlay_hint: InlayHintConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FoldersConfig {
    /// Folders below the workspace root that contain packages.
    pub packages: Vec<String>,
    /// Fusion source folders, relative to each package.
    pub fusion: Vec<String>,
    /// Folder names (or root-relative paths) that are never scanned.
    pub ignore: Vec<String>,
    pub follow_symbolic_links: bool,
    pub include_hidden_directories: bool,
}

impl Default for FoldersConfig {
    fn default() -> Self {
        Self {
            packages: vec!["DistributionPackages".to_string(), "Packages".to_string()],
            fusion: vec!["Resources/Private/Fusion".to_string()],
            ignore: vec!["node_modules".to_string(), "Libraries".to_string()],
            follow_symbolic_links: true,
            include_hidden_directories: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub ignore: DiagnosticsIgnoreConfig,
    pub always_diagnose_changed_file: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: DiagnosticsIgnoreConfig::default(),
            always_diagnose_changed_file: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsIgnoreConfig {
    /// Files below these folders are parsed and indexed but never diagnosed.
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// A `tracing` filter directive such as `info` or `fusion_lsp=debug`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeConfig {
    pub deprecations: DeprecationsConfig,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DeprecationsConfig {
    pub fusion: FusionDeprecations,
    pub severity: DeprecationSeverity,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FusionDeprecations {
    /// Deprecated prototype name → replacement.
    pub prototypes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeprecationSeverity {
    Error,
    #[default]
    Warning,
    Info,
    Hint,
}

impl DeprecationSeverity {
    pub fn to_lsp(self) -> DiagnosticSeverity {
        match self {
            DeprecationSeverity::Error => DiagnosticSeverity::ERROR,
            DeprecationSeverity::Warning => DiagnosticSeverity::WARNING,
            DeprecationSeverity::Info => DiagnosticSeverity::INFORMATION,
            DeprecationSeverity::Hint => DiagnosticSeverity::HINT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InlayHintConfig {
    pub depth: InlayHintDepth,
}

/// Which helper call arguments get a parameter name hint.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InlayHintDepth {
    Disabled,
    /// Every argument except plain literals.
    NoLiteral,
    #[default]
    Always,
}

impl Configuration {
    /// Read configuration from an editor-supplied JSON value.
    ///
    /// `null` yields the defaults.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let value = value.get(SECTION).unwrap_or(value);
        if value.is_null() {
            return Ok(Self::default());
        }
        let mut configuration = Self::deserialize(value)?;
        configuration.drop_empty_folders();
        Ok(configuration)
    }

    /// An empty folder entry would match every path.
    fn drop_empty_folders(&mut self) {
        let is_blank = |folder: &String| folder.trim().trim_matches('/').is_empty();
        self.folders.ignore.retain(|f| !is_blank(f));
        self.diagnostics.ignore.folders.retain(|f| !is_blank(f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod defaults {
        use super::*;

        #[test]
        fn test_null_yields_defaults() {
            let config = Configuration::from_json(&serde_json::Value::Null).unwrap();
            assert_eq!(config, Configuration::default());
            assert!(config.diagnostics.enabled);
            assert_eq!(config.folders.packages, vec!["DistributionPackages", "Packages"]);
            assert_eq!(config.code.deprecations.severity, DeprecationSeverity::Warning);
        }

        #[test]
        fn test_partial_object_keeps_other_defaults() {
            let config = Configuration::from_json(&json!({
                "diagnostics": { "alwaysDiagnoseChangedFile": false }
            }))
            .unwrap();
            assert!(config.diagnostics.enabled);
            assert!(!config.diagnostics.always_diagnose_changed_file);
            assert_eq!(config.log.level, "info");
        }
    }

    mod sections {
        use super::*;

        #[test]
        fn test_nested_section() {
            let config = Configuration::from_json(&json!({
                "fusionLsp": {
                    "folders": { "fusion": ["Resources/Private/Fusion", "Resources/Private/Components"] },
                    "log": { "level": "debug" },
                    "code": {
                        "deprecations": {
                            "fusion": { "prototypes": { "Neos.Fusion:Array": "Neos.Fusion:Join" } },
                            "severity": "error"
                        }
                    }
                }
            }))
            .unwrap();
            assert_eq!(config.folders.fusion.len(), 2);
            assert_eq!(config.log.level, "debug");
            assert_eq!(
                config.code.deprecations.fusion.prototypes.get("Neos.Fusion:Array").map(String::as_str),
                Some("Neos.Fusion:Join")
            );
            assert_eq!(config.code.deprecations.severity.to_lsp(), DiagnosticSeverity::ERROR);
        }

        #[test]
        fn test_empty_ignore_folders_are_dropped() {
            let config = Configuration::from_json(&json!({
                "folders": { "ignore": ["", "node_modules"] },
                "diagnostics": { "ignore": { "folders": ["", "/", "Packages/Legacy"] } }
            }))
            .unwrap();
            assert_eq!(config.folders.ignore, vec!["node_modules"]);
            assert_eq!(config.diagnostics.ignore.folders, vec!["Packages/Legacy"]);
        }

        #[test]
        fn test_inlay_hint_depth() {
            let config = Configuration::from_json(&json!({ "inlayHint": { "depth": "noLiteral" } })).unwrap();
            assert_eq!(config.inlay_hint.depth, InlayHintDepth::NoLiteral);
            assert_eq!(Configuration::default().inlay_hint.depth, InlayHintDepth::Always);
        }

        #[test]
        fn test_wrong_type_is_an_error() {
            let result = Configuration::from_json(&json!({ "diagnostics": { "enabled": "yes" } }));
            assert!(matches!(result, Err(ConfigError::Deserialize(_))));
        }
    }
}
