//! One package of a workspace.
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::WorkspaceError;
use super::discovery::WalkOptions;
use super::settings::{self, NodeTypes};
use crate::composer::{self, ComposerManifest};

#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub manifest: ComposerManifest,
    /// Merged `Configuration/Settings*.yaml`.
    pub settings: Value,
    pub node_types: NodeTypes,
}

impl Package {
    /// Read the manifest and YAML configuration of the package at `path`.
    pub fn load(path: &Path, options: &WalkOptions) -> Result<Self, WorkspaceError> {
        let manifest = composer::parse_composer_json(path)
            .ok_or_else(|| WorkspaceError::Manifest(path.to_path_buf()))?;
        let mut package = Self {
            path: path.to_path_buf(),
            manifest,
            settings: Value::Null,
            node_types: NodeTypes::new(),
        };
        package.load_configuration(options);
        Ok(package)
    }

    /// Re-read the YAML configuration.
    pub fn load_configuration(&mut self, options: &WalkOptions) {
        self.settings = settings::load_merged(&settings::settings_files(&self.path));
        self.node_types = settings::load_node_types(&self.path, options);
    }

    /// Re-read `composer.json`; a manifest that no longer parses keeps the
    /// previous one.
    pub fn reload_manifest(&mut self) {
        if let Some(manifest) = composer::parse_composer_json(&self.path) {
            self.manifest = manifest;
        }
    }

    /// The package key, e.g. `Vendor.Site`.
    pub fn key(&self) -> Option<&str> {
        self.manifest.package_key.as_deref()
    }

    /// Name used in the workspace's package registry.
    pub fn name(&self) -> String {
        self.key()
            .map(str::to_string)
            .or_else(|| self.manifest.name.clone())
            .unwrap_or_else(|| {
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    /// Absolute path of a `resource://<key>/<relative>` target.
    pub fn resource_path(&self, relative: &str) -> PathBuf {
        self.path.join("Resources").join(relative.trim_start_matches('/'))
    }

    /// Existing Fusion source folders of this package.
    pub fn fusion_folders(&self, aliases: &[String]) -> Vec<PathBuf> {
        aliases
            .iter()
            .map(|alias| self.path.join(alias))
            .filter(|folder| folder.is_dir())
            .collect()
    }
}
