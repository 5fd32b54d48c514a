//! Workspaces and packages.
//!
//! A [`Workspace`] is created per editor root folder.  It discovers the
//! packages below the root, merges their YAML configuration, parses every
//! Fusion file of every package and keeps the parsed files current as the
//! editor and the file system report changes.
pub mod discovery;
pub mod helpers;
pub mod package;
pub mod rebuild;
pub mod settings;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;
use thiserror::Error;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

pub use discovery::WalkOptions;
pub use helpers::EelHelperToken;
pub use package::Package;
pub use rebuild::RebuildGuard;
pub use settings::NodeTypes;

use crate::config::Configuration;
use crate::context::Context;
use crate::fusion::{NodeType, ParseError};
use crate::parsed_file::{IndexEnv, ParsedFile};
use crate::php::PhpResolver;
use crate::scope::ScopeResolver;

pub const RESOURCE_SCHEME: &str = "resource://";

/// Nodes that tie a file to a prototype.
const DEPENDENCY_NODE_TYPES: [NodeType; 3] = [
    NodeType::PrototypePathSegment,
    NodeType::FusionObjectValue,
    NodeType::PrototypeReference,
];

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("No readable composer.json in {}", .0.display())]
    Manifest(PathBuf),
    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{uri} does not parse: {error}")]
    Parse { uri: String, error: ParseError },
}

pub struct Workspace {
    pub name: String,
    pub root: PathBuf,
    pub uri: String,
    pub configuration: Configuration,
    pub packages: Vec<Package>,
    pub files: Vec<ParsedFile>,
    pub helpers: Vec<EelHelperToken>,
    /// Settings of every package merged in package order.
    pub settings: Value,
    pub node_types: NodeTypes,
    /// Problems met during the last [`init`](Self::init).
    pub errors: Vec<WorkspaceError>,
    context: Arc<Context>,
}

/// Parse one file against the given surroundings.
fn parse_file(
    context: &Context,
    packages: &[Package],
    helpers: &[EelHelperToken],
    uri: String,
    package: Option<String>,
    text: String,
) -> ParsedFile {
    let classes = PhpResolver::new(context, packages);
    let env = IndexEnv {
        context,
        helpers,
        classes: &classes,
    };
    let mut file = ParsedFile::new(uri, package);
    file.init(text, &env);
    file
}

/// `resource://Vendor.Site/Public/app.css` → `("Vendor.Site", "Public/app.css")`.
pub fn parse_resource_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix(RESOURCE_SCHEME)?;
    let (key, relative) = rest.split_once('/')?;
    if key.is_empty() {
        return None;
    }
    Some((key, relative))
}

impl Workspace {
    pub fn new(name: impl Into<String>, root: PathBuf, context: Arc<Context>) -> Self {
        let uri = Url::from_directory_path(&root)
            .map(|u| u.to_string())
            .unwrap_or_default();
        Self {
            name: name.into(),
            root,
            uri,
            configuration: Configuration::default(),
            packages: Vec::new(),
            files: Vec::new(),
            helpers: Vec::new(),
            settings: Value::Null,
            node_types: NodeTypes::new(),
            errors: Vec::new(),
            context,
        }
    }

    fn walk_options(&self) -> WalkOptions {
        WalkOptions::from_config(&self.configuration.folders)
    }

    fn clear(&mut self) {
        for file in &self.files {
            self.context.invalidate_file(&file.uri);
        }
        self.packages.clear();
        self.files.clear();
        self.helpers.clear();
        self.settings = Value::Null;
        self.node_types.clear();
        self.errors.clear();
    }

    /// Discover packages and parse every Fusion file from scratch.
    pub fn init(&mut self, configuration: Configuration) {
        self.clear();
        self.configuration = configuration;
        let options = self.walk_options();

        let package_paths =
            discovery::discover_packages(&self.root, &self.configuration.folders.packages, &options);
        for path in package_paths {
            match Package::load(&path, &options) {
                Ok(package) => self.packages.push(package),
                Err(err) => {
                    warn!(error = %err, "skipping package");
                    self.errors.push(err);
                }
            }
        }
        self.merge_package_configuration();

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for package in &self.packages {
            for folder in package.fusion_folders(&self.configuration.folders.fusion) {
                for path in discovery::discover_fusion_files(&folder, &options) {
                    if seen.insert(path.clone()) {
                        sources.push((path, package.key().map(str::to_string)));
                    }
                }
            }
        }

        for (path, package) in sources {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "failed to read fusion file");
                    self.errors.push(WorkspaceError::Io { path, source });
                    continue;
                }
            };
            let Ok(uri) = Url::from_file_path(&path) else {
                continue;
            };
            let file = parse_file(
                &self.context,
                &self.packages,
                &self.helpers,
                uri.to_string(),
                package,
                text,
            );
            if let Some(error) = file.error() {
                self.errors.push(WorkspaceError::Parse {
                    uri: file.uri.clone(),
                    error: error.clone(),
                });
            }
            self.files.push(file);
        }

        info!(
            workspace = %self.name,
            packages = self.packages.len(),
            files = self.files.len(),
            errors = self.errors.len(),
            "workspace initialized"
        );
    }

    /// Merge package settings and node types and rebuild the helper tokens.
    fn merge_package_configuration(&mut self) {
        let mut merged = Value::Null;
        let mut node_types = NodeTypes::new();
        for package in &self.packages {
            settings::merge(&mut merged, package.settings.clone());
            node_types.extend(package.node_types.clone());
        }
        self.settings = merged;
        self.node_types = node_types;
        self.refresh_helpers();
    }

    /// Re-resolve the EEL helper classes.
    pub fn refresh_helpers(&mut self) {
        let classes = PhpResolver::new(&self.context, &self.packages);
        self.helpers = helpers::build_tokens(&self.settings, &classes);
        debug!(workspace = %self.name, helpers = self.helpers.len(), "helpers resolved");
    }

    /// Re-read every package's manifest and YAML configuration.  Returns
    /// whether the node type definitions changed.
    pub fn reload_package_configuration(&mut self) -> bool {
        let options = self.walk_options();
        let previous = std::mem::take(&mut self.node_types);
        for package in &mut self.packages {
            package.reload_manifest();
            package.load_configuration(&options);
        }
        self.merge_package_configuration();
        self.reindex_all();
        previous != self.node_types
    }

    /// Re-run indexing of every file with its current text.
    pub fn reindex_all(&mut self) {
        let classes = PhpResolver::new(&self.context, &self.packages);
        let env = IndexEnv {
            context: &self.context,
            helpers: &self.helpers,
            classes: &classes,
        };
        for file in &mut self.files {
            let text = file.text().to_string();
            file.init(text, &env);
        }
    }

    // ── files ───────────────────────────────────────────────────────────

    pub fn file_index(&self, uri: &str) -> Option<usize> {
        self.files.iter().position(|f| f.uri == uri)
    }

    pub fn file(&self, uri: &str) -> Option<&ParsedFile> {
        self.files.iter().find(|f| f.uri == uri)
    }

    /// Whether `path` lies below this workspace's root.
    pub fn contains_path(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// The innermost package containing `path`.
    pub fn package_for_path(&self, path: &Path) -> Option<&Package> {
        self.packages
            .iter()
            .filter(|p| p.contains(path))
            .max_by_key(|p| p.path.components().count())
    }

    pub fn package_by_key(&self, key: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.key() == Some(key))
    }

    /// Re-index the file at `uri` with new text.  Returns its index, or
    /// `None` when the workspace does not know the file.
    pub fn update_file_by_change(&mut self, uri: &str, text: String) -> Option<usize> {
        let index = self.file_index(uri)?;
        let classes = PhpResolver::new(&self.context, &self.packages);
        let env = IndexEnv {
            context: &self.context,
            helpers: &self.helpers,
            classes: &classes,
        };
        self.files[index].init(text, &env);
        Some(index)
    }

    /// Add a newly created file, or update it when already known.
    pub fn add_file(&mut self, uri: &str, text: String) -> usize {
        if let Some(index) = self.update_file_by_change(uri, text.clone()) {
            return index;
        }
        let package = Url::parse(uri)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .and_then(|path| self.package_for_path(&path).and_then(Package::key).map(str::to_string));
        let file = parse_file(
            &self.context,
            &self.packages,
            &self.helpers,
            uri.to_string(),
            package,
            text,
        );
        self.files.push(file);
        self.files.len() - 1
    }

    /// Forget the file at `uri` and everything cached for it.
    pub fn remove_file(&mut self, uri: &str) -> bool {
        let Some(index) = self.file_index(uri) else {
            return false;
        };
        self.files.remove(index);
        self.context.invalidate_file(uri);
        true
    }

    /// Whether diagnostics are produced for the file at `uri`.
    pub fn is_diagnosable(&self, uri: &str) -> bool {
        if !self.configuration.diagnostics.enabled {
            return false;
        }
        let Some(path) = Url::parse(uri).ok().and_then(|u| u.to_file_path().ok()) else {
            return true;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(&path);
        !self
            .configuration
            .diagnostics
            .ignore
            .folders
            .iter()
            .map(|folder| folder.trim().trim_matches('/'))
            .any(|folder| !folder.is_empty() && relative.starts_with(folder))
    }

    /// URIs of every file the ignore-folder policy lets through.
    pub fn files_to_diagnose(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| self.is_diagnosable(&f.uri))
            .map(|f| f.uri.clone())
            .collect()
    }

    // ── queries ─────────────────────────────────────────────────────────

    pub fn scope(&self) -> ScopeResolver<'_> {
        ScopeResolver::new(&self.files)
    }

    pub fn classes(&self) -> PhpResolver<'_> {
        PhpResolver::new(&self.context, &self.packages)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Every prototype name created or overwritten somewhere.
    pub fn prototype_names(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|file| {
                file.prototype_creations()
                    .iter()
                    .chain(file.prototype_overwrites())
                    .filter_map(|&segment| file.document().segment_identifier(segment))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Prototypes created or overwritten in the file at `uri`.
    pub fn declared_prototypes(&self, uri: &str) -> BTreeSet<String> {
        let Some(file) = self.file(uri) else {
            return BTreeSet::new();
        };
        file.prototype_creations()
            .iter()
            .chain(file.prototype_overwrites())
            .filter_map(|&segment| file.document().segment_identifier(segment))
            .map(str::to_string)
            .collect()
    }

    /// Diagnosable files that declare or use a prototype whose inheritance
    /// chain reaches one of `prototypes`.
    pub fn dependent_files(&self, prototypes: &BTreeSet<String>) -> Vec<String> {
        if prototypes.is_empty() {
            return Vec::new();
        }
        let scope = self.scope();
        let mut reaches: HashMap<String, bool> = HashMap::new();
        let mut depends = |name: &str| -> bool {
            if let Some(&known) = reaches.get(name) {
                return known;
            }
            let found = scope.prototype_chain(name).iter().any(|p| prototypes.contains(p));
            reaches.insert(name.to_string(), found);
            found
        };

        self.files
            .iter()
            .filter(|file| {
                DEPENDENCY_NODE_TYPES.iter().any(|&node_type| {
                    file.nodes_of_type(node_type)
                        .iter()
                        .filter_map(|&node| file.kind(node).prototype_name())
                        .any(&mut depends)
                })
            })
            .filter(|file| self.is_diagnosable(&file.uri))
            .map(|file| file.uri.clone())
            .collect()
    }

    /// Whether any file creates `prototype` with `prototype(A) < prototype(B)`.
    pub fn is_prototype_created(&self, prototype: &str) -> bool {
        self.files.iter().any(|file| {
            file.prototype_creations()
                .iter()
                .any(|&s| file.document().segment_identifier(s) == Some(prototype))
        })
    }

    /// Package keys of every package, used to tell own prototypes from
    /// ones provided by code outside the workspace.
    pub fn package_keys(&self) -> Vec<&str> {
        self.packages.iter().filter_map(Package::key).collect()
    }

    pub fn helper(&self, name: &str) -> Option<&EelHelperToken> {
        self.helpers.iter().find(|h| h.name == name)
    }

    /// Absolute path of a `resource://` URI.
    pub fn resolve_resource(&self, uri: &str) -> Option<PathBuf> {
        let (key, relative) = parse_resource_uri(uri)?;
        Some(self.package_by_key(key)?.resource_path(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create dirs");
        }
        fs::write(path, content).expect("failed to write");
    }

    fn site(root: &Path) {
        let package = "DistributionPackages/Vendor.Site";
        write(
            root,
            &format!("{}/composer.json", package),
            r#"{ "name": "vendor/site", "autoload": { "psr-4": { "Vendor\\Site\\": "Classes/" } } }"#,
        );
        write(
            root,
            &format!("{}/Configuration/Settings.yaml", package),
            "Neos:\n  Fusion:\n    defaultContext:\n      Site: 'Vendor\\Site\\Helper'\n",
        );
        write(
            root,
            &format!("{}/Configuration/NodeTypes.yaml", package),
            "'Vendor.Site:Content.Text':\n  superTypes: {}\n",
        );
        write(
            root,
            &format!("{}/Classes/Helper.php", package),
            "<?php\nnamespace Vendor\\Site;\n\nclass Helper\n{\n    public function greet(string $name): string\n    {\n    }\n}\n",
        );
        write(
            root,
            &format!("{}/Resources/Private/Fusion/Root.fusion", package),
            "prototype(Vendor.Site:Card) < prototype(Neos.Fusion:Component) {\n    title = ''\n    renderer = ${Site.greet(props.title)}\n}\n",
        );
        write(
            root,
            &format!("{}/Resources/Private/Fusion/Broken.fusion", package),
            "a = \n",
        );
        write(root, &format!("{}/Resources/Public/app.css", package), "");
    }

    fn workspace(root: &Path) -> Workspace {
        let mut workspace = Workspace::new("test", root.to_path_buf(), Arc::new(Context::new()));
        workspace.init(Configuration::default());
        workspace
    }

    fn file_uri(path: &Path) -> String {
        Url::from_file_path(path).expect("absolute path").to_string()
    }

    #[test]
    fn test_init_discovers_packages_and_files() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        site(dir.path());
        let workspace = workspace(dir.path());

        assert_eq!(workspace.packages.len(), 1);
        assert_eq!(workspace.package_keys(), vec!["Vendor.Site"]);
        assert_eq!(workspace.files.len(), 2);
        assert_eq!(workspace.errors.len(), 1);
        assert!(matches!(workspace.errors[0], WorkspaceError::Parse { .. }));
        assert!(workspace.node_types.contains_key("Vendor.Site:Content.Text"));

        let helper = workspace.helper("Site").expect("helper token");
        assert!(helper.method("greet").is_some());

        assert!(workspace.prototype_names().contains("Vendor.Site:Card"));
        assert!(workspace.is_prototype_created("Vendor.Site:Card"));
        assert!(workspace.files.iter().all(|f| f.package.as_deref() == Some("Vendor.Site")));
    }

    #[test]
    fn test_resource_resolution() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        site(dir.path());
        let workspace = workspace(dir.path());

        let path = workspace
            .resolve_resource("resource://Vendor.Site/Public/app.css")
            .expect("resource resolves");
        assert!(path.is_file());
        assert!(workspace.resolve_resource("resource://Other.Package/Public/app.css").is_none());
        assert_eq!(parse_resource_uri("resource:///x"), None);
    }

    #[test]
    fn test_file_lifecycle() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        site(dir.path());
        let mut workspace = workspace(dir.path());

        let path = dir
            .path()
            .join("DistributionPackages/Vendor.Site/Resources/Private/Fusion/New.fusion");
        let uri = file_uri(&path);
        let index = workspace.add_file(&uri, "prototype(Vendor.Site:New) < prototype(Neos.Fusion:Value)\n".to_string());
        assert_eq!(workspace.files[index].package.as_deref(), Some("Vendor.Site"));
        assert!(workspace.is_prototype_created("Vendor.Site:New"));

        workspace.update_file_by_change(&uri, "x = 1\n".to_string());
        assert!(!workspace.is_prototype_created("Vendor.Site:New"));

        assert!(workspace.remove_file(&uri));
        assert!(!workspace.remove_file(&uri));
        assert!(workspace.file(&uri).is_none());
        assert_eq!(workspace.update_file_by_change(&uri, String::new()), None);
    }

    #[test]
    fn test_diagnostics_ignore_folders() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        site(dir.path());
        let mut configuration = Configuration::default();
        configuration.diagnostics.ignore.folders = vec!["DistributionPackages/Vendor.Site/Resources/Private/Fusion".to_string()];
        let mut workspace = Workspace::new("test", dir.path().to_path_buf(), Arc::new(Context::new()));
        workspace.init(configuration);

        assert_eq!(workspace.files.len(), 2);
        assert!(workspace.files_to_diagnose().is_empty());

        workspace.configuration.diagnostics.ignore.folders = vec![String::new(), "/".to_string()];
        assert_eq!(workspace.files_to_diagnose().len(), 2);

        workspace.configuration.diagnostics.ignore.folders.clear();
        assert_eq!(workspace.files_to_diagnose().len(), 2);

        workspace.configuration.diagnostics.enabled = false;
        assert!(workspace.files_to_diagnose().is_empty());
    }

    #[test]
    fn test_reload_reports_node_type_changes() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        site(dir.path());
        let mut workspace = workspace(dir.path());

        assert!(!workspace.reload_package_configuration());

        write(
            dir.path(),
            "DistributionPackages/Vendor.Site/Configuration/NodeTypes.Extra.yaml",
            "'Vendor.Site:Content.Image':\n  superTypes: {}\n",
        );
        assert!(workspace.reload_package_configuration());
        assert!(workspace.node_types.contains_key("Vendor.Site:Content.Image"));
    }
}
