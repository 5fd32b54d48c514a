//! YAML settings and node type definitions.
//!
//! Settings files are deep-merged: mappings merge key by key, any other
//! value is replaced by the later file.  Files are applied in path order so
//! `Settings.Foo.yaml` reliably overrides `Settings.yaml`.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::warn;

use super::discovery::{self, WalkOptions};

/// Node type name → definition.
pub type NodeTypes = BTreeMap<String, Value>;

/// Merge `overlay` into `base`.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        // `~` in a later file does not wipe an earlier mapping
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// Follow `path` through nested mappings.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Read and merge the given YAML files.  Files that fail to read or parse
/// are skipped with a warning.
pub fn load_merged(paths: &[PathBuf]) -> Value {
    let mut merged = Value::Mapping(Default::default());
    for path in paths {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), %err, "could not read YAML file");
                continue;
            }
        };
        match serde_yaml::from_str::<Value>(&content) {
            Ok(value) => merge(&mut merged, value),
            Err(err) => warn!(path = %path.display(), %err, "could not parse YAML file"),
        }
    }
    merged
}

/// `Configuration/Settings*.yaml` of a package, sorted.
pub fn settings_files(package_root: &Path) -> Vec<PathBuf> {
    configuration_files(package_root, "Settings")
}

/// `Configuration/NodeTypes*.yaml` plus everything under `NodeTypes/`.
pub fn node_type_files(package_root: &Path, options: &WalkOptions) -> Vec<PathBuf> {
    let mut files = configuration_files(package_root, "NodeTypes");
    let folder = package_root.join("NodeTypes");
    if folder.is_dir() {
        files.extend(discovery::walk_files(&folder, options, is_yaml));
    }
    files
}

/// Merged node type definitions of a package.
pub fn load_node_types(package_root: &Path, options: &WalkOptions) -> NodeTypes {
    match load_merged(&node_type_files(package_root, options)) {
        Value::Mapping(mapping) => mapping
            .into_iter()
            .filter_map(|(name, definition)| Some((name.as_str()?.to_string(), definition)))
            .collect(),
        _ => NodeTypes::new(),
    }
}

/// Whether `path` is a file that can change node type definitions.
pub fn is_node_type_file(path: &Path) -> bool {
    is_yaml(path)
        && (path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("NodeTypes"))
            || path.components().any(|c| c.as_os_str() == "NodeTypes"))
}

pub fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

fn configuration_files(package_root: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(package_root.join("Configuration")) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && is_yaml(path)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    // the plain `Settings.yaml` first, suffixed variants override it
    let plain = format!("{}.yaml", prefix);
    files.sort_by_key(|path| (path.file_name().is_none_or(|n| n != plain.as_str()), path.clone()));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).expect("valid yaml")
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = yaml("a:\n  b: 1\n  c: 2\nlist: [1, 2]\n");
        merge(&mut base, yaml("a:\n  c: 3\n  d: 4\nlist: [3]\n"));
        assert_eq!(base, yaml("a:\n  b: 1\n  c: 3\n  d: 4\nlist: [3]\n"));

        merge(&mut base, yaml("a: ~\n"));
        assert_eq!(lookup(&base, &["a", "b"]).and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_settings_and_node_types_from_package() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("Configuration")).expect("failed to create dirs");
        fs::create_dir_all(root.join("NodeTypes/Content")).expect("failed to create dirs");
        fs::write(root.join("Configuration/Settings.yaml"), "Vendor:\n  a: 1\n  b: 1\n")
            .expect("failed to write");
        fs::write(root.join("Configuration/Settings.Extra.yaml"), "Vendor:\n  b: 2\n")
            .expect("failed to write");
        fs::write(root.join("Configuration/Other.yaml"), "Vendor:\n  c: 3\n")
            .expect("failed to write");
        fs::write(
            root.join("Configuration/NodeTypes.Page.yaml"),
            "'Vendor.Site:Document.Page':\n  superTypes: {}\n",
        )
        .expect("failed to write");
        fs::write(
            root.join("NodeTypes/Content/Text.yaml"),
            "'Vendor.Site:Content.Text': {}\n",
        )
        .expect("failed to write");

        let settings = load_merged(&settings_files(root));
        assert_eq!(lookup(&settings, &["Vendor", "a"]).and_then(Value::as_i64), Some(1));
        assert_eq!(lookup(&settings, &["Vendor", "b"]).and_then(Value::as_i64), Some(2));
        assert_eq!(lookup(&settings, &["Vendor", "c"]), None);

        let node_types = load_node_types(root, &WalkOptions::default());
        let names: Vec<&str> = node_types.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Vendor.Site:Content.Text", "Vendor.Site:Document.Page"]);

        assert!(is_node_type_file(&root.join("NodeTypes/Content/Text.yaml")));
        assert!(is_node_type_file(&root.join("Configuration/NodeTypes.Page.yaml")));
        assert!(!is_node_type_file(&root.join("Configuration/Settings.yaml")));
    }
}
