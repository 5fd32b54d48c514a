/// Package manifest support.
///
/// Every package in a workspace is a directory with a `composer.json`.  This
/// module reads the parts of it the server cares about: the composer name,
/// the package key used by `resource://` URIs and prototype namespaces, and
/// the PSR-4 autoload map used to find PHP classes.
///
/// # PSR-4 Resolution
///
/// Given a mapping like `"Vendor\\Site\\" => "Classes/"`, a class name like
/// `Vendor\Site\Eel\FooHelper` is resolved by:
///   1. Stripping the matching prefix (`Vendor\Site\`) from the class name
///   2. Converting remaining namespace separators to directory separators
///   3. Appending `.php`
///   4. Prepending the mapped base directory
///
/// Result: `<package>/Classes/Eel/FooHelper.php`
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// A single PSR-4 namespace-to-directory mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psr4Mapping {
    /// The namespace prefix, always ending with `\` (e.g. `"Vendor\Site\"`).
    pub prefix: String,
    /// The base directory relative to the package root (e.g. `"Classes/"`).
    pub base_path: String,
}

/// What the server knows about a package from its `composer.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerManifest {
    /// Composer name, e.g. `vendor/site-package`.
    pub name: Option<String>,
    /// Composer `type`, e.g. `neos-site`.
    pub package_type: Option<String>,
    /// Dotted package key, e.g. `Vendor.SitePackage`.
    pub package_key: Option<String>,
    /// Sorted longest prefix first.
    pub autoload: Vec<Psr4Mapping>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(rename = "type")]
    package_type: Option<String>,
    #[serde(default)]
    autoload: RawAutoload,
    #[serde(default, rename = "autoload-dev")]
    autoload_dev: RawAutoload,
    #[serde(default)]
    extra: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawAutoload {
    #[serde(default, rename = "psr-4")]
    psr4: serde_json::Map<String, serde_json::Value>,
}

/// Parse the `composer.json` in `package_root`.
///
/// Returns `None` if the file doesn't exist or isn't valid JSON.
pub fn parse_composer_json(package_root: &Path) -> Option<ComposerManifest> {
    let content = std::fs::read_to_string(package_root.join("composer.json")).ok()?;
    parse_manifest(&content)
}

/// Parse manifest text.
pub fn parse_manifest(content: &str) -> Option<ComposerManifest> {
    let raw: RawManifest = serde_json::from_str(content).ok()?;

    let mut autoload = Vec::new();
    for section in [&raw.autoload, &raw.autoload_dev] {
        for (prefix, paths) in &section.psr4 {
            extract_psr4_entries(prefix, paths, &mut autoload);
        }
    }
    // Sort by prefix length descending so longest-prefix-first matching works
    autoload.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

    let package_key = raw
        .extra
        .pointer("/neos/package-key")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| raw.name.as_deref().map(package_key_from_name));

    Some(ComposerManifest {
        name: raw.name,
        package_type: raw.package_type,
        package_key,
        autoload,
    })
}

/// Derive a package key from a composer name.
///
/// `vendor/site-package` becomes `Vendor.SitePackage`.
pub fn package_key_from_name(name: &str) -> String {
    name.split('/')
        .map(|part| {
            part.split(['-', '_', '.'])
                .filter(|word| !word.is_empty())
                .map(upper_first)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// The PHP namespace of a package key: `Vendor.Site` → `Vendor\Site`.
pub fn namespace_of_package_key(package_key: &str) -> String {
    package_key.replace('.', "\\")
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Extract PSR-4 entries from a single prefix → path(s) pair.
///
/// The value can be either a string (`"Classes/"`) or an array of strings.
fn extract_psr4_entries(prefix: &str, paths: &serde_json::Value, mappings: &mut Vec<Psr4Mapping>) {
    // Normalise the prefix: ensure it ends with `\`
    let normalised_prefix = if prefix.ends_with('\\') || prefix.is_empty() {
        prefix.to_string()
    } else {
        format!("{}\\", prefix)
    };

    let paths: Vec<&str> = match paths {
        serde_json::Value::String(path) => vec![path.as_str()],
        serde_json::Value::Array(arr) => arr.iter().filter_map(|p| p.as_str()).collect(),
        _ => Vec::new(),
    };
    for path in paths {
        mappings.push(Psr4Mapping {
            prefix: normalised_prefix.clone(),
            base_path: normalise_path(path),
        });
    }
}

/// Normalise a directory path: forward slashes, trailing `/`.
fn normalise_path(path: &str) -> String {
    let p = path.replace('\\', "/");
    if p.ends_with('/') || p.is_empty() {
        p
    } else {
        format!("{}/", p)
    }
}

/// Resolve a fully-qualified PHP class name to a file path using PSR-4 mappings.
///
/// A leading `\` is stripped if present.  Returns the first path that exists
/// on disk, or `None` if no mapping matches or the resolved file doesn't
/// exist.
pub fn resolve_class_path(
    mappings: &[Psr4Mapping],
    package_root: &Path,
    class_name: &str,
) -> Option<PathBuf> {
    let name = class_name.strip_prefix('\\').unwrap_or(class_name);
    if name.is_empty() || is_builtin_type(name) {
        return None;
    }

    mappings.iter().find_map(|mapping| {
        let relative_class = if mapping.prefix.is_empty() {
            name
        } else {
            name.strip_prefix(&mapping.prefix)?
        };
        let file_path = package_root
            .join(&mapping.base_path)
            .join(format!("{}.php", relative_class.replace('\\', "/")));
        file_path.is_file().then_some(file_path)
    })
}

/// Check if a name is a PHP built-in type (not a class).
fn is_builtin_type(name: &str) -> bool {
    matches!(
        name,
        "self"
            | "static"
            | "parent"
            | "string"
            | "int"
            | "float"
            | "bool"
            | "array"
            | "object"
            | "mixed"
            | "void"
            | "null"
            | "callable"
            | "iterable"
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: a temporary package with a composer.json and optional files.
    struct TestPackage {
        dir: tempfile::TempDir,
    }

    impl TestPackage {
        fn new(composer_json: &str) -> Self {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            fs::write(dir.path().join("composer.json"), composer_json)
                .expect("failed to write composer.json");
            TestPackage { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn create_file(&self, relative_path: &str, content: &str) {
            let full_path = self.dir.path().join(relative_path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).expect("failed to create dirs");
            }
            fs::write(&full_path, content).expect("failed to write file");
        }
    }

    #[test]
    fn test_parse_manifest_with_package_key() {
        let pkg = TestPackage::new(
            r#"{
                "name": "vendor/site",
                "type": "neos-site",
                "autoload": { "psr-4": { "Vendor\\Site\\": "Classes" } },
                "extra": { "neos": { "package-key": "Vendor.Site.Custom" } }
            }"#,
        );

        let manifest = parse_composer_json(pkg.root()).expect("manifest parses");
        assert_eq!(manifest.name.as_deref(), Some("vendor/site"));
        assert_eq!(manifest.package_type.as_deref(), Some("neos-site"));
        assert_eq!(manifest.package_key.as_deref(), Some("Vendor.Site.Custom"));
        assert_eq!(
            manifest.autoload,
            vec![Psr4Mapping {
                prefix: "Vendor\\Site\\".to_string(),
                base_path: "Classes/".to_string(),
            }]
        );
    }

    #[test]
    fn test_autoload_dev_and_longest_prefix_first() {
        let manifest = parse_manifest(
            r#"{
                "autoload": { "psr-4": { "Vendor\\": "src/" } },
                "autoload-dev": { "psr-4": { "Vendor\\Tests\\": ["tests/", "more-tests"] } }
            }"#,
        )
        .expect("manifest parses");

        let prefixes: Vec<&str> = manifest.autoload.iter().map(|m| m.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["Vendor\\Tests\\", "Vendor\\Tests\\", "Vendor\\"]);
        assert_eq!(manifest.autoload[1].base_path, "more-tests/");
        assert_eq!(manifest.package_key, None);
    }

    #[test]
    fn test_invalid_or_missing_manifest() {
        assert_eq!(parse_manifest("not json"), None);
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        assert_eq!(parse_composer_json(dir.path()), None);
    }

    #[test]
    fn test_package_key_from_name() {
        assert_eq!(package_key_from_name("vendor/site-package"), "Vendor.SitePackage");
        assert_eq!(package_key_from_name("neos/fusion-afx"), "Neos.FusionAfx");
        assert_eq!(namespace_of_package_key("Vendor.Site"), "Vendor\\Site");
    }

    #[test]
    fn test_resolve_class_path() {
        let pkg = TestPackage::new(r#"{ "autoload": { "psr-4": { "Vendor\\Site\\": "Classes/" } } }"#);
        pkg.create_file("Classes/Eel/FooHelper.php", "<?php\n");

        let manifest = parse_composer_json(pkg.root()).expect("manifest parses");
        let path = resolve_class_path(&manifest.autoload, pkg.root(), "\\Vendor\\Site\\Eel\\FooHelper");
        assert_eq!(path, Some(pkg.root().join("Classes/Eel/FooHelper.php")));

        assert_eq!(
            resolve_class_path(&manifest.autoload, pkg.root(), "Vendor\\Site\\Missing"),
            None
        );
        assert_eq!(resolve_class_path(&manifest.autoload, pkg.root(), "Other\\Thing"), None);
        assert_eq!(resolve_class_path(&manifest.autoload, pkg.root(), "string"), None);
    }
}
