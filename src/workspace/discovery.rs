//! Filesystem discovery of packages and source files.
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::config::FoldersConfig;

/// Options controlling how directories are traversed.
#[derive(Clone, Debug, Default)]
pub struct WalkOptions {
    /// Include hidden files and directories (those starting with `.`).
    pub hidden: bool,
    /// Follow symbolic links.
    pub follow_links: bool,
    /// Directory names or root-relative paths that are never entered.
    pub ignore_folders: Vec<String>,
    /// Maximum directory recursion depth. `None` means unlimited.
    pub max_depth: Option<usize>,
}

impl WalkOptions {
    pub fn from_config(folders: &FoldersConfig) -> Self {
        Self {
            hidden: folders.include_hidden_directories,
            follow_links: folders.follow_symbolic_links,
            ignore_folders: folders.ignore.clone(),
            max_depth: None,
        }
    }

    fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.ignore_folders.iter().any(|ignored| {
            let ignored = ignored.trim_matches('/');
            if ignored.contains('/') {
                relative.starts_with(ignored)
            } else {
                relative.components().any(|c| c.as_os_str() == ignored)
            }
        })
    }
}

/// Walk `root` and collect files that pass `predicate`.
///
/// `.gitignore` files are not honoured: Neos projects routinely ignore the
/// very `Packages/` folder the server needs to see.
pub fn walk_files(
    root: &Path,
    options: &WalkOptions,
    predicate: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    if root.is_file() {
        return if predicate(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    if !root.is_dir() {
        return Vec::new();
    }

    let mut builder = WalkBuilder::new(root);
    // standard_filters first, it resets `hidden` among others
    builder
        .standard_filters(false)
        .hidden(!options.hidden)
        .follow_links(options.follow_links)
        .max_depth(options.max_depth);

    let filter_root = root.to_path_buf();
    let filter_options = options.clone();
    builder.filter_entry(move |entry| !filter_options.is_ignored(&filter_root, entry.path()));

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| predicate(path))
        .collect();

    files.sort();
    files.dedup();
    files
}

/// Directories containing a `composer.json`: the workspace root itself and
/// anything below the configured package folders.
pub fn discover_packages(root: &Path, package_folders: &[String], options: &WalkOptions) -> Vec<PathBuf> {
    let mut packages = Vec::new();
    if root.join("composer.json").is_file() {
        packages.push(root.to_path_buf());
    }

    let manifest_options = WalkOptions {
        max_depth: Some(4),
        ..options.clone()
    };
    for folder in package_folders {
        let folder = root.join(folder);
        let manifests = walk_files(&folder, &manifest_options, |path| {
            path.file_name().is_some_and(|n| n == "composer.json")
        });
        packages.extend(manifests.iter().filter_map(|m| m.parent().map(Path::to_path_buf)));
    }

    packages.sort();
    packages.dedup();
    packages
}

/// `*.fusion` files below `folder`.
pub fn discover_fusion_files(folder: &Path, options: &WalkOptions) -> Vec<PathBuf> {
    walk_files(folder, options, is_fusion_file)
}

pub fn is_fusion_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "fusion")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create dirs");
        }
        fs::write(path, "{}").expect("failed to write file");
    }

    #[test]
    fn test_discover_packages() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path();
        touch(root, "composer.json");
        touch(root, "DistributionPackages/Vendor.Site/composer.json");
        touch(root, "Packages/Application/Neos.Fusion/composer.json");
        touch(root, "Packages/Libraries/vendor/lib/composer.json");
        touch(root, "Packages/.hidden/Secret/composer.json");

        let options = WalkOptions {
            ignore_folders: vec!["Libraries".to_string()],
            ..WalkOptions::default()
        };
        let packages = discover_packages(
            root,
            &["DistributionPackages".to_string(), "Packages".to_string()],
            &options,
        );
        assert_eq!(
            packages,
            vec![
                root.to_path_buf(),
                root.join("DistributionPackages/Vendor.Site"),
                root.join("Packages/Application/Neos.Fusion"),
            ]
        );
    }

    #[test]
    fn test_discover_fusion_files_respects_ignore_and_hidden() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path();
        touch(root, "Fusion/Root.fusion");
        touch(root, "Fusion/Component/Card.fusion");
        touch(root, "Fusion/Component/README.md");
        touch(root, "Fusion/.cache/Old.fusion");
        touch(root, "Fusion/Legacy/Old.fusion");

        let options = WalkOptions {
            ignore_folders: vec!["Legacy".to_string()],
            ..WalkOptions::default()
        };
        let files = discover_fusion_files(&root.join("Fusion"), &options);
        assert_eq!(
            files,
            vec![
                root.join("Fusion/Component/Card.fusion"),
                root.join("Fusion/Root.fusion"),
            ]
        );

        let options = WalkOptions {
            hidden: true,
            ..WalkOptions::default()
        };
        assert_eq!(discover_fusion_files(&root.join("Fusion"), &options).len(), 4);
    }
}
