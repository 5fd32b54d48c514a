//! A language server for Neos Fusion, its embedded AFX markup and EEL
//! expressions.
//!
//! The [`Backend`] owns one [`Workspace`] per editor workspace folder.  Each
//! workspace keeps every Fusion file of its packages parsed and indexed;
//! editor requests are answered by the capability elements in
//! [`capabilities`] against that model.
//!
//! The `LanguageServer` trait implementation lives in [`server`].
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tower_lsp::Client;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Position, Url};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, Registry, reload};

pub mod cache;
pub mod capabilities;
pub mod composer;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod fusion;
pub mod located;
pub mod parsed_file;
pub mod php;
pub mod scope;
mod server;
pub mod workspace;

use capabilities::{CapabilityContext, Dispatcher};
use config::Configuration;
use context::Context;
use workspace::{RebuildGuard, Workspace};

/// Handle for swapping the log filter at runtime.
pub type LogHandle = reload::Handle<EnvFilter, Registry>;

pub struct Backend {
    name: String,
    version: String,
    client: Option<Client>,
    context: Arc<Context>,
    configuration: Mutex<Configuration>,
    /// Workspace folders as `(name, root)`.
    folders: Mutex<Vec<(String, PathBuf)>>,
    workspaces: Mutex<Vec<Workspace>>,
    /// Editor buffers by URI.  They win over the file on disk.
    open_files: Mutex<HashMap<String, String>>,
    /// Last diagnostics sent per URI.
    published: Mutex<HashMap<String, Vec<Diagnostic>>>,
    dispatcher: Dispatcher,
    rebuild: RebuildGuard,
    log_handle: Option<LogHandle>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client: Some(client),
            ..Self::new_test()
        }
    }

    /// A backend without a client connection.
    pub fn new_test() -> Self {
        Self {
            name: "fusion-lsp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            client: None,
            context: Arc::new(Context::new()),
            configuration: Mutex::new(Configuration::default()),
            folders: Mutex::new(Vec::new()),
            workspaces: Mutex::new(Vec::new()),
            open_files: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            dispatcher: Dispatcher::new(),
            rebuild: RebuildGuard::new(),
            log_handle: None,
        }
    }

    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    pub(crate) async fn log(&self, typ: MessageType, message: String) {
        if let Some(client) = &self.client {
            client.log_message(typ, message).await;
        }
    }

    /// The diagnostics last published for `uri`.
    pub fn published_diagnostics(&self, uri: &str) -> Vec<Diagnostic> {
        self.published.lock().get(uri).cloned().unwrap_or_default()
    }

    /// Number of Fusion files across all workspaces.
    pub fn file_count(&self) -> usize {
        self.workspaces.lock().iter().map(|w| w.files.len()).sum()
    }

    /// Whether some workspace holds a parsed file for `uri`.
    pub fn has_file(&self, uri: &str) -> bool {
        self.workspaces.lock().iter().any(|w| w.file_index(uri).is_some())
    }

    // ── workspaces ──────────────────────────────────────────────────────

    /// Rebuild every workspace from the current folders and configuration.
    pub(crate) fn init_workspaces(&self) -> (usize, usize) {
        let configuration = self.configuration.lock().clone();
        let folders = self.folders.lock().clone();
        // Autoload maps may have changed along with the configuration.
        self.context.caches.clear_all();

        let mut workspaces = Vec::with_capacity(folders.len());
        for (name, root) in folders {
            let mut workspace = Workspace::new(name, root, Arc::clone(&self.context));
            workspace.init(configuration.clone());
            workspaces.push(workspace);
        }

        // Editor buffers stay authoritative across a rebuild.
        let open_files = self.open_files.lock().clone();
        for (uri, text) in open_files {
            let Some(path) = uri_to_path(&uri) else {
                continue;
            };
            if let Some(workspace) = workspaces.iter_mut().find(|w| w.contains_path(&path)) {
                workspace.add_file(&uri, text);
            }
        }

        let counts = (
            workspaces.iter().map(|w| w.packages.len()).sum(),
            workspaces.iter().map(|w| w.files.len()).sum(),
        );
        *self.workspaces.lock() = workspaces;
        counts
    }

    /// Put `text` into the workspace that knows `uri`, or the one whose root
    /// contains it.  Returns `false` when no workspace takes the file.
    pub(crate) fn upsert_file(&self, uri: &str, text: String) -> bool {
        let mut workspaces = self.workspaces.lock();
        if let Some(workspace) = workspaces.iter_mut().find(|w| w.file_index(uri).is_some()) {
            workspace.update_file_by_change(uri, text);
            return true;
        }
        let Some(path) = uri_to_path(uri) else {
            return false;
        };
        // Innermost root first for nested workspace folders.
        let target = workspaces
            .iter_mut()
            .filter(|w| w.contains_path(&path))
            .max_by_key(|w| w.root.components().count());
        match target {
            Some(workspace) => {
                workspace.add_file(uri, text);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_file(&self, uri: &str) -> bool {
        let mut removed = false;
        for workspace in self.workspaces.lock().iter_mut() {
            removed |= workspace.remove_file(uri);
        }
        removed
    }

    /// Re-read package configuration of the workspace containing `path`.
    /// Returns whether node type definitions changed.
    pub(crate) fn reload_configuration_for(&self, path: &Path) -> bool {
        let mut changed = false;
        for workspace in self.workspaces.lock().iter_mut() {
            if workspace.contains_path(path) {
                changed |= workspace.reload_package_configuration();
            }
        }
        changed
    }

    /// A PHP file changed: drop its cached classes and re-derive helpers.
    pub(crate) fn php_file_changed(&self, uri: &str) {
        let dropped = self.context.invalidate_file(uri);
        debug!(uri, dropped, "php file changed");
        let path = uri_to_path(uri);
        for workspace in self.workspaces.lock().iter_mut() {
            if path.as_deref().is_none_or(|p| workspace.contains_path(p)) {
                workspace.refresh_helpers();
                workspace.reindex_all();
            }
        }
    }

    pub(crate) fn apply_log_level(&self, level: &str) {
        let Some(handle) = &self.log_handle else {
            return;
        };
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(err) = handle.reload(filter) {
                    warn!(error = %err, "failed to swap log filter");
                }
            }
            Err(err) => warn!(level, error = %err, "invalid log level"),
        }
    }

    // ── requests ────────────────────────────────────────────────────────

    /// Run `f` with a capability context for `uri`, with the node at
    /// `position` when one is given.
    pub(crate) fn with_capability_context<T>(
        &self,
        uri: &str,
        position: Option<Position>,
        f: impl FnOnce(&Dispatcher, &CapabilityContext<'_>) -> T,
    ) -> Option<T> {
        let workspaces = self.workspaces.lock();
        let (workspace, file) = workspaces
            .iter()
            .find_map(|w| w.file_index(uri).map(|file| (w, file)))?;
        let parsed = &workspace.files[file];
        let cx = CapabilityContext {
            workspace,
            file,
            node: position.and_then(|p| parsed.node_at(p)),
            position: position.unwrap_or_default(),
        };
        Some(f(&self.dispatcher, &cx))
    }

    pub(crate) fn with_workspaces<T>(&self, f: impl FnOnce(&Dispatcher, &[Workspace]) -> T) -> T {
        let workspaces = self.workspaces.lock();
        f(&self.dispatcher, &workspaces)
    }

    // ── diagnostics ─────────────────────────────────────────────────────

    /// Prototypes declared in any of `uris`.
    pub(crate) fn declared_prototypes(&self, uris: &[String]) -> BTreeSet<String> {
        let workspaces = self.workspaces.lock();
        let mut prototypes = BTreeSet::new();
        for uri in uris {
            for workspace in workspaces.iter() {
                prototypes.extend(workspace.declared_prototypes(uri));
            }
        }
        prototypes
    }

    /// URIs re-checked after an edit: the edited file when configured, every
    /// open file, every file that currently shows diagnostics and every file
    /// depending on one of the `touched` prototypes.
    pub(crate) fn uris_after_change(&self, changed: &[String], touched: &BTreeSet<String>) -> Vec<String> {
        let always = self.configuration.lock().diagnostics.always_diagnose_changed_file;
        let mut uris: BTreeSet<String> = BTreeSet::new();
        if always {
            uris.extend(changed.iter().cloned());
        }
        uris.extend(
            self.workspaces
                .lock()
                .iter()
                .flat_map(|w| w.dependent_files(touched)),
        );
        uris.extend(self.open_files.lock().keys().cloned());
        uris.extend(
            self.published
                .lock()
                .iter()
                .filter(|(_, diagnostics)| !diagnostics.is_empty())
                .map(|(uri, _)| uri.clone()),
        );
        uris.into_iter().collect()
    }

    fn compute_diagnostics(&self, uris: &[String]) -> Vec<(String, Vec<Diagnostic>)> {
        let workspaces = self.workspaces.lock();
        uris.iter()
            .map(|uri| {
                let found = workspaces
                    .iter()
                    .find(|w| w.file_index(uri).is_some())
                    .map(|w| diagnostics::diagnose(w, &self.dispatcher, uri))
                    .unwrap_or_default();
                (uri.clone(), found)
            })
            .collect()
    }

    /// Diagnose `uris` and send the results.  Files that no longer exist in
    /// any workspace get an empty list, which clears them in the editor.
    pub(crate) async fn diagnose_and_publish(&self, uris: Vec<String>) {
        let results = self.compute_diagnostics(&uris);
        {
            let mut published = self.published.lock();
            for (uri, diagnostics) in &results {
                published.insert(uri.clone(), diagnostics.clone());
            }
        }
        let Some(client) = &self.client else {
            return;
        };
        for (uri, diagnostics) in results {
            if let Ok(url) = Url::parse(&uri) {
                client.publish_diagnostics(url, diagnostics, None).await;
            }
        }
    }

    /// Diagnose every file of every workspace.  Requests arriving while a
    /// pass runs are folded into one follow-up pass.
    pub(crate) async fn rebuild_all_diagnostics(&self) {
        if !self.rebuild.begin() {
            debug!("full diagnosis already running, queued");
            return;
        }
        loop {
            let mut uris: BTreeSet<String> = self
                .workspaces
                .lock()
                .iter()
                .flat_map(Workspace::files_to_diagnose)
                .collect();
            uris.extend(self.published.lock().keys().cloned());
            let count = uris.len();
            self.diagnose_and_publish(uris.into_iter().collect()).await;
            info!(files = count, "full diagnosis finished");
            if !self.rebuild.finish_pass() {
                break;
            }
        }
    }
}

pub(crate) fn uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok()?.to_file_path().ok()
}
