//! LSP server trait implementation.
//!
//! This module contains the `impl LanguageServer for Backend` block, which
//! handles all LSP protocol messages: lifecycle, document sync, watched
//! files, configuration changes and the feature requests, which are handed
//! to the capability dispatcher.
use std::collections::BTreeSet;
use std::path::Path;

use tower_lsp::LanguageServer;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::{Backend, uri_to_path};

const WATCHED_FILES_REGISTRATION: &str = "fusion-lsp-watched-files";

fn is_fusion(uri: &str) -> bool {
    uri.ends_with(".fusion")
}

/// What a watched-file event is about.
enum WatchedKind {
    Fusion,
    Php,
    Configuration,
    Other,
}

fn watched_kind(path: &Path) -> WatchedKind {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if file_name == "composer.json" {
        return WatchedKind::Configuration;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("fusion") => WatchedKind::Fusion,
        Some("php") => WatchedKind::Php,
        Some("yaml") | Some("yml") => WatchedKind::Configuration,
        _ => WatchedKind::Other,
    }
}

fn read_configuration(value: Option<&serde_json::Value>) -> Configuration {
    let Some(value) = value else {
        return Configuration::default();
    };
    match Configuration::from_json(value) {
        Ok(configuration) => configuration,
        Err(err) => {
            warn!(error = %err, "invalid configuration, using defaults");
            Configuration::default()
        }
    }
}

fn folder_entry(name: &str, uri: &Url) -> Option<(String, std::path::PathBuf)> {
    let path = uri.to_file_path().ok()?;
    Some((name.to_string(), path))
}

impl Backend {
    /// `before` holds the prototypes the changed files declared before the
    /// edit, so files depending on a removed declaration are re-checked too.
    async fn publish_after_change(&self, changed: &[String], before: BTreeSet<String>) {
        let mut touched = before;
        touched.extend(self.declared_prototypes(changed));
        let uris = self.uris_after_change(changed, &touched);
        self.diagnose_and_publish(uris).await;
    }

    async fn register_file_watchers(&self) {
        let Some(client) = &self.client else {
            return;
        };
        let watchers = ["**/*.fusion", "**/*.php", "**/*.yaml", "**/composer.json"]
            .into_iter()
            .map(|pattern| FileSystemWatcher {
                glob_pattern: GlobPattern::String(pattern.to_string()),
                kind: None,
            })
            .collect();
        let options = DidChangeWatchedFilesRegistrationOptions { watchers };
        let registration = Registration {
            id: WATCHED_FILES_REGISTRATION.to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(err) = client.register_capability(vec![registration]).await {
            warn!(error = %err, "failed to register file watchers");
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let mut folders: Vec<(String, std::path::PathBuf)> = params
            .workspace_folders
            .iter()
            .flatten()
            .filter_map(|folder| folder_entry(&folder.name, &folder.uri))
            .collect();
        #[allow(deprecated)]
        let root_uri = params.root_uri.as_ref();
        if folders.is_empty()
            && let Some(entry) = root_uri.and_then(|root| folder_entry("root", root))
        {
            folders.push(entry);
        }
        *self.folders.lock() = folders;

        let configuration = read_configuration(params.initialization_options.as_ref());
        // Without options the command line level stays in effect.
        if params.initialization_options.is_some() {
            self.apply_log_level(&configuration.log.level);
        }
        *self.configuration.lock() = configuration;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(
                        [".", ":", "<", "("].iter().map(|c| c.to_string()).collect(),
                    ),
                    all_commit_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                    completion_item: None,
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                code_lens_provider: Some(CodeLensOptions {
                    resolve_provider: Some(false),
                }),
                rename_provider: Some(OneOf::Left(true)),
                inlay_hint_provider: Some(OneOf::Left(true)),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            }),
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let (packages, files) = self.init_workspaces();
        self.log(
            MessageType::INFO,
            format!(
                "{} {} initialized! Loaded {} package(s), {} Fusion file(s)",
                self.name, self.version, packages, files
            ),
        )
        .await;
        self.register_file_watchers().await;
        self.rebuild_all_diagnostics().await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    // ── document sync ───────────────────────────────────────────────────

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        if !is_fusion(&uri) {
            return;
        }
        let text = params.text_document.text;
        let before = self.declared_prototypes(std::slice::from_ref(&uri));
        self.open_files.lock().insert(uri.clone(), text.clone());
        if !self.upsert_file(&uri, text) {
            debug!(uri, "opened file outside every workspace");
        }
        self.publish_after_change(std::slice::from_ref(&uri), before).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        if !is_fusion(&uri) {
            return;
        }
        // Full sync: the last change carries the whole text.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let before = self.declared_prototypes(std::slice::from_ref(&uri));
        self.open_files.lock().insert(uri.clone(), change.text.clone());
        self.upsert_file(&uri, change.text);
        self.publish_after_change(std::slice::from_ref(&uri), before).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        let was_open = self.open_files.lock().remove(&uri).is_some();
        if !was_open {
            return;
        }
        let closed = std::slice::from_ref(&uri);
        let mut touched = self.declared_prototypes(closed);
        // The buffer may have been discarded; fall back to the disk state.
        match uri_to_path(&uri).map(std::fs::read_to_string) {
            Some(Ok(text)) => {
                self.upsert_file(&uri, text);
            }
            _ => {
                self.remove_file(&uri);
            }
        }
        touched.extend(self.declared_prototypes(closed));
        let mut uris = self.uris_after_change(closed, &touched);
        if !uris.contains(&uri) {
            uris.push(uri);
        }
        self.diagnose_and_publish(uris).await;
    }

    // ── workspace events ────────────────────────────────────────────────

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let configuration = read_configuration(Some(&params.settings));
        self.apply_log_level(&configuration.log.level);
        *self.configuration.lock() = configuration;
        let (packages, files) = self.init_workspaces();
        info!(packages, files, "configuration changed, workspaces rebuilt");
        self.rebuild_all_diagnostics().await;
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        {
            let mut folders = self.folders.lock();
            for removed in &params.event.removed {
                if let Ok(path) = removed.uri.to_file_path() {
                    folders.retain(|(_, root)| *root != path);
                }
            }
            for added in &params.event.added {
                if let Some(entry) = folder_entry(&added.name, &added.uri) {
                    folders.push(entry);
                }
            }
        }
        self.init_workspaces();
        self.rebuild_all_diagnostics().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut changed = Vec::new();
        let mut before = BTreeSet::new();
        let mut full_rebuild = false;

        for event in params.changes {
            let uri = event.uri.to_string();
            let Ok(path) = event.uri.to_file_path() else {
                continue;
            };
            match watched_kind(&path) {
                WatchedKind::Fusion => {
                    let is_open = self.open_files.lock().contains_key(&uri);
                    if is_open {
                        continue;
                    }
                    before.extend(self.declared_prototypes(std::slice::from_ref(&uri)));
                    if event.typ == FileChangeType::DELETED {
                        self.remove_file(&uri);
                    } else {
                        match std::fs::read_to_string(&path) {
                            Ok(text) => {
                                self.upsert_file(&uri, text);
                            }
                            Err(err) => warn!(uri, error = %err, "failed to read changed fusion file"),
                        }
                    }
                    changed.push(uri);
                }
                WatchedKind::Php => {
                    self.php_file_changed(&uri);
                    changed.push(uri);
                }
                WatchedKind::Configuration => {
                    if self.reload_configuration_for(&path) {
                        info!(uri, "node types changed");
                        full_rebuild = true;
                    }
                    changed.push(uri);
                }
                WatchedKind::Other => {}
            }
        }

        if full_rebuild {
            self.rebuild_all_diagnostics().await;
        } else if !changed.is_empty() {
            let fusion: Vec<String> = changed.into_iter().filter(|u| is_fusion(u)).collect();
            self.publish_after_change(&fusion, before).await;
        }
    }

    // ── features ────────────────────────────────────────────────────────

    async fn goto_definition(&self, params: GotoDefinitionParams) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri.to_string();
        let position = params.text_document_position_params.position;
        let links = self
            .with_capability_context(&uri, Some(position), |d, cx| d.definition(cx))
            .unwrap_or_default();
        if links.is_empty() {
            return Ok(None);
        }
        Ok(Some(GotoDefinitionResponse::Link(links)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri.to_string();
        let position = params.text_document_position_params.position;
        Ok(self
            .with_capability_context(&uri, Some(position), |d, cx| d.hover(cx))
            .flatten())
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;
        let items = self
            .with_capability_context(&uri, Some(position), |d, cx| d.completion(cx))
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri.to_string();
        let position = params.text_document_position_params.position;
        Ok(self
            .with_capability_context(&uri, Some(position), |d, cx| d.signature_help(cx))
            .flatten())
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;
        let locations = self
            .with_capability_context(&uri, Some(position), |d, cx| d.references(cx))
            .unwrap_or_default();
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(locations))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;
        Ok(self
            .with_capability_context(&uri, Some(position), |d, cx| d.rename(cx, &params.new_name))
            .flatten())
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri.to_string();
        let symbols = self
            .with_capability_context(&uri, None, |d, cx| d.document_symbols(cx))
            .unwrap_or_default();
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn symbol(&self, params: WorkspaceSymbolParams) -> Result<Option<Vec<SymbolInformation>>> {
        let symbols = self.with_workspaces(|d, workspaces| {
            workspaces
                .iter()
                .flat_map(|w| d.workspace_symbols(w, &params.query))
                .collect::<Vec<_>>()
        });
        Ok(Some(symbols))
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        let uri = params.text_document.uri.to_string();
        Ok(self.with_capability_context(&uri, None, |d, cx| d.code_lens(cx)))
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        let uri = params.text_document.uri.to_string();
        Ok(self.with_capability_context(&uri, None, |d, cx| d.inlay_hints(cx, params.range)))
    }
}
