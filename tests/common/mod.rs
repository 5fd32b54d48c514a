#![allow(dead_code)]

use fusion_lsp::Backend;
use std::fs;
use std::path::Path;
use tower_lsp::LanguageServer;
use tower_lsp::lsp_types::*;

/// Root of the site package inside every test workspace.
pub const PACKAGE: &str = "DistributionPackages/Vendor.Site";

pub const COMPOSER_JSON: &str = r#"{
    "name": "vendor/site",
    "type": "neos-site",
    "autoload": { "psr-4": { "Vendor\\Site\\": "Classes/" } }
}"#;

pub fn create_test_backend() -> Backend {
    Backend::new_test()
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel_path, content) in files {
        let full = root.join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("failed to create dirs");
        }
        fs::write(&full, content).expect("failed to write file");
    }
}

/// Helper: create a temp workspace holding the `Vendor.Site` package with
/// the given files (paths relative to the package), then return an
/// initialized Backend serving it.
pub async fn create_fusion_workspace(files: &[(&str, &str)]) -> (Backend, tempfile::TempDir) {
    create_fusion_workspace_with_options(files, None).await
}

pub async fn create_fusion_workspace_with_options(
    files: &[(&str, &str)],
    options: Option<serde_json::Value>,
) -> (Backend, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let package = dir.path().join(PACKAGE);
    write_files(&package, &[("composer.json", COMPOSER_JSON)]);
    write_files(&package, files);

    let backend = create_test_backend();
    let params = InitializeParams {
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: Url::from_directory_path(dir.path()).expect("absolute path"),
            name: "site".to_string(),
        }]),
        initialization_options: options,
        ..InitializeParams::default()
    };
    backend.initialize(params).await.expect("initialize");
    backend.initialized(InitializedParams {}).await;
    (backend, dir)
}

/// URI of a file inside the site package.
pub fn package_uri(dir: &tempfile::TempDir, rel_path: &str) -> Url {
    Url::from_file_path(dir.path().join(PACKAGE).join(rel_path)).expect("absolute path")
}

/// Position of the `offset`-th byte of the first occurrence of `needle`.
pub fn position_in(text: &str, needle: &str, offset: usize) -> Position {
    let begin = text.find(needle).expect("needle in text") + offset;
    let before = &text[..begin];
    let line = before.matches('\n').count() as u32;
    let character = before.rsplit('\n').next().map(str::len).unwrap_or(0) as u32;
    Position { line, character }
}

pub async fn open(backend: &Backend, uri: &Url, text: &str) {
    backend
        .did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "fusion".to_string(),
                version: 1,
                text: text.to_string(),
            },
        })
        .await;
}

pub async fn change(backend: &Backend, uri: &Url, version: i32, text: &str) {
    backend
        .did_change(DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: text.to_string(),
            }],
        })
        .await;
}

pub fn text_document_position(uri: &Url, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position,
    }
}

pub async fn definition(backend: &Backend, uri: &Url, position: Position) -> Vec<LocationLink> {
    let result = backend
        .goto_definition(GotoDefinitionParams {
            text_document_position_params: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await
        .expect("definition request");
    match result {
        Some(GotoDefinitionResponse::Link(links)) => links,
        Some(other) => panic!("expected links, got {:?}", other),
        None => Vec::new(),
    }
}

pub async fn hover_text(backend: &Backend, uri: &Url, position: Position) -> Option<String> {
    let hover = backend
        .hover(HoverParams {
            text_document_position_params: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        })
        .await
        .expect("hover request")?;
    match hover.contents {
        HoverContents::Markup(markup) => Some(markup.value),
        other => panic!("expected markup, got {:?}", other),
    }
}

pub async fn completion_labels(backend: &Backend, uri: &Url, position: Position) -> Vec<String> {
    let result = backend
        .completion(CompletionParams {
            text_document_position: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: None,
        })
        .await
        .expect("completion request");
    match result {
        Some(CompletionResponse::Array(items)) => items.into_iter().map(|i| i.label).collect(),
        Some(CompletionResponse::List(list)) => list.items.into_iter().map(|i| i.label).collect(),
        None => Vec::new(),
    }
}

pub fn messages(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics.iter().map(|d| d.message.clone()).collect()
}
