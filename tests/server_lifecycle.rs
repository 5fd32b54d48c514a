mod common;

use common::*;
use tower_lsp::LanguageServer;
use tower_lsp::lsp_types::*;

const CARD: &str = "\
prototype(Vendor.Site:Card) < prototype(Neos.Fusion:Component) {
    title = ''
    renderer = afx`<h1>{props.title}</h1>`
}
";

#[tokio::test]
async fn test_initialize_server_info() {
    let backend = create_test_backend();
    let result = backend.initialize(InitializeParams::default()).await.unwrap();

    let server_info = result.server_info.expect("server_info should be present");
    assert_eq!(server_info.name, "fusion-lsp");
    assert_eq!(server_info.version, Some(env!("CARGO_PKG_VERSION").to_string()));
}

#[tokio::test]
async fn test_initialize_capabilities() {
    let backend = create_test_backend();
    let caps = backend.initialize(InitializeParams::default()).await.unwrap().capabilities;

    assert!(caps.hover_provider.is_some());
    assert!(caps.completion_provider.is_some());
    assert!(caps.signature_help_provider.is_some());
    assert_eq!(caps.definition_provider, Some(OneOf::Left(true)));
    assert_eq!(caps.references_provider, Some(OneOf::Left(true)));
    assert_eq!(caps.rename_provider, Some(OneOf::Left(true)));
    assert!(caps.code_lens_provider.is_some());
    assert_eq!(
        caps.text_document_sync,
        Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL))
    );
}

#[tokio::test]
async fn test_initialized_loads_package_files() {
    let (backend, dir) = create_fusion_workspace(&[
        ("Resources/Private/Fusion/Card.fusion", CARD),
        ("Resources/Private/Fusion/Page/Page.fusion", "page = Neos.Fusion:Value\n"),
        ("Resources/Private/Templates/NotFusion.html", "<p/>"),
    ])
    .await;

    assert_eq!(backend.file_count(), 2);
    assert!(backend.has_file(package_uri(&dir, "Resources/Private/Fusion/Page/Page.fusion").as_str()));
}

#[tokio::test]
async fn test_root_uri_is_used_without_workspace_folders() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    write_files(
        &dir.path().join(PACKAGE),
        &[
            ("composer.json", COMPOSER_JSON),
            ("Resources/Private/Fusion/Card.fusion", CARD),
        ],
    );

    let backend = create_test_backend();
    #[allow(deprecated)]
    let params = InitializeParams {
        root_uri: Some(Url::from_directory_path(dir.path()).unwrap()),
        ..InitializeParams::default()
    };
    backend.initialize(params).await.unwrap();
    backend.initialized(InitializedParams {}).await;

    assert_eq!(backend.file_count(), 1);
}

#[tokio::test]
async fn test_did_open_new_file_joins_the_workspace() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let uri = package_uri(&dir, "Resources/Private/Fusion/Unsaved.fusion");

    open(&backend, &uri, "teaser = Vendor.Site:Card\n").await;

    assert!(backend.has_file(uri.as_str()));
    assert_eq!(backend.file_count(), 2);
}

#[tokio::test]
async fn test_did_close_falls_back_to_disk() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let uri = package_uri(&dir, "Resources/Private/Fusion/Card.fusion");

    open(&backend, &uri, CARD).await;
    change(&backend, &uri, 2, "a = \n").await;
    assert_eq!(backend.published_diagnostics(uri.as_str()).len(), 1);

    backend
        .did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        })
        .await;
    assert!(backend.published_diagnostics(uri.as_str()).is_empty());
}

#[tokio::test]
async fn test_did_close_of_unsaved_file_removes_it() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let uri = package_uri(&dir, "Resources/Private/Fusion/Scratch.fusion");

    open(&backend, &uri, "a = 1\n").await;
    assert!(backend.has_file(uri.as_str()));
    backend
        .did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        })
        .await;
    assert!(!backend.has_file(uri.as_str()));
}

#[tokio::test]
async fn test_non_fusion_documents_are_ignored() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let uri = package_uri(&dir, "Configuration/Settings.yaml");

    open(&backend, &uri, "Neos: {}\n").await;
    assert!(!backend.has_file(uri.as_str()));
    assert_eq!(backend.file_count(), 1);
}

#[tokio::test]
async fn test_workspace_folder_changes_rebuild() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let folder = WorkspaceFolder {
        uri: Url::from_directory_path(dir.path()).unwrap(),
        name: "site".to_string(),
    };

    backend
        .did_change_workspace_folders(DidChangeWorkspaceFoldersParams {
            event: WorkspaceFoldersChangeEvent {
                added: Vec::new(),
                removed: vec![folder.clone()],
            },
        })
        .await;
    assert_eq!(backend.file_count(), 0);

    backend
        .did_change_workspace_folders(DidChangeWorkspaceFoldersParams {
            event: WorkspaceFoldersChangeEvent {
                added: vec![folder],
                removed: Vec::new(),
            },
        })
        .await;
    assert_eq!(backend.file_count(), 1);
}

#[tokio::test]
async fn test_watched_fusion_file_events() {
    let (backend, dir) = create_fusion_workspace(&[("Resources/Private/Fusion/Card.fusion", CARD)]).await;
    let rel = "Resources/Private/Fusion/Created.fusion";
    write_files(&dir.path().join(PACKAGE), &[(rel, "created = 1\n")]);
    let uri = package_uri(&dir, rel);

    backend
        .did_change_watched_files(DidChangeWatchedFilesParams {
            changes: vec![FileEvent { uri: uri.clone(), typ: FileChangeType::CREATED }],
        })
        .await;
    assert!(backend.has_file(uri.as_str()));

    std::fs::remove_file(uri.to_file_path().unwrap()).unwrap();
    backend
        .did_change_watched_files(DidChangeWatchedFilesParams {
            changes: vec![FileEvent { uri: uri.clone(), typ: FileChangeType::DELETED }],
        })
        .await;
    assert!(!backend.has_file(uri.as_str()));
}

#[tokio::test]
async fn test_shutdown() {
    let backend = create_test_backend();
    assert!(backend.shutdown().await.is_ok());
}
