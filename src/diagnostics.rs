//! Per-file diagnostic assembly.
//!
//! A file that does not parse gets a single error from the failing offset
//! to the end of the file and nothing else.  Otherwise the file-level
//! checks below run and every capability element adds its own findings.
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::capabilities::{CapabilityContext, DIAGNOSTIC_SOURCE, Dispatcher};
use crate::fusion::{NodeKind, NodeType};
use crate::parsed_file::ParsedFile;
use crate::workspace::Workspace;

/// Diagnostics for the file at `uri`, or nothing when the file is unknown
/// or excluded from diagnostics.
pub fn diagnose(workspace: &Workspace, dispatcher: &Dispatcher, uri: &str) -> Vec<Diagnostic> {
    if !workspace.is_diagnosable(uri) {
        return Vec::new();
    }
    let Some(file) = workspace.file_index(uri) else {
        return Vec::new();
    };
    let parsed = &workspace.files[file];

    if let Some(error) = parsed.error() {
        let end = parsed.position_of(parsed.text().len());
        return vec![Diagnostic {
            range: Range::new(parsed.position_of(error.offset), end),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: error.message.clone(),
            ..Diagnostic::default()
        }];
    }

    let mut diagnostics = empty_expressions(parsed);
    let cx = CapabilityContext {
        workspace,
        file,
        node: None,
        position: Position::default(),
    };
    diagnostics.extend(dispatcher.diagnostics(&cx));
    diagnostics
}

/// `${}` with nothing inside.
fn empty_expressions(parsed: &ParsedFile) -> Vec<Diagnostic> {
    parsed
        .nodes_of_type(NodeType::EelExpression)
        .iter()
        .filter(|&&node| matches!(parsed.kind(node), NodeKind::EelExpression { code, .. } if code.trim().is_empty()))
        .map(|&node| Diagnostic {
            range: parsed.range_of(node),
            severity: Some(DiagnosticSeverity::WARNING),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: "Empty EEL expression".to_string(),
            ..Diagnostic::default()
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
