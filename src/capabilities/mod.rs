//! Capability dispatch.
//!
//! Each LSP feature is served by a set of independent elements.  For every
//! request the [`Dispatcher`] asks each element whether it handles the node
//! under the cursor, calls the ones that do and merges their answers.  An
//! element that fails or panics is logged and skipped; the others still
//! answer.
mod eel_helper;
mod php_class;
mod property;
mod prototype;
mod resource_uri;
mod symbols;

pub use eel_helper::EelHelperElement;
pub use php_class::PhpClassElement;
pub use property::PropertyElement;
pub use prototype::PrototypeElement;
pub use resource_uri::ResourceUriElement;
pub use symbols::SymbolElement;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;
use tower_lsp::lsp_types::{
    CodeLens, CompletionItem, Diagnostic, DocumentSymbol, Hover, HoverContents, InlayHint,
    Location, LocationLink, MarkupContent, MarkupKind, Position, Range, SignatureHelp,
    SymbolInformation, TextEdit, Url, WorkspaceEdit,
};
use tracing::error;

use crate::fusion::{NodeId, NodeKind};
use crate::parsed_file::ParsedFile;
use crate::workspace::Workspace;

/// `source` of every diagnostic the server publishes.
pub const DIAGNOSTIC_SOURCE: &str = "fusion-lsp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Hover,
    Completion,
    Definition,
    References,
    DocumentSymbols,
    WorkspaceSymbols,
    CodeLens,
    SignatureHelp,
    Rename,
    Diagnostics,
    InlayHints,
}

#[derive(Error, Debug)]
pub enum ElementError {
    #[error("Invalid document URI {0}")]
    InvalidUri(String),
}

pub type ElementResult<T> = Result<T, ElementError>;

/// Everything an element needs to answer a request for one file.
pub struct CapabilityContext<'a> {
    pub workspace: &'a Workspace,
    /// Index into `workspace.files`.
    pub file: usize,
    /// The node under the cursor, if the request has a position.
    pub node: Option<NodeId>,
    pub position: Position,
}

impl<'a> CapabilityContext<'a> {
    pub fn parsed(&self) -> &'a ParsedFile {
        &self.workspace.files[self.file]
    }

    pub fn node_kind(&self) -> Option<&'a NodeKind> {
        let parsed = self.parsed();
        self.node.map(|node| parsed.kind(node))
    }

    pub fn origin_range(&self) -> Option<Range> {
        self.node.map(|node| self.parsed().range_of(node))
    }

    /// The text of the current line up to the cursor.
    pub fn line_prefix(&self) -> &'a str {
        let parsed = self.parsed();
        let text = parsed.text();
        let cursor = parsed.offset_at(self.position).min(text.len());
        let start = text[..cursor].rfind('\n').map(|i| i + 1).unwrap_or(0);
        &text[start..cursor]
    }
}

pub fn url(uri: &str) -> ElementResult<Url> {
    Url::parse(uri).map_err(|_| ElementError::InvalidUri(uri.to_string()))
}

/// A link to `segment` of `statement` in file `file`.
pub fn statement_link(
    workspace: &Workspace,
    origin: Option<Range>,
    file: usize,
    statement: NodeId,
    segment: NodeId,
) -> ElementResult<LocationLink> {
    let parsed = &workspace.files[file];
    Ok(LocationLink {
        origin_selection_range: origin,
        target_uri: url(&parsed.uri)?,
        target_range: parsed.range_of(statement),
        target_selection_range: parsed.range_of(segment),
    })
}

/// A link to a position in a file that is not a parsed Fusion file.
pub fn position_link(origin: Option<Range>, uri: &str, position: Position) -> ElementResult<LocationLink> {
    let range = Range::new(position, position);
    Ok(LocationLink {
        origin_selection_range: origin,
        target_uri: url(uri)?,
        target_range: range,
        target_selection_range: range,
    })
}

pub fn fenced(language: &str, code: &str) -> String {
    format!("```{}\n{}\n```", language, code)
}

/// One handler of the dispatch layer.
///
/// Every method has an empty default, so an element only implements what
/// it serves.  File-wide requests (symbols, code lens, diagnostics) are
/// asked with `node == None`.
pub trait CapabilityElement: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool;

    fn definition(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        Ok(Vec::new())
    }

    /// Markdown describing the node.
    fn hover(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        Ok(None)
    }

    fn completion(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<CompletionItem>> {
        Ok(Vec::new())
    }

    fn references(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<Location>> {
        Ok(Vec::new())
    }

    fn document_symbols(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<DocumentSymbol>> {
        Ok(Vec::new())
    }

    fn workspace_symbols(&self, _workspace: &Workspace, _query: &str) -> ElementResult<Vec<SymbolInformation>> {
        Ok(Vec::new())
    }

    fn code_lens(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<CodeLens>> {
        Ok(Vec::new())
    }

    fn signature_help(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Option<SignatureHelp>> {
        Ok(None)
    }

    fn rename(&self, _cx: &CapabilityContext<'_>, _new_name: &str) -> ElementResult<Vec<(Url, TextEdit)>> {
        Ok(Vec::new())
    }

    fn diagnostics(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<Diagnostic>> {
        Ok(Vec::new())
    }

    /// Hints for the whole file; the dispatcher narrows them to the
    /// requested range.
    fn inlay_hints(&self, _cx: &CapabilityContext<'_>) -> ElementResult<Vec<InlayHint>> {
        Ok(Vec::new())
    }
}

pub struct Dispatcher {
    elements: Vec<Box<dyn CapabilityElement>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher with every built-in element.
    pub fn new() -> Self {
        Self::with_elements(vec![
            Box::new(PrototypeElement),
            Box::new(PropertyElement),
            Box::new(EelHelperElement),
            Box::new(PhpClassElement),
            Box::new(ResourceUriElement),
            Box::new(SymbolElement),
        ])
    }

    pub fn with_elements(elements: Vec<Box<dyn CapabilityElement>>) -> Self {
        Self { elements }
    }

    /// Call `call` on every responsible element, dropping failures.
    fn run<T>(
        &self,
        capability: Capability,
        node: Option<&NodeKind>,
        mut call: impl FnMut(&dyn CapabilityElement) -> ElementResult<T>,
    ) -> Vec<T> {
        let mut results = Vec::new();
        for element in &self.elements {
            if !element.is_responsible(capability, node) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| call(element.as_ref()))) {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => {
                    error!(element = element.name(), ?capability, error = %err, "capability element failed");
                }
                Err(_) => {
                    error!(element = element.name(), ?capability, "capability element panicked");
                }
            }
        }
        results
    }

    pub fn definition(&self, cx: &CapabilityContext<'_>) -> Vec<LocationLink> {
        self.run(Capability::Definition, cx.node_kind(), |e| e.definition(cx))
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn hover(&self, cx: &CapabilityContext<'_>) -> Option<Hover> {
        let sections: Vec<String> = self
            .run(Capability::Hover, cx.node_kind(), |e| e.hover(cx))
            .into_iter()
            .flatten()
            .collect();
        if sections.is_empty() {
            return None;
        }
        Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: sections.join("\n\n---\n\n"),
            }),
            range: cx.origin_range(),
        })
    }

    pub fn completion(&self, cx: &CapabilityContext<'_>) -> Vec<CompletionItem> {
        let mut items: Vec<CompletionItem> = Vec::new();
        for item in self
            .run(Capability::Completion, cx.node_kind(), |e| e.completion(cx))
            .into_iter()
            .flatten()
        {
            if !items.iter().any(|existing| existing.label == item.label) {
                items.push(item);
            }
        }
        items
    }

    pub fn references(&self, cx: &CapabilityContext<'_>) -> Vec<Location> {
        self.run(Capability::References, cx.node_kind(), |e| e.references(cx))
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn document_symbols(&self, cx: &CapabilityContext<'_>) -> Vec<DocumentSymbol> {
        self.run(Capability::DocumentSymbols, None, |e| e.document_symbols(cx))
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn workspace_symbols(&self, workspace: &Workspace, query: &str) -> Vec<SymbolInformation> {
        self.run(Capability::WorkspaceSymbols, None, |e| e.workspace_symbols(workspace, query))
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn inlay_hints(&self, cx: &CapabilityContext<'_>, range: Range) -> Vec<InlayHint> {
        let key = |p: Position| (p.line, p.character);
        self.run(Capability::InlayHints, None, |e| e.inlay_hints(cx))
            .into_iter()
            .flatten()
            .filter(|hint| key(range.start) <= key(hint.position) && key(hint.position) <= key(range.end))
            .collect()
    }

    pub fn code_lens(&self, cx: &CapabilityContext<'_>) -> Vec<CodeLens> {
        self.run(Capability::CodeLens, None, |e| e.code_lens(cx))
            .into_iter()
            .flatten()
            .collect()
    }

    /// The first element with a signature wins.
    pub fn signature_help(&self, cx: &CapabilityContext<'_>) -> Option<SignatureHelp> {
        let node = cx.node_kind();
        for element in &self.elements {
            if !element.is_responsible(Capability::SignatureHelp, node) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| element.signature_help(cx))) {
                Ok(Ok(Some(help))) if !help.signatures.is_empty() => return Some(help),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(element = element.name(), error = %err, "signature help failed");
                }
                Err(_) => error!(element = element.name(), "signature help panicked"),
            }
        }
        None
    }

    pub fn rename(&self, cx: &CapabilityContext<'_>, new_name: &str) -> Option<WorkspaceEdit> {
        let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for (uri, edit) in self
            .run(Capability::Rename, cx.node_kind(), |e| e.rename(cx, new_name))
            .into_iter()
            .flatten()
        {
            let edits = changes.entry(uri).or_default();
            if !edits.contains(&edit) {
                edits.push(edit);
            }
        }
        if changes.is_empty() {
            return None;
        }
        Some(WorkspaceEdit {
            changes: Some(changes),
            ..WorkspaceEdit::default()
        })
    }

    pub fn diagnostics(&self, cx: &CapabilityContext<'_>) -> Vec<Diagnostic> {
        self.run(Capability::Diagnostics, None, |e| e.diagnostics(cx))
            .into_iter()
            .flatten()
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
