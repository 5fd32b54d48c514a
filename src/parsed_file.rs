//! The in-memory model of one Fusion file.
//!
//! A [`ParsedFile`] owns the file text and its syntax tree and keeps three
//! indexes over the tree: located nodes by node id, node ids by line and
//! node ids by type.  Every edit throws all of it away and rebuilds from
//! scratch through [`ParsedFile::init`].
//!
//! Besides the nodes the parser produces, `init` synthesizes nodes for
//! things that only have meaning to the server: prototype references in
//! AFX tags and `[instanceof …]` filters, `resource://` URIs, EEL helper
//! calls, PHP class references in `@class` and controller/action pairs of
//! action URIs.  They are appended to the same arena and indexed like any
//! other node.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Range, Url};
use tracing::debug;

use crate::context::Context;
use crate::fusion::{self, FusionDocument, NodeId, NodeKind, NodeType, ParseError, Span, eel};
use crate::located::{LineIndex, LocatedNode};
use crate::php::ClassLookup;
use crate::workspace::EelHelperToken;

/// Prototypes whose `controller`/`action` strings address a PHP action.
const ACTION_URI_PROTOTYPES: [&str; 2] = ["Neos.Fusion:ActionUri", "Neos.Fusion:UriBuilder"];

/// Meta properties whose string value is a PHP class name.
const CLASS_META_PROPERTIES: [&str; 2] = ["class", "exceptionHandler"];

pub const IGNORE_COMMENT: &str = "@fusion-ignore";
pub const IGNORE_BLOCK_COMMENT: &str = "@fusion-ignore-block";

/// What indexing a file needs from its surroundings.
pub struct IndexEnv<'a> {
    pub context: &'a Context,
    pub helpers: &'a [EelHelperToken],
    pub classes: &'a dyn ClassLookup,
}

/// Coarse classification of an `ObjectStatement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `prototype(A) < prototype(B)`
    PrototypeCreation,
    /// Any other statement starting with `prototype(A)`.
    PrototypeOverwrite,
    /// A statement starting with an `@meta` segment.
    Meta,
    Property,
}

#[derive(Debug)]
pub struct ParsedFile {
    pub uri: String,
    /// Key of the owning package.
    pub package: Option<String>,
    text: String,
    document: FusionDocument,
    error: Option<ParseError>,
    ignored: bool,
    line_index: Arc<LineIndex>,
    located: HashMap<NodeId, LocatedNode>,
    nodes_by_line: HashMap<u32, Vec<NodeId>>,
    nodes_by_type: HashMap<NodeType, Vec<NodeId>>,
    /// Left-hand prototype segments of `prototype(A) < prototype(B)`.
    prototype_creations: Vec<NodeId>,
    /// Leading prototype segments of every other prototype statement.
    prototype_overwrites: Vec<NodeId>,
    /// Right-hand segments of creations, parallel to `prototype_creations`.
    prototype_extends: Vec<NodeId>,
    ignore_lines: HashSet<u32>,
    ignore_block_lines: HashSet<u32>,
}

impl ParsedFile {
    pub fn new(uri: impl Into<String>, package: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            package,
            text: String::new(),
            document: FusionDocument::new(),
            error: None,
            ignored: false,
            line_index: Arc::new(LineIndex::new("")),
            located: HashMap::new(),
            nodes_by_line: HashMap::new(),
            nodes_by_type: HashMap::new(),
            prototype_creations: Vec::new(),
            prototype_overwrites: Vec::new(),
            prototype_extends: Vec::new(),
            ignore_lines: HashSet::new(),
            ignore_block_lines: HashSet::new(),
        }
    }

    /// Reset every index and the syntax tree.
    pub fn clear(&mut self) {
        self.document = FusionDocument::new();
        self.error = None;
        self.ignored = false;
        self.located.clear();
        self.nodes_by_line.clear();
        self.nodes_by_type.clear();
        self.prototype_creations.clear();
        self.prototype_overwrites.clear();
        self.prototype_extends.clear();
        self.ignore_lines.clear();
        self.ignore_block_lines.clear();
    }

    /// Parse `text` and rebuild every index.
    ///
    /// A parse error leaves the file empty and marked as ignored until the
    /// next call.
    pub fn init(&mut self, text: String, env: &IndexEnv<'_>) {
        self.clear();
        env.context.invalidate_file(&self.uri);
        self.line_index = env.context.line_index(&self.uri, &text);
        self.text = text;

        let mut document = match fusion::parse(&self.text) {
            Ok(document) => document,
            Err(err) => {
                debug!(uri = %self.uri, error = %err, "fusion file does not parse");
                self.error = Some(err);
                self.ignored = true;
                return;
            }
        };
        synthesize(&mut document, env, self.package.as_deref());
        self.document = document;

        self.index_comments();
        let ids: Vec<NodeId> = self.document.ids().collect();
        for id in ids {
            self.add_node(id);
        }
        self.classify_statements();
    }

    fn add_node(&mut self, id: NodeId) {
        let node = self.document.node(id);
        let node_type = node.kind.node_type();
        if matches!(node_type, NodeType::FusionFile | NodeType::StatementList) {
            return;
        }
        let located = LocatedNode {
            node: id,
            node_type,
            range: self.line_index.range(&self.text, node.span),
        };
        for line in located.lines() {
            self.nodes_by_line.entry(line).or_default().push(id);
        }
        self.nodes_by_type.entry(node_type).or_default().push(id);
        self.located.insert(id, located);
    }

    fn index_comments(&mut self) {
        for comment in &self.document.comments {
            let line = self.line_index.position(&self.text, comment.span.begin).line;
            if comment.text.contains(IGNORE_BLOCK_COMMENT) {
                self.ignore_block_lines.insert(line);
            } else if comment.text.contains(IGNORE_COMMENT) {
                self.ignore_lines.insert(line);
            }
        }
    }

    fn classify_statements(&mut self) {
        let doc = &self.document;
        for statement in doc.ids() {
            if !matches!(doc.kind(statement), NodeKind::ObjectStatement) {
                continue;
            }
            let Some(&first) = doc.path_segments(statement).first() else {
                continue;
            };
            if !matches!(doc.kind(first), NodeKind::PrototypePathSegment { .. }) {
                continue;
            }
            let base = doc
                .copied_path(statement)
                .and_then(|path| doc.children(path).first().copied())
                .filter(|&s| matches!(doc.kind(s), NodeKind::PrototypePathSegment { .. }));
            match base {
                Some(base) => {
                    self.prototype_creations.push(first);
                    self.prototype_extends.push(base);
                }
                None => self.prototype_overwrites.push(first),
            }
        }
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document(&self) -> &FusionDocument {
        &self.document
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Whether the file failed to parse and contributes nothing.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn path(&self) -> Option<PathBuf> {
        Url::parse(&self.uri).ok()?.to_file_path().ok()
    }

    pub fn prototype_creations(&self) -> &[NodeId] {
        &self.prototype_creations
    }

    pub fn prototype_overwrites(&self) -> &[NodeId] {
        &self.prototype_overwrites
    }

    pub fn prototype_extends(&self) -> &[NodeId] {
        &self.prototype_extends
    }

    /// The base prototype segment of a creation segment.
    pub fn extends_of(&self, creation: NodeId) -> Option<NodeId> {
        let index = self.prototype_creations.iter().position(|&c| c == creation)?;
        self.prototype_extends.get(index).copied()
    }

    /// Creation and overwrite segments naming `prototype`.
    pub fn prototype_declarations<'a>(&'a self, prototype: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.prototype_creations
            .iter()
            .chain(self.prototype_overwrites.iter())
            .copied()
            .filter(move |&segment| self.document.segment_identifier(segment) == Some(prototype))
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> &[NodeId] {
        self.nodes_by_type
            .get(&node_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn nodes_on_line(&self, line: u32) -> &[NodeId] {
        self.nodes_by_line
            .get(&line)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn located(&self, id: NodeId) -> Option<&LocatedNode> {
        self.located.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        self.document.kind(id)
    }

    /// Line/column range of a node.
    pub fn range_of(&self, id: NodeId) -> Range {
        match self.located.get(&id) {
            Some(located) => located.range,
            None => self.line_index.range(&self.text, self.document.span(id)),
        }
    }

    pub fn position_of(&self, offset: usize) -> Position {
        self.line_index.position(&self.text, offset)
    }

    pub fn offset_at(&self, position: Position) -> usize {
        self.line_index.offset(&self.text, position)
    }

    /// The most specific node covering `position`.
    ///
    /// Among all nodes whose range contains the position the one with the
    /// highest [`weight`](crate::located::weight) wins; ties go to the node
    /// that was registered first.
    pub fn node_at(&self, position: Position) -> Option<NodeId> {
        let mut best: Option<(u32, NodeId)> = None;
        for &id in self.nodes_on_line(position.line) {
            let Some(located) = self.located.get(&id) else {
                continue;
            };
            if !located.contains(position) {
                continue;
            }
            let weight = located.weight();
            if best.is_none_or(|(best_weight, _)| weight > best_weight) {
                best = Some((weight, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Nearest `ObjectStatement` at or above `id`.
    pub fn statement_of(&self, id: NodeId) -> Option<NodeId> {
        if matches!(self.document.kind(id), NodeKind::ObjectStatement) {
            return Some(id);
        }
        self.document.find_parent(id, NodeType::ObjectStatement)
    }

    pub fn statement_kind(&self, statement: NodeId) -> StatementKind {
        let first = self.document.path_segments(statement).first().copied();
        match first.map(|s| self.document.kind(s)) {
            Some(NodeKind::PrototypePathSegment { .. }) => {
                if first.is_some_and(|s| self.prototype_creations.contains(&s)) {
                    StatementKind::PrototypeCreation
                } else {
                    StatementKind::PrototypeOverwrite
                }
            }
            Some(NodeKind::MetaPathSegment { .. }) => StatementKind::Meta,
            _ => StatementKind::Property,
        }
    }

    /// Whether an ignore comment suppresses diagnostics for `id`.
    ///
    /// `@fusion-ignore` works on the node's line and the line above it,
    /// `@fusion-ignore-block` on the line above any enclosing statement.
    pub fn is_ignored_by_comment(&self, id: NodeId) -> bool {
        let line = self.range_of(id).start.line;
        if self.ignore_lines.contains(&line)
            || line.checked_sub(1).is_some_and(|above| self.ignore_lines.contains(&above))
        {
            return true;
        }
        std::iter::once(id)
            .chain(self.document.ancestors(id))
            .filter(|&a| matches!(self.document.kind(a), NodeKind::ObjectStatement))
            .any(|statement| {
                self.range_of(statement)
                    .start
                    .line
                    .checked_sub(1)
                    .is_some_and(|above| self.ignore_block_lines.contains(&above))
            })
    }
}

// ─── Synthesis ──────────────────────────────────────────────────────────────

fn synthesize(doc: &mut FusionDocument, env: &IndexEnv<'_>, package: Option<&str>) {
    let ids: Vec<NodeId> = doc.ids().collect();
    for id in ids {
        match doc.kind(id).clone() {
            NodeKind::AfxTag { name, .. } if name.contains(':') => {
                let span = doc.span(id);
                doc.push(NodeKind::PrototypeReference { name }, span, Some(id));
            }
            NodeKind::StringValue { value } => {
                let span = doc.span(id);
                synthesize_in_string(doc, id, &value, span.begin + 1);
            }
            NodeKind::EelExpression { code, code_begin } => {
                for (range, literal) in eel::string_literals(&code) {
                    synthesize_in_string(doc, id, &literal, code_begin + range.start);
                }
                synthesize_helper_calls(doc, id, &code, code_begin, env.helpers);
            }
            NodeKind::ObjectStatement => {
                synthesize_class_reference(doc, id, env.classes);
                synthesize_action_uri(doc, id, package);
            }
            _ => {}
        }
    }
}

/// Resource URIs and `[instanceof …]` clauses inside a string whose first
/// content byte is at `begin`.
fn synthesize_in_string(doc: &mut FusionDocument, parent: NodeId, value: &str, begin: usize) {
    if value.starts_with("resource://") {
        doc.push(
            NodeKind::ResourceUri {
                uri: value.to_string(),
            },
            Span::new(begin, begin + value.len()),
            Some(parent),
        );
    }
    for (range, name) in eel::instanceof_clauses(value) {
        doc.push(
            NodeKind::PrototypeReference { name },
            Span::new(range.start, range.end).offset_by(begin),
            Some(parent),
        );
    }
}

fn synthesize_helper_calls(
    doc: &mut FusionDocument,
    expression: NodeId,
    code: &str,
    code_begin: usize,
    helpers: &[EelHelperToken],
) {
    for token in helpers {
        for call in token.calls(code) {
            let helper = doc.push(
                NodeKind::EelHelper {
                    name: token.name.clone(),
                },
                Span::new(call.name.start, call.name.end).offset_by(code_begin),
                Some(expression),
            );
            doc.push(
                NodeKind::EelHelperMethod {
                    helper: token.name.clone(),
                    method: call.method_name,
                },
                Span::new(call.method.start, call.method.end).offset_by(code_begin),
                Some(helper),
            );
        }
    }
}

/// The string value node assigned by `statement`, with its value.
fn string_value(doc: &FusionDocument, statement: NodeId) -> Option<(NodeId, String)> {
    let value = doc.assigned_value(statement)?;
    match doc.kind(value) {
        NodeKind::StringValue { value: text } => Some((value, text.clone())),
        _ => None,
    }
}

/// Span of a quoted string's content.
fn string_content_span(doc: &FusionDocument, value: NodeId) -> Span {
    let span = doc.span(value);
    Span::new(span.begin + 1, span.end.saturating_sub(1).max(span.begin + 1))
}

fn synthesize_class_reference(doc: &mut FusionDocument, statement: NodeId, classes: &dyn ClassLookup) {
    let Some(&last) = doc.path_segments(statement).last() else {
        return;
    };
    let is_class_meta = matches!(
        doc.kind(last),
        NodeKind::MetaPathSegment { identifier } if CLASS_META_PROPERTIES.contains(&identifier.as_str())
    );
    if !is_class_meta {
        return;
    }
    let Some((value, fqcn)) = string_value(doc, statement) else {
        return;
    };
    let fqcn = fqcn.trim_start_matches('\\').to_string();
    if classes.class_definition(&fqcn).is_none() {
        return;
    }
    let span = string_content_span(doc, value);
    doc.push(NodeKind::PhpClassReference { fqcn }, span, Some(value));
}

fn synthesize_action_uri(doc: &mut FusionDocument, statement: NodeId, package: Option<&str>) {
    if !doc
        .instantiated_prototype(statement)
        .is_some_and(|name| ACTION_URI_PROTOTYPES.contains(&name))
    {
        return;
    }

    let mut package_key = package.map(str::to_string);
    let mut controller = None;
    let mut action = None;
    for child in doc.block_statements(statement) {
        let [segment] = doc.path_segments(child) else {
            continue;
        };
        let Some((value, text)) = string_value(doc, child) else {
            continue;
        };
        match doc.segment_identifier(*segment) {
            Some("package") => package_key = Some(text),
            Some("controller") => controller = Some((value, text)),
            Some("action") => action = Some((value, text)),
            _ => {}
        }
    }

    let (Some(package), Some((controller_node, controller))) = (package_key, controller) else {
        return;
    };
    let span = string_content_span(doc, controller_node);
    doc.push(
        NodeKind::ActionUriController {
            package: package.clone(),
            controller: controller.clone(),
        },
        span,
        Some(controller_node),
    );
    if let Some((action_node, action)) = action {
        let span = string_content_span(doc, action_node);
        doc.push(
            NodeKind::ActionUriAction {
                package,
                controller,
                action,
            },
            span,
            Some(action_node),
        );
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
