//! Arena-backed Fusion syntax tree.
//!
//! Nodes live in a flat `Vec` and are addressed by [`NodeId`].  Parents are
//! stored as ids and children as id lists, so walking up (`ancestors`,
//! `find_parent`) never follows owning references.  Nodes synthesized after
//! parsing (prototype references inside AFX, resource URIs, EEL helper
//! calls, …) are appended to the same arena.

/// Index of a node inside a [`FusionDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Byte range `[begin, end)` in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.begin && offset <= self.end
    }

    /// Shift a span that is relative to `base` into absolute offsets.
    pub fn offset_by(self, base: usize) -> Self {
        Self::new(self.begin + base, self.end + base)
    }
}

/// The kind of a node, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    FusionFile,
    StatementList,
    /// Children: `ObjectPath`, then an optional operation, then an optional `Block`.
    ObjectStatement,
    /// Children: the path segments in order.
    ObjectPath,
    PathSegment {
        identifier: String,
    },
    /// `@identifier`; the identifier is stored without the `@`.
    MetaPathSegment {
        identifier: String,
    },
    /// `prototype(Name)`; the span covers `Name` only.
    PrototypePathSegment {
        identifier: String,
    },
    /// `= value`; child: the value node.
    ValueAssignment,
    /// `< path`; child: the copied `ObjectPath`.
    ValueCopy,
    /// `>`
    ValueUnset,
    /// `{ … }`; child: a `StatementList`.
    Block,
    IncludeStatement {
        path: String,
    },
    StringValue {
        value: String,
    },
    IntValue {
        value: i64,
    },
    FloatValue {
        value: f64,
    },
    BoolValue {
        value: bool,
    },
    NullValue,
    FusionObjectValue {
        name: String,
    },
    /// `${code}` in Fusion, or `{code}` inside AFX.  `code_begin` is the
    /// absolute offset of the first byte of `code`.
    EelExpression {
        code: String,
        code_begin: usize,
    },
    /// `identifier\`code\``
    DslExpression {
        identifier: String,
        code: String,
        code_begin: usize,
    },
    /// `props.a.b` or `this.a.b` inside EEL.
    EelObjectPath {
        path: String,
    },
    /// AFX tag name (opening or closing).
    AfxTag {
        name: String,
        closing: bool,
    },
    AfxAttribute {
        name: String,
    },
    // ── synthesized ─────────────────────────────────────────────────────
    PrototypeReference {
        name: String,
    },
    ResourceUri {
        uri: String,
    },
    EelHelper {
        name: String,
    },
    EelHelperMethod {
        helper: String,
        method: String,
    },
    PhpClassReference {
        fqcn: String,
    },
    ActionUriController {
        package: String,
        controller: String,
    },
    ActionUriAction {
        package: String,
        controller: String,
        action: String,
    },
}

/// Payload-free mirror of [`NodeKind`], used for indexing by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    FusionFile,
    StatementList,
    ObjectStatement,
    ObjectPath,
    PathSegment,
    MetaPathSegment,
    PrototypePathSegment,
    ValueAssignment,
    ValueCopy,
    ValueUnset,
    Block,
    IncludeStatement,
    StringValue,
    IntValue,
    FloatValue,
    BoolValue,
    NullValue,
    FusionObjectValue,
    EelExpression,
    DslExpression,
    EelObjectPath,
    AfxTag,
    AfxAttribute,
    PrototypeReference,
    ResourceUri,
    EelHelper,
    EelHelperMethod,
    PhpClassReference,
    ActionUriController,
    ActionUriAction,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::FusionFile => NodeType::FusionFile,
            NodeKind::StatementList => NodeType::StatementList,
            NodeKind::ObjectStatement => NodeType::ObjectStatement,
            NodeKind::ObjectPath => NodeType::ObjectPath,
            NodeKind::PathSegment { .. } => NodeType::PathSegment,
            NodeKind::MetaPathSegment { .. } => NodeType::MetaPathSegment,
            NodeKind::PrototypePathSegment { .. } => NodeType::PrototypePathSegment,
            NodeKind::ValueAssignment => NodeType::ValueAssignment,
            NodeKind::ValueCopy => NodeType::ValueCopy,
            NodeKind::ValueUnset => NodeType::ValueUnset,
            NodeKind::Block => NodeType::Block,
            NodeKind::IncludeStatement { .. } => NodeType::IncludeStatement,
            NodeKind::StringValue { .. } => NodeType::StringValue,
            NodeKind::IntValue { .. } => NodeType::IntValue,
            NodeKind::FloatValue { .. } => NodeType::FloatValue,
            NodeKind::BoolValue { .. } => NodeType::BoolValue,
            NodeKind::NullValue => NodeType::NullValue,
            NodeKind::FusionObjectValue { .. } => NodeType::FusionObjectValue,
            NodeKind::EelExpression { .. } => NodeType::EelExpression,
            NodeKind::DslExpression { .. } => NodeType::DslExpression,
            NodeKind::EelObjectPath { .. } => NodeType::EelObjectPath,
            NodeKind::AfxTag { .. } => NodeType::AfxTag,
            NodeKind::AfxAttribute { .. } => NodeType::AfxAttribute,
            NodeKind::PrototypeReference { .. } => NodeType::PrototypeReference,
            NodeKind::ResourceUri { .. } => NodeType::ResourceUri,
            NodeKind::EelHelper { .. } => NodeType::EelHelper,
            NodeKind::EelHelperMethod { .. } => NodeType::EelHelperMethod,
            NodeKind::PhpClassReference { .. } => NodeType::PhpClassReference,
            NodeKind::ActionUriController { .. } => NodeType::ActionUriController,
            NodeKind::ActionUriAction { .. } => NodeType::ActionUriAction,
        }
    }

    /// The prototype name this node refers to, if it is any kind of
    /// prototype reference.
    pub fn prototype_name(&self) -> Option<&str> {
        match self {
            NodeKind::PrototypePathSegment { identifier } => Some(identifier),
            NodeKind::FusionObjectValue { name } | NodeKind::PrototypeReference { name } => {
                Some(name)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A source comment, kept for ignore annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub span: Span,
    pub text: String,
}

/// A parsed Fusion file.
#[derive(Debug, Clone, Default)]
pub struct FusionDocument {
    nodes: Vec<Node>,
    pub comments: Vec<Comment>,
}

impl FusionDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `FusionFile` root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The top-level `StatementList`.
    pub fn root_statement_list(&self) -> Option<NodeId> {
        self.nodes.first()?.children.first().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Append a node and link it to `parent`.
    pub fn push(&mut self, kind: NodeKind, span: Span, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            span,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
        }
        id
    }

    pub(crate) fn set_end(&mut self, id: NodeId, end: usize) {
        self.nodes[id.index()].span.end = end;
    }

    /// Walk the parent chain, starting with the direct parent.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    pub fn find_ancestor_where(
        &self,
        id: NodeId,
        predicate: impl Fn(&NodeKind) -> bool,
    ) -> Option<NodeId> {
        self.ancestors(id).find(|&a| predicate(self.kind(a)))
    }

    pub fn find_parent(&self, id: NodeId, node_type: NodeType) -> Option<NodeId> {
        self.find_ancestor_where(id, |kind| kind.node_type() == node_type)
    }

    pub fn child_of_type(&self, id: NodeId, node_type: NodeType) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.kind(c).node_type() == node_type)
    }

    // ── statement accessors ─────────────────────────────────────────────

    pub fn statement_path(&self, statement: NodeId) -> Option<NodeId> {
        self.child_of_type(statement, NodeType::ObjectPath)
    }

    /// The ordered path segments of an `ObjectStatement`.
    pub fn path_segments(&self, statement: NodeId) -> &[NodeId] {
        match self.statement_path(statement) {
            Some(path) => self.children(path),
            None => &[],
        }
    }

    pub fn statement_operation(&self, statement: NodeId) -> Option<NodeId> {
        self.children(statement).iter().copied().find(|&c| {
            matches!(
                self.kind(c),
                NodeKind::ValueAssignment | NodeKind::ValueCopy | NodeKind::ValueUnset
            )
        })
    }

    pub fn statement_block(&self, statement: NodeId) -> Option<NodeId> {
        self.child_of_type(statement, NodeType::Block)
    }

    /// The value node of a `path = value` statement.
    pub fn assigned_value(&self, statement: NodeId) -> Option<NodeId> {
        let operation = self.statement_operation(statement)?;
        match self.kind(operation) {
            NodeKind::ValueAssignment => self.children(operation).first().copied(),
            _ => None,
        }
    }

    /// The `ObjectPath` on the right of `path < path`.
    pub fn copied_path(&self, statement: NodeId) -> Option<NodeId> {
        let operation = self.statement_operation(statement)?;
        match self.kind(operation) {
            NodeKind::ValueCopy => self.child_of_type(operation, NodeType::ObjectPath),
            _ => None,
        }
    }

    /// Statements inside a statement list.
    pub fn list_statements(&self, list: NodeId) -> Vec<NodeId> {
        self.children(list)
            .iter()
            .copied()
            .filter(|&c| matches!(self.kind(c), NodeKind::ObjectStatement))
            .collect()
    }

    /// Statements inside the `{ … }` block of `statement`.
    pub fn block_statements(&self, statement: NodeId) -> Vec<NodeId> {
        self.statement_block(statement)
            .and_then(|block| self.child_of_type(block, NodeType::StatementList))
            .map(|list| self.list_statements(list))
            .unwrap_or_default()
    }

    /// The statement owning a statement list, if the list is a block body.
    pub fn list_owner(&self, list: NodeId) -> Option<NodeId> {
        let block = self.parent(list)?;
        if !matches!(self.kind(block), NodeKind::Block) {
            return None;
        }
        self.parent(block)
    }

    /// Whether `list` is the file's top-level statement list.
    pub fn is_top_level_list(&self, list: NodeId) -> bool {
        self.parent(list)
            .is_some_and(|p| matches!(self.kind(p), NodeKind::FusionFile))
    }

    /// Identifier of any path segment kind.
    pub fn segment_identifier(&self, segment: NodeId) -> Option<&str> {
        match self.kind(segment) {
            NodeKind::PathSegment { identifier }
            | NodeKind::MetaPathSegment { identifier }
            | NodeKind::PrototypePathSegment { identifier } => Some(identifier),
            _ => None,
        }
    }

    /// The name of the prototype declared by a `prototype(Name) …` statement
    /// whose path consists of that single segment.
    pub fn declared_prototype(&self, statement: NodeId) -> Option<&str> {
        match self.path_segments(statement) {
            [only] => match self.kind(*only) {
                NodeKind::PrototypePathSegment { identifier } => Some(identifier),
                _ => None,
            },
            _ => None,
        }
    }

    /// The prototype instantiated by `path = Vendor:Name`.
    pub fn instantiated_prototype(&self, statement: NodeId) -> Option<&str> {
        let value = self.assigned_value(statement)?;
        match self.kind(value) {
            NodeKind::FusionObjectValue { name } => Some(name),
            _ => None,
        }
    }

    /// Dotted rendering of a statement's own path.
    pub fn path_string(&self, statement: NodeId) -> String {
        self.path_segments(statement)
            .iter()
            .map(|&s| match self.kind(s) {
                NodeKind::MetaPathSegment { identifier } => format!("@{}", identifier),
                NodeKind::PrototypePathSegment { identifier } => {
                    format!("prototype({})", identifier)
                }
                NodeKind::PathSegment { identifier } => identifier.clone(),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}
