//! Property scope resolution.
//!
//! Answers "which statement defines `X`" for a `props.X` / `this.X`
//! reference.  Candidate definition segments are collected in priority
//! order; callers match by identifier and take the first hit.
//!
//! The walk follows Fusion's scoping rules:
//!
//! * statements next to the reference and in every enclosing block, up to
//!   (not including) the file's top level;
//! * the bodies of every declaration of a prototype whose body is being
//!   walked, and of its base prototypes;
//! * `@apply` statements, which either forward the caller's props
//!   (`${props}`) or declare properties through a `Neos.Fusion:DataStructure`;
//! * `@propTypes` children, which count as declarations without a value;
//! * `renderer` boundaries: once the walk leaves the renderer of a
//!   prototype, the plain properties of the next level are no longer in
//!   scope.  Pass-through prototypes such as `Neos.Fusion:Case` do not open
//!   a new scope.
use std::collections::HashSet;

use crate::fusion::{FusionDocument, NodeId, NodeKind, NodeType, eel};
use crate::parsed_file::ParsedFile;

/// Prototypes whose `renderer` does not open a new props scope.
pub const PASS_THROUGH_PROTOTYPES: [&str; 4] = [
    "Neos.Fusion:Case",
    "Neos.Fusion:Loop",
    "Neos.Neos:ImageUri",
    "Neos.Neos:NodeUri",
];

const DATA_STRUCTURE: &str = "Neos.Fusion:DataStructure";

/// Inheritance chains longer than this are treated as cyclic.
const MAX_INHERITANCE_DEPTH: usize = 20;

/// A path segment in one of the workspace's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentRef {
    /// Index into the resolver's file list.
    pub file: usize,
    pub statement: NodeId,
    pub segment: NodeId,
}

/// Candidate definitions for a reference, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyScope {
    pub segments: Vec<SegmentRef>,
    /// An `@apply` of `${props}` was found, so any name may be declared.
    pub applies_props: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(SegmentRef),
    /// Not declared explicitly, but props are forwarded wholesale.
    AppliedProps,
    Unresolved,
}

/// A statement plus the index of the path segment that names the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    file: usize,
    statement: NodeId,
    index: usize,
}

pub struct ScopeResolver<'a> {
    files: &'a [ParsedFile],
}

impl<'a> ScopeResolver<'a> {
    pub fn new(files: &'a [ParsedFile]) -> Self {
        Self { files }
    }

    fn doc(&self, file: usize) -> &'a FusionDocument {
        self.files[file].document()
    }

    fn identifier(&self, segment: SegmentRef) -> Option<&'a str> {
        self.doc(segment.file).segment_identifier(segment.segment)
    }

    // ── prototypes ──────────────────────────────────────────────────────

    /// Every creation and overwrite of `prototype` in the workspace.
    pub fn declarations(&self, prototype: &str) -> Vec<SegmentRef> {
        let mut declarations = Vec::new();
        for (index, file) in self.files.iter().enumerate() {
            for segment in file.prototype_declarations(prototype) {
                if let Some(statement) = file.statement_of(segment) {
                    declarations.push(SegmentRef {
                        file: index,
                        statement,
                        segment,
                    });
                }
            }
        }
        declarations
    }

    /// The prototype `prototype` is created from, if any.
    pub fn base_prototype(&self, prototype: &str) -> Option<&'a str> {
        self.files.iter().find_map(|file| {
            let doc = file.document();
            file.prototype_creations()
                .iter()
                .find(|&&creation| doc.segment_identifier(creation) == Some(prototype))
                .and_then(|&creation| file.extends_of(creation))
                .and_then(|base| doc.segment_identifier(base))
        })
    }

    /// `prototype` followed by its base prototypes, nearest first.
    pub fn prototype_chain(&self, prototype: &str) -> Vec<String> {
        let mut chain = vec![prototype.to_string()];
        let mut visited: HashSet<String> = chain.iter().cloned().collect();
        let mut current = prototype.to_string();
        while chain.len() < MAX_INHERITANCE_DEPTH {
            let Some(base) = self.base_prototype(&current) else {
                break;
            };
            if !visited.insert(base.to_string()) {
                break;
            }
            chain.push(base.to_string());
            current = base.to_string();
        }
        chain
    }

    /// Property entries declared by `prototype` and its bases, skipping the
    /// declaration statement `exclude`.
    fn inherited_entries(&self, prototype: &str, exclude: Option<(usize, NodeId)>) -> Vec<Entry> {
        let mut entries = Vec::new();
        for name in self.prototype_chain(prototype) {
            for declaration in self.declarations(&name) {
                if exclude == Some((declaration.file, declaration.statement)) {
                    continue;
                }
                let doc = self.doc(declaration.file);
                let segments = doc.path_segments(declaration.statement);
                let Some(position) = segments.iter().position(|&s| s == declaration.segment) else {
                    continue;
                };
                if position + 1 < segments.len() {
                    // prototype(A).title = …
                    entries.push(Entry {
                        file: declaration.file,
                        statement: declaration.statement,
                        index: position + 1,
                    });
                } else {
                    entries.extend(doc.block_statements(declaration.statement).into_iter().map(
                        |statement| Entry {
                            file: declaration.file,
                            statement,
                            index: 0,
                        },
                    ));
                }
            }
        }
        entries
    }

    /// Every property `prototype` declares, inherited ones included.
    pub fn prototype_properties(&self, prototype: &str) -> PropertyScope {
        let mut scope = PropertyScope::default();
        let entries = self.inherited_entries(prototype, None);
        scope.applies_props = self.visit_entries(&entries, false, &mut scope);
        scope
    }

    // ── statements ──────────────────────────────────────────────────────

    /// The statement owning the block `statement` sits in.
    fn owner_statement(&self, file: usize, statement: NodeId) -> Option<NodeId> {
        let doc = self.doc(file);
        doc.list_owner(doc.parent(statement)?)
    }

    /// The prototype a statement's block belongs to: the one it
    /// instantiates, else the one it declares.
    fn statement_prototype(&self, file: usize, statement: NodeId) -> Option<&'a str> {
        let doc = self.doc(file);
        doc.instantiated_prototype(statement).or_else(|| {
            let &first = doc.path_segments(statement).first()?;
            match doc.kind(first) {
                NodeKind::PrototypePathSegment { identifier } => Some(identifier.as_str()),
                _ => None,
            }
        })
    }

    /// The nearest prototype `statement` is nested in.
    fn enclosing_prototype(&self, file: usize, statement: NodeId) -> Option<&'a str> {
        let doc = self.doc(file);
        let segments = doc.path_segments(statement);
        if segments.len() > 1 {
            // prototype(A).renderer names its prototype itself
            if let NodeKind::PrototypePathSegment { identifier } = doc.kind(segments[0]) {
                return Some(identifier);
            }
        }
        let mut current = statement;
        while let Some(owner) = self.owner_statement(file, current) {
            if let Some(prototype) = self.statement_prototype(file, owner) {
                return Some(prototype);
            }
            current = owner;
        }
        None
    }

    /// Whether `statement` is a `renderer` that opens a new props scope.
    pub fn is_renderer_boundary(&self, file: usize, statement: NodeId) -> bool {
        let doc = self.doc(file);
        let is_renderer = doc
            .path_segments(statement)
            .last()
            .and_then(|&s| doc.segment_identifier(s))
            == Some("renderer");
        is_renderer
            && !self
                .enclosing_prototype(file, statement)
                .is_some_and(|p| PASS_THROUGH_PROTOTYPES.contains(&p))
    }

    // ── the walk ────────────────────────────────────────────────────────

    /// Nested entries of `@apply` / `@propTypes`: the next segment of a
    /// dotted path, or the statements of its block.
    fn nested_entries(&self, entry: Entry) -> Vec<Entry> {
        let doc = self.doc(entry.file);
        if entry.index + 1 < doc.path_segments(entry.statement).len() {
            return vec![Entry {
                index: entry.index + 1,
                ..entry
            }];
        }
        doc.block_statements(entry.statement)
            .into_iter()
            .map(|statement| Entry {
                file: entry.file,
                statement,
                index: 0,
            })
            .collect()
    }

    fn entry_segment(&self, entry: Entry) -> Option<SegmentRef> {
        let segment = *self.doc(entry.file).path_segments(entry.statement).get(entry.index)?;
        Some(SegmentRef {
            file: entry.file,
            statement: entry.statement,
            segment,
        })
    }

    /// Whether an `@apply` entry forwards `${props}`.  Properties of an
    /// applied `Neos.Fusion:DataStructure` are added to `scope` directly.
    fn applies_props(&self, entry: Entry, scope: &mut PropertyScope) -> bool {
        let mut applies = false;
        for nested in self.nested_entries(entry) {
            let doc = self.doc(nested.file);
            if nested.index + 1 != doc.path_segments(nested.statement).len() {
                continue;
            }
            let Some(value) = doc.assigned_value(nested.statement) else {
                continue;
            };
            match doc.kind(value) {
                NodeKind::EelExpression { code, .. } if eel::is_bare_props(code) => applies = true,
                NodeKind::FusionObjectValue { name } if name == DATA_STRUCTURE => {
                    for statement in doc.block_statements(nested.statement) {
                        let Some(&segment) = doc.path_segments(statement).first() else {
                            continue;
                        };
                        if matches!(doc.kind(segment), NodeKind::PathSegment { .. }) {
                            scope.segments.push(SegmentRef {
                                file: nested.file,
                                statement,
                                segment,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        applies
    }

    /// Classify one level's entries into `scope`.  Returns whether an
    /// `@apply` of props was among them.
    fn visit_entries(&self, entries: &[Entry], skip_plain: bool, scope: &mut PropertyScope) -> bool {
        let mut deferred = Vec::new();
        let mut found_apply = false;

        for &entry in entries {
            let Some(segment) = self.entry_segment(entry) else {
                continue;
            };
            match self.doc(entry.file).kind(segment.segment) {
                NodeKind::MetaPathSegment { identifier } if identifier.eq_ignore_ascii_case("proptypes") => {
                    deferred.push(entry);
                }
                NodeKind::MetaPathSegment { identifier } if identifier == "apply" => {
                    if self.applies_props(entry, scope) {
                        found_apply = true;
                    }
                }
                NodeKind::PathSegment { .. } if !skip_plain => scope.segments.push(segment),
                _ => {}
            }
        }

        for entry in deferred {
            scope
                .segments
                .extend(self.nested_entries(entry).into_iter().filter_map(|e| self.entry_segment(e)));
        }

        scope.applies_props |= found_apply;
        found_apply
    }

    /// `renderer.x` references answer from the surrounding prototype.
    fn collect_renderer_path(&self, file: usize, statement: NodeId, scope: &mut PropertyScope) {
        let doc = self.doc(file);
        let mut path: Vec<String> = Vec::new();
        let mut current = statement;
        let mut target = None;
        // `prototype(A).renderer` names its prototype in the same path
        let mut in_own_path = false;

        loop {
            let segments = doc.path_segments(current);
            let prototype_at = segments
                .iter()
                .rposition(|&s| matches!(doc.kind(s), NodeKind::PrototypePathSegment { .. }));
            let own = &segments[prototype_at.map(|p| p + 1).unwrap_or(0)..];
            let own: Vec<String> = own
                .iter()
                .map(|&s| match doc.kind(s) {
                    NodeKind::MetaPathSegment { identifier } => format!("@{}", identifier),
                    _ => doc.segment_identifier(s).unwrap_or_default().to_string(),
                })
                .collect();
            path.splice(0..0, own);

            if let Some(position) = prototype_at {
                target = doc.segment_identifier(segments[position]).map(|name| (name, current));
                in_own_path = current == statement;
                break;
            }
            let Some(owner) = self.owner_statement(file, current) else {
                break;
            };
            if let Some(prototype) = self.statement_prototype(file, owner) {
                target = Some((prototype, owner));
                break;
            }
            current = owner;
        }

        let renderer_path = match path.as_slice() {
            [first] => first == "renderer" && in_own_path,
            [first, second, ..] => first == "renderer" && second != "@process",
            [] => false,
        };
        let Some((prototype, anchor)) = target.filter(|_| renderer_path) else {
            return;
        };
        let entries = self.inherited_entries(prototype, None);
        self.visit_entries(&entries, false, scope);

        if let Some(outer) = self.enclosing_prototype(file, anchor).filter(|&p| p != prototype) {
            let entries = self.inherited_entries(outer, None);
            self.visit_entries(&entries, false, scope);
        }
    }

    /// Candidate definitions for the reference `node` in `file`.
    pub fn property_scope(&self, file: usize, node: NodeId) -> PropertyScope {
        let mut scope = PropertyScope::default();
        let parsed = &self.files[file];
        let doc = parsed.document();
        let Some(statement) = parsed.statement_of(node) else {
            return scope;
        };
        let Some(mut list) = doc.parent(statement) else {
            return scope;
        };

        self.collect_renderer_path(file, statement, &mut scope);

        let in_dsl = doc.find_parent(node, NodeType::DslExpression).is_some();
        let mut came_from_renderer = in_dsl && self.is_renderer_boundary(file, statement);
        let mut skip_plain = false;
        let mut found_apply = false;
        let mut exclude = statement;

        loop {
            let owner = doc.list_owner(list);
            let mut entries: Vec<Entry> = doc
                .list_statements(list)
                .into_iter()
                .filter(|&s| s != exclude)
                .map(|statement| Entry {
                    file,
                    statement,
                    index: 0,
                })
                .collect();
            if let Some(prototype) = owner.and_then(|o| doc.declared_prototype(o)) {
                entries.extend(self.inherited_entries(prototype, owner.map(|o| (file, o))));
            }
            found_apply |= self.visit_entries(&entries, skip_plain, &mut scope);

            let Some(owner) = owner else {
                break;
            };
            let Some(next_list) = doc.parent(owner) else {
                break;
            };
            let boundary = doc
                .list_owner(next_list)
                .is_some_and(|next_owner| self.is_renderer_boundary(file, next_owner));
            skip_plain = boundary;
            came_from_renderer |= boundary;

            if (came_from_renderer && found_apply) || doc.is_top_level_list(next_list) {
                break;
            }
            exclude = owner;
            list = next_list;
        }

        scope
    }

    /// The first candidate named like the second component of `path`
    /// (`props.title.x` → `title`).  `renderer` is never a property.
    pub fn find_property_definition_segment(&self, file: usize, node: NodeId, path: &str) -> Option<SegmentRef> {
        let name = property_name(path)?;
        self.first_named(&self.property_scope(file, node), name)
    }

    /// Resolve the `props.X` / `this.X` reference `node`.
    pub fn resolve(&self, file: usize, node: NodeId, path: &str) -> Resolution {
        let Some(name) = property_name(path) else {
            return Resolution::Unresolved;
        };
        let scope = self.property_scope(file, node);
        match self.first_named(&scope, name) {
            Some(segment) => Resolution::Found(segment),
            None if scope.applies_props => Resolution::AppliedProps,
            None => Resolution::Unresolved,
        }
    }

    /// Resolve an AFX attribute against the properties of its tag's
    /// prototype.
    pub fn resolve_attribute(&self, prototype: &str, attribute: &str) -> Resolution {
        let scope = self.prototype_properties(prototype);
        match self.first_named(&scope, attribute) {
            Some(segment) => Resolution::Found(segment),
            None if scope.applies_props => Resolution::AppliedProps,
            None => Resolution::Unresolved,
        }
    }

    fn first_named(&self, scope: &PropertyScope, name: &str) -> Option<SegmentRef> {
        if name == "renderer" {
            return None;
        }
        scope
            .segments
            .iter()
            .copied()
            .find(|&segment| self.identifier(segment) == Some(name))
    }

    /// Distinct property names in scope, in priority order.
    pub fn property_names(&self, scope: &PropertyScope) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        scope
            .segments
            .iter()
            .filter_map(|&segment| self.identifier(segment))
            .filter(|&name| name != "renderer" && seen.insert(name))
            .collect()
    }
}

/// `props.title.x` → `title`.
pub fn property_name(path: &str) -> Option<&str> {
    path.split('.').nth(1).filter(|name| !name.is_empty())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::parsed_file::IndexEnv;
    use crate::php::{ClassDefinition, ClassLookup};
    use std::sync::Arc;

    struct NoClasses;

    impl ClassLookup for NoClasses {
        fn class_definition(&self, _fqcn: &str) -> Option<Arc<ClassDefinition>> {
            None
        }
    }

    fn files(texts: &[&str]) -> Vec<ParsedFile> {
        let context = Context::new();
        let env = IndexEnv {
            context: &context,
            helpers: &[],
            classes: &NoClasses,
        };
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut file = ParsedFile::new(format!("file:///{}.fusion", i), None);
                file.init(text.to_string(), &env);
                assert!(!file.is_ignored(), "fixture {} does not parse", i);
                file
            })
            .collect()
    }

    /// The n-th `EelObjectPath` with the given path in file 0.
    fn reference(files: &[ParsedFile], path: &str) -> NodeId {
        let file = &files[0];
        file.nodes_of_type(NodeType::EelObjectPath)
            .iter()
            .copied()
            .find(|&id| matches!(file.kind(id), NodeKind::EelObjectPath { path: p } if p == path))
            .expect("reference exists")
    }

    fn resolve(files: &[ParsedFile], path: &str) -> Resolution {
        let resolver = ScopeResolver::new(files);
        resolver.resolve(0, reference(files, path), path)
    }

    fn found_text(files: &[ParsedFile], resolution: Resolution) -> (usize, String) {
        let Resolution::Found(segment) = resolution else {
            panic!("expected a definition, got {:?}", resolution);
        };
        let file = &files[segment.file];
        let span = file.document().span(segment.statement);
        (segment.file, file.text()[span.begin..span.end].to_string())
    }

    #[test]
    fn test_property_in_own_body() {
        let files = files(&["prototype(Vendor:Foo) {\n    title = \"x\"\n    renderer = ${props.title}\n}\n"]);
        assert_eq!(found_text(&files, resolve(&files, "props.title")), (0, "title = \"x\"".to_string()));
    }

    #[test]
    fn test_property_inherited_from_base_prototype() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Vendor:Bar) {\n    renderer = afx`<h1>{props.title}</h1>`\n}\n",
            "prototype(Vendor:Bar) < prototype(Neos.Fusion:Component) {\n    title = \"x\"\n}\n",
        ]);
        assert_eq!(found_text(&files, resolve(&files, "props.title")), (1, "title = \"x\"".to_string()));
    }

    #[test]
    fn test_apply_props_makes_everything_possibly_declared() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    @apply.fromProps = ${props}\n    renderer = afx`<p>{props.anything}</p>`\n}\n",
        ]);
        assert_eq!(resolve(&files, "props.anything"), Resolution::AppliedProps);

        let files = files_without_apply();
        assert_eq!(resolve(&files, "props.anything"), Resolution::Unresolved);
    }

    fn files_without_apply() -> Vec<ParsedFile> {
        files(&["prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    renderer = afx`<p>{props.anything}</p>`\n}\n"])
    }

    #[test]
    fn test_data_structure_apply_declares_its_children() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    @apply.extra = Neos.Fusion:DataStructure {\n        headline = 'x'\n    }\n    renderer = ${props.headline + props.other}\n}\n",
        ]);
        assert_eq!(found_text(&files, resolve(&files, "props.headline")).1, "headline = 'x'");
        assert_eq!(resolve(&files, "props.other"), Resolution::Unresolved);
    }

    #[test]
    fn test_proptypes_count_as_declarations() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    @propTypes {\n        title = ${PropTypes.string}\n    }\n    renderer = ${props.title}\n}\n",
        ]);
        assert_eq!(found_text(&files, resolve(&files, "props.title")).1, "title = ${PropTypes.string}");
    }

    #[test]
    fn test_renderer_path_answers_from_enclosing_prototype() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Vendor:Base) {\n    renderer.content = ${props.title}\n}\n\
             prototype(Vendor:Base) {\n    title = 'x'\n}\n",
        ]);
        assert_eq!(found_text(&files, resolve(&files, "props.title")).1, "title = 'x'");
    }

    #[test]
    fn test_prototype_renderer_path_outside_the_block() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    title = 'x'\n}\n\
             prototype(Vendor:Foo).renderer = ${props.title + props.missing}\n",
        ]);
        assert_eq!(found_text(&files, resolve(&files, "props.title")).1, "title = 'x'");
        assert_eq!(resolve(&files, "props.missing"), Resolution::Unresolved);
    }

    #[test]
    fn test_crossing_a_renderer_boundary_skips_plain_properties() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    title = 'x'\n    renderer = Vendor:Inner {\n        label = 'y'\n        items = Neos.Fusion:Map {\n            itemRenderer = ${props.label + props.title}\n        }\n    }\n}\n",
        ]);
        assert_eq!(resolve(&files, "props.label"), Resolution::Unresolved);
        assert_eq!(found_text(&files, resolve(&files, "props.title")).1, "title = 'x'");
    }

    #[test]
    fn test_pass_through_prototypes_are_not_boundaries() {
        let files = files(&[
            "prototype(Vendor:Foo) < prototype(Neos.Fusion:Component) {\n    title = 'x'\n    renderer = Neos.Fusion:Case {\n        default {\n            condition = true\n            renderer = ${props.title}\n        }\n    }\n}\n",
        ]);
        let file = &files[0];
        let doc = file.document();
        let renderers: Vec<NodeId> = file
            .nodes_of_type(NodeType::ObjectStatement)
            .iter()
            .copied()
            .filter(|&s| doc.path_string(s) == "renderer")
            .collect();
        assert_eq!(renderers.len(), 2);

        let resolver = ScopeResolver::new(&files);
        assert!(resolver.is_renderer_boundary(0, renderers[0]));
        assert!(!resolver.is_renderer_boundary(0, renderers[1]));
        assert_eq!(found_text(&files, resolve(&files, "props.title")).1, "title = 'x'");
    }

    #[test]
    fn test_attribute_resolution_and_property_names() {
        let files = files(&[
            "prototype(Vendor:Card) < prototype(Vendor:Base) {\n    title = ''\n    renderer = ${props.title}\n}\n\
             prototype(Vendor:Base) {\n    @propTypes.subtitle = ${PropTypes.string}\n    image = null\n}\n",
        ]);
        let resolver = ScopeResolver::new(&files);
        assert!(matches!(resolver.resolve_attribute("Vendor:Card", "image"), Resolution::Found(_)));
        assert!(matches!(resolver.resolve_attribute("Vendor:Card", "subtitle"), Resolution::Found(_)));
        assert_eq!(resolver.resolve_attribute("Vendor:Card", "renderer"), Resolution::Unresolved);

        let scope = resolver.prototype_properties("Vendor:Card");
        assert_eq!(resolver.property_names(&scope), vec!["title", "image", "subtitle"]);
        assert_eq!(resolver.prototype_chain("Vendor:Card"), vec!["Vendor:Card", "Vendor:Base"]);
    }

    #[test]
    fn test_find_property_definition_segment() {
        let files = files(&["prototype(Vendor:Foo) {\n    title = 'x'\n    renderer = ${props.title + props.renderer}\n}\n"]);
        let resolver = ScopeResolver::new(&files);
        let title = resolver
            .find_property_definition_segment(0, reference(&files, "props.title"), "props.title")
            .expect("title is declared");
        assert_eq!(resolver.identifier(title), Some("title"));
        assert_eq!(
            resolver.find_property_definition_segment(0, reference(&files, "props.renderer"), "props.renderer"),
            None
        );
    }

    #[test]
    fn test_cyclic_inheritance_terminates() {
        let files = files(&[
            "prototype(Vendor:A) < prototype(Vendor:B) {\n    renderer = ${props.x}\n}\nprototype(Vendor:B) < prototype(Vendor:A)\n",
        ]);
        assert_eq!(resolve(&files, "props.x"), Resolution::Unresolved);
    }

    #[test]
    fn test_property_name() {
        assert_eq!(property_name("props.title.x"), Some("title"));
        assert_eq!(property_name("this.title"), Some("title"));
        assert_eq!(property_name("props."), None);
        assert_eq!(property_name("props"), None);
    }
}
