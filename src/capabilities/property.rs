//! `props.x` / `this.x` references and attributes of prototype tags.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, LocationLink,
};

use super::{
    Capability, CapabilityContext, CapabilityElement, DIAGNOSTIC_SOURCE, ElementResult, fenced,
    statement_link,
};
use crate::fusion::{NodeId, NodeKind, NodeType};
use crate::parsed_file::ParsedFile;
use crate::scope::{Resolution, SegmentRef, property_name};

/// `props.ti` right before the cursor.
static PROPERTY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:props|this)\.([A-Za-z0-9_-]*)$").expect("valid property prefix regex")
});

pub struct PropertyElement;

/// The prototype of the AFX tag an attribute belongs to.
fn attribute_prototype(parsed: &ParsedFile, attribute: NodeId) -> Option<&str> {
    let tag = parsed.document().parent(attribute)?;
    match parsed.kind(tag) {
        NodeKind::AfxTag { name, .. } if name.contains(':') => Some(name),
        _ => None,
    }
}

/// A one-line rendering of the value a statement assigns.
pub fn render_value(parsed: &ParsedFile, statement: NodeId) -> Option<String> {
    let doc = parsed.document();
    let value = doc.assigned_value(statement)?;
    let rendered = match doc.kind(value) {
        NodeKind::StringValue { value } => format!("'{}'", value),
        NodeKind::IntValue { value } => value.to_string(),
        NodeKind::FloatValue { value } => value.to_string(),
        NodeKind::BoolValue { value } => value.to_string(),
        NodeKind::NullValue => "null".to_string(),
        NodeKind::FusionObjectValue { name } => name.clone(),
        NodeKind::EelExpression { .. } | NodeKind::DslExpression { .. } => {
            let span = doc.span(value);
            let source = parsed.text().get(span.begin..span.end)?;
            match source.split_once('\n') {
                Some((first, _)) => format!("{} …", first.trim_end()),
                None => source.to_string(),
            }
        }
        _ => return None,
    };
    Some(rendered)
}

fn describe(parsed: &ParsedFile, statement: NodeId) -> String {
    let path = parsed.document().path_string(statement);
    match render_value(parsed, statement) {
        Some(value) => format!("{} = {}", path, value),
        None => path,
    }
}

impl PropertyElement {
    fn resolve(&self, cx: &CapabilityContext<'_>) -> Option<Resolution> {
        let node = cx.node?;
        let parsed = cx.parsed();
        let scope = cx.workspace.scope();
        match parsed.kind(node) {
            NodeKind::EelObjectPath { path } => Some(scope.resolve(cx.file, node, path)),
            NodeKind::AfxAttribute { name } => {
                let prototype = attribute_prototype(parsed, node)?;
                Some(scope.resolve_attribute(prototype, name))
            }
            _ => None,
        }
    }
}

impl CapabilityElement for PropertyElement {
    fn name(&self) -> &'static str {
        "property"
    }

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool {
        match capability {
            Capability::Completion | Capability::Diagnostics => true,
            Capability::Definition | Capability::Hover => matches!(
                node,
                Some(NodeKind::EelObjectPath { .. } | NodeKind::AfxAttribute { .. })
            ),
            _ => false,
        }
    }

    fn definition(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        let Some(Resolution::Found(segment)) = self.resolve(cx) else {
            return Ok(Vec::new());
        };
        Ok(vec![statement_link(
            cx.workspace,
            cx.origin_range(),
            segment.file,
            segment.statement,
            segment.segment,
        )?])
    }

    fn hover(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        Ok(match self.resolve(cx) {
            Some(Resolution::Found(segment)) => {
                let parsed = &cx.workspace.files[segment.file];
                Some(fenced("fusion", &describe(parsed, segment.statement)))
            }
            Some(Resolution::AppliedProps) => Some("Passed in through `@apply`".to_string()),
            _ => None,
        })
    }

    fn completion(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<CompletionItem>> {
        let Some(caps) = PROPERTY_PREFIX.captures(cx.line_prefix()) else {
            return Ok(Vec::new());
        };
        let typed = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let Some(node) = cx.node else {
            return Ok(Vec::new());
        };

        let resolver = cx.workspace.scope();
        let scope = resolver.property_scope(cx.file, node);
        let mut seen = HashSet::new();
        let items = scope
            .segments
            .iter()
            .filter_map(|&segment: &SegmentRef| {
                let parsed = &cx.workspace.files[segment.file];
                let name = parsed.document().segment_identifier(segment.segment)?;
                if name == "renderer" || !name.starts_with(typed) || !seen.insert(name) {
                    return None;
                }
                Some(CompletionItem {
                    label: name.to_string(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    detail: render_value(parsed, segment.statement),
                    ..CompletionItem::default()
                })
            })
            .collect();
        Ok(items)
    }

    fn diagnostics(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<Diagnostic>> {
        let parsed = cx.parsed();
        let scope = cx.workspace.scope();
        let mut diagnostics = Vec::new();

        for &node in parsed.nodes_of_type(NodeType::EelObjectPath) {
            let NodeKind::EelObjectPath { path } = parsed.kind(node) else {
                continue;
            };
            if !path.starts_with("props.") {
                continue;
            }
            let Some(name) = property_name(path) else {
                continue;
            };
            if parsed.is_ignored_by_comment(node) {
                continue;
            }
            if scope.resolve(cx.file, node, path) != Resolution::Unresolved {
                continue;
            }
            diagnostics.push(Diagnostic {
                range: parsed.range_of(node),
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("Could not resolve \"props.{}\"", name),
                data: Some(json!({ "quickAction": "ignorable" })),
                ..Diagnostic::default()
            });
        }
        Ok(diagnostics)
    }
}

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

    #[test]
    fn test_render_value() {
        let context = Context::new();
        let env = IndexEnv {
            context: &context,
            helpers: &[],
            classes: &NoClasses,
        };
        let mut file = ParsedFile::new("file:///a.fusion", None);
        file.init(
            "a = 'x'\nb = 12\nc = Neos.Fusion:Value\nd = ${props.a}\ne = afx`\n  <p/>\n`\nf {\n}\n".to_string(),
            &env,
        );
        let doc = file.document();
        let statements = doc.list_statements(doc.root_statement_list().expect("root list"));
        let rendered: Vec<Option<String>> = statements.iter().map(|&s| render_value(&file, s)).collect();
        assert_eq!(
            rendered,
            vec![
                Some("'x'".to_string()),
                Some("12".to_string()),
                Some("Neos.Fusion:Value".to_string()),
                Some("${props.a}".to_string()),
                Some("afx` …".to_string()),
                None,
            ]
        );
        assert_eq!(describe(&file, statements[0]), "a = 'x'");
        assert_eq!(describe(&file, statements[5]), "f");
    }
}
