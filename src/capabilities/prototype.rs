//! Prototype names: `prototype(A)`, `A { … }` values and `<A>` tags.
use serde_json::json;
use tower_lsp::lsp_types::{
    CodeLens, Command, CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity,
    Location, LocationLink, TextEdit, Url,
};

use super::{
    Capability, CapabilityContext, CapabilityElement, DIAGNOSTIC_SOURCE, ElementResult, fenced,
    statement_link, url,
};
use crate::fusion::{NodeId, NodeKind, NodeType};
use crate::workspace::Workspace;

const PROTOTYPE_NODE_TYPES: [NodeType; 3] = [
    NodeType::PrototypePathSegment,
    NodeType::FusionObjectValue,
    NodeType::PrototypeReference,
];

pub struct PrototypeElement;

/// Byte offset where the prototype name ending at the end of `prefix`
/// begins.
fn word_start(prefix: &str) -> usize {
    prefix
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '.' || c == ':'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

/// Every node naming `prototype`, as `(file, node)`.
fn occurrences(workspace: &Workspace, prototype: &str) -> Vec<(usize, NodeId)> {
    let mut found = Vec::new();
    for (index, file) in workspace.files.iter().enumerate() {
        for node_type in PROTOTYPE_NODE_TYPES {
            for &node in file.nodes_of_type(node_type) {
                if file.kind(node).prototype_name() == Some(prototype) {
                    found.push((index, node));
                }
            }
        }
    }
    found
}

/// Occurrences that use `prototype` rather than declare it.
fn usages(workspace: &Workspace, prototype: &str) -> Vec<(usize, NodeId)> {
    occurrences(workspace, prototype)
        .into_iter()
        .filter(|&(file, node)| {
            let parsed = &workspace.files[file];
            !parsed.prototype_creations().contains(&node) && !parsed.prototype_overwrites().contains(&node)
        })
        .collect()
}

/// `Vendor.Site:Card` → `Vendor.Site`.
fn package_prefix(prototype: &str) -> Option<&str> {
    prototype.split_once(':').map(|(package, _)| package)
}

impl PrototypeElement {
    fn prototype_at<'a>(&self, cx: &CapabilityContext<'a>) -> Option<&'a str> {
        cx.node_kind().and_then(NodeKind::prototype_name)
    }
}

impl CapabilityElement for PrototypeElement {
    fn name(&self) -> &'static str {
        "prototype"
    }

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool {
        match capability {
            Capability::Completion | Capability::CodeLens | Capability::Diagnostics => true,
            Capability::Definition | Capability::Hover | Capability::References | Capability::Rename => {
                node.and_then(NodeKind::prototype_name).is_some()
            }
            _ => false,
        }
    }

    fn definition(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        let Some(prototype) = self.prototype_at(cx) else {
            return Ok(Vec::new());
        };
        let origin = cx.origin_range();
        cx.workspace
            .scope()
            .declarations(prototype)
            .into_iter()
            .map(|d| statement_link(cx.workspace, origin, d.file, d.statement, d.segment))
            .collect()
    }

    fn hover(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        let Some(prototype) = self.prototype_at(cx) else {
            return Ok(None);
        };
        let scope = cx.workspace.scope();
        let declarations = scope.declarations(prototype);
        let chain = scope.prototype_chain(prototype);

        let mut sections = vec![fenced("fusion", &format!("prototype({})", prototype))];
        if chain.len() > 1 {
            sections.push(format!("Extends {}", chain[1..].join(" → ")));
        }
        if declarations.is_empty() {
            sections.push("Not declared in this workspace".to_string());
        } else {
            sections.push(format!("Declared {} time(s)", declarations.len()));
        }
        if cx.workspace.node_types.contains_key(prototype) {
            sections.push("Has a NodeType definition".to_string());
        }
        Ok(Some(sections.join("\n\n")))
    }

    fn completion(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<CompletionItem>> {
        let prefix = cx.line_prefix();
        let word_start = word_start(prefix);
        let word = &prefix[word_start..];
        let before = prefix[..word_start].trim_end();
        let wants_prototype =
            word.contains(':') || before.ends_with("prototype(") || before.ends_with('<') || before.ends_with('=');
        if !wants_prototype {
            return Ok(Vec::new());
        }

        let mut items: Vec<CompletionItem> = cx
            .workspace
            .prototype_names()
            .into_iter()
            .filter(|name| name.starts_with(word))
            .map(|name| CompletionItem {
                label: name,
                kind: Some(CompletionItemKind::CLASS),
                detail: Some("Fusion prototype".to_string()),
                ..CompletionItem::default()
            })
            .collect();
        items.extend(
            cx.workspace
                .node_types
                .keys()
                .filter(|name| name.starts_with(word))
                .map(|name| CompletionItem {
                    label: name.clone(),
                    kind: Some(CompletionItemKind::STRUCT),
                    detail: Some("NodeType".to_string()),
                    ..CompletionItem::default()
                }),
        );
        Ok(items)
    }

    fn references(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<Location>> {
        let Some(prototype) = self.prototype_at(cx) else {
            return Ok(Vec::new());
        };
        occurrences(cx.workspace, prototype)
            .into_iter()
            .map(|(file, node)| {
                let parsed = &cx.workspace.files[file];
                Ok(Location::new(url(&parsed.uri)?, parsed.range_of(node)))
            })
            .collect()
    }

    fn code_lens(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<CodeLens>> {
        let parsed = cx.parsed();
        let doc = parsed.document();
        Ok(parsed
            .prototype_creations()
            .iter()
            .filter_map(|&creation| {
                let prototype = doc.segment_identifier(creation)?;
                let count = usages(cx.workspace, prototype).len();
                Some(CodeLens {
                    range: parsed.range_of(creation),
                    command: Some(Command {
                        title: format!("{} reference{}", count, if count == 1 { "" } else { "s" }),
                        command: String::new(),
                        arguments: None,
                    }),
                    data: None,
                })
            })
            .collect())
    }

    fn rename(&self, cx: &CapabilityContext<'_>, new_name: &str) -> ElementResult<Vec<(Url, TextEdit)>> {
        let Some(prototype) = self.prototype_at(cx) else {
            return Ok(Vec::new());
        };
        occurrences(cx.workspace, prototype)
            .into_iter()
            .map(|(file, node)| {
                let parsed = &cx.workspace.files[file];
                Ok((url(&parsed.uri)?, TextEdit::new(parsed.range_of(node), new_name.to_string())))
            })
            .collect()
    }

    fn diagnostics(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<Diagnostic>> {
        let parsed = cx.parsed();
        let workspace = cx.workspace;
        let declared = workspace.prototype_names();
        let package_keys = workspace.package_keys();
        let deprecations = &workspace.configuration.code.deprecations;

        let mut diagnostics = Vec::new();
        for node_type in [NodeType::FusionObjectValue, NodeType::PrototypeReference, NodeType::PrototypePathSegment] {
            for &node in parsed.nodes_of_type(node_type) {
                let Some(prototype) = parsed.kind(node).prototype_name() else {
                    continue;
                };
                let range = parsed.range_of(node);

                if let Some(replacement) = deprecations.fusion.prototypes.get(prototype) {
                    diagnostics.push(Diagnostic {
                        range,
                        severity: Some(deprecations.severity.to_lsp()),
                        source: Some(DIAGNOSTIC_SOURCE.to_string()),
                        message: format!("Prototype \"{}\" is deprecated, use \"{}\" instead", prototype, replacement),
                        data: Some(json!({ "replacement": replacement })),
                        ..Diagnostic::default()
                    });
                    continue;
                }

                // Declarations name themselves; only uses can dangle.
                if parsed.prototype_creations().contains(&node) || parsed.prototype_overwrites().contains(&node) {
                    continue;
                }
                let own_package = package_prefix(prototype).is_some_and(|p| package_keys.contains(&p));
                if !own_package || declared.contains(prototype) {
                    continue;
                }
                let data = workspace
                    .node_types
                    .contains_key(prototype)
                    .then(|| json!({ "nodeTypeName": prototype }));
                diagnostics.push(Diagnostic {
                    range,
                    severity: Some(DiagnosticSeverity::WARNING),
                    source: Some(DIAGNOSTIC_SOURCE.to_string()),
                    message: format!("Could not find prototype \"{}\"", prototype),
                    data,
                    ..Diagnostic::default()
                });
            }
        }
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_prefix() {
        assert_eq!(package_prefix("Vendor.Site:Card"), Some("Vendor.Site"));
        assert_eq!(package_prefix("Card"), None);
    }

    #[test]
    fn test_word_start_after_multibyte_char() {
        let prefix = "x = '→Vendor:C";
        assert_eq!(&prefix[word_start(prefix)..], "Vendor:C");
        assert_eq!(word_start("€"), "€".len());
        assert_eq!(word_start("Vendor.Site:C"), 0);
    }
}
