//! EEL helpers such as `String.trim(…)`.
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, Documentation, InlayHint,
    InlayHintKind, InlayHintLabel, LocationLink, ParameterInformation, ParameterLabel,
    SignatureHelp, SignatureInformation,
};

use super::{
    Capability, CapabilityContext, CapabilityElement, DIAGNOSTIC_SOURCE, ElementResult, fenced,
    position_link,
};
use crate::config::InlayHintDepth;
use crate::fusion::{NodeKind, NodeType, eel};
use crate::php::ClassMethod;
use crate::workspace::EelHelperToken;

/// `String.su` (helper and partial method) before the cursor.
static HELPER_METHOD_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z0-9]*(?:\.[A-Za-z][A-Za-z0-9]*)*)\.([A-Za-z0-9_]*)$")
        .expect("valid helper method prefix regex")
});

/// A partial, possibly dotted, helper name before the cursor.
static HELPER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.])([A-Z][A-Za-z0-9.]*)$").expect("valid helper prefix regex")
});

pub struct EelHelperElement;

fn method_documentation(method: &ClassMethod) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(description) = &method.description {
        parts.push(description.clone());
    }
    if let Some(return_type) = &method.return_type {
        match &method.return_description {
            Some(description) => parts.push(format!("@return {} {}", return_type, description)),
            None => parts.push(format!("@return {}", return_type)),
        }
    }
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

impl EelHelperElement {
    fn helper_and_method<'a>(
        &self,
        cx: &CapabilityContext<'a>,
    ) -> Option<(&'a EelHelperToken, Option<&'a ClassMethod>)> {
        match cx.node_kind()? {
            NodeKind::EelHelper { name } => Some((cx.workspace.helper(name)?, None)),
            NodeKind::EelHelperMethod { helper, method } => {
                let token = cx.workspace.helper(helper)?;
                Some((token, token.method(method)))
            }
            _ => None,
        }
    }

    /// Whether the cursor sits inside an EEL expression.
    fn in_eel(&self, cx: &CapabilityContext<'_>) -> bool {
        let Some(node) = cx.node else {
            return false;
        };
        let doc = cx.parsed().document();
        matches!(doc.kind(node), NodeKind::EelExpression { .. })
            || doc.find_parent(node, NodeType::EelExpression).is_some()
    }
}

impl CapabilityElement for EelHelperElement {
    fn name(&self) -> &'static str {
        "eel-helper"
    }

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool {
        match capability {
            Capability::Completion
            | Capability::SignatureHelp
            | Capability::Diagnostics
            | Capability::InlayHints => true,
            Capability::Definition | Capability::Hover => matches!(
                node,
                Some(NodeKind::EelHelper { .. } | NodeKind::EelHelperMethod { .. })
            ),
            _ => false,
        }
    }

    fn definition(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        let Some((token, method)) = self.helper_and_method(cx) else {
            return Ok(Vec::new());
        };
        let Some(class) = &token.class else {
            return Ok(Vec::new());
        };
        let position = method.map(|m| m.position).unwrap_or(class.position);
        Ok(vec![position_link(cx.origin_range(), &class.uri, position)?])
    }

    fn hover(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        let Some((token, method)) = self.helper_and_method(cx) else {
            return Ok(None);
        };
        Ok(Some(match method {
            Some(method) => {
                let mut hover = fenced("php", &format!("{}::{}", token.fqcn, method.label()));
                if let Some(documentation) = method_documentation(method) {
                    hover.push_str("\n\n");
                    hover.push_str(&documentation);
                }
                hover
            }
            None => {
                let mut hover = fenced("php", &format!("class {}", token.fqcn));
                if token.class.is_none() {
                    hover.push_str("\n\nClass not found in the workspace");
                }
                hover
            }
        }))
    }

    fn completion(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<CompletionItem>> {
        if !self.in_eel(cx) {
            return Ok(Vec::new());
        }
        let prefix = cx.line_prefix();

        if let Some(caps) = HELPER_METHOD_PREFIX.captures(prefix) {
            let helper = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let typed = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if let Some(token) = cx.workspace.helper(helper) {
                return Ok(token
                    .methods()
                    .iter()
                    .filter(|m| m.name.starts_with(typed))
                    .map(|m| CompletionItem {
                        label: m.name.clone(),
                        kind: Some(CompletionItemKind::METHOD),
                        detail: Some(m.label()),
                        documentation: method_documentation(m).map(Documentation::String),
                        ..CompletionItem::default()
                    })
                    .collect());
            }
        }

        let Some(caps) = HELPER_PREFIX.captures(prefix) else {
            return Ok(Vec::new());
        };
        let typed = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        Ok(cx
            .workspace
            .helpers
            .iter()
            .filter(|token| token.name.starts_with(typed))
            .map(|token| CompletionItem {
                label: token.name.clone(),
                kind: Some(CompletionItemKind::MODULE),
                detail: Some(token.fqcn.clone()),
                ..CompletionItem::default()
            })
            .collect())
    }

    fn signature_help(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<SignatureHelp>> {
        let Some(node) = cx.node else {
            return Ok(None);
        };
        let parsed = cx.parsed();
        let doc = parsed.document();
        let expression = if matches!(doc.kind(node), NodeKind::EelExpression { .. }) {
            Some(node)
        } else {
            doc.find_parent(node, NodeType::EelExpression)
        };
        let Some(expression) = expression else {
            return Ok(None);
        };
        let NodeKind::EelExpression { code, code_begin } = doc.kind(expression) else {
            return Ok(None);
        };

        let cursor = parsed.offset_at(cx.position).saturating_sub(*code_begin);
        let Some((helper, method, argument)) = eel::call_at(code, cursor) else {
            return Ok(None);
        };
        let Some(method) = cx.workspace.helper(&helper).and_then(|t| t.method(&method)) else {
            return Ok(None);
        };

        let parameters = method
            .parameters
            .iter()
            .map(|p| ParameterInformation {
                label: ParameterLabel::Simple(p.label()),
                documentation: None,
            })
            .collect();
        Ok(Some(SignatureHelp {
            signatures: vec![SignatureInformation {
                label: method.label(),
                documentation: method_documentation(method).map(Documentation::String),
                parameters: Some(parameters),
                active_parameter: None,
            }],
            active_signature: Some(0),
            active_parameter: Some(argument),
        }))
    }

    fn diagnostics(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<Diagnostic>> {
        let parsed = cx.parsed();
        let mut diagnostics = Vec::new();
        for &node in parsed.nodes_of_type(NodeType::EelHelperMethod) {
            let NodeKind::EelHelperMethod { helper, method } = parsed.kind(node) else {
                continue;
            };
            let Some(token) = cx.workspace.helper(helper) else {
                continue;
            };
            // Without the class there is nothing to check against.
            if token.class.is_none() || token.method(method).is_some() {
                continue;
            }
            diagnostics.push(Diagnostic {
                range: parsed.range_of(node),
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("Method \"{}\" does not exist on helper \"{}\"", method, helper),
                ..Diagnostic::default()
            });
        }
        Ok(diagnostics)
    }

    /// Parameter names in front of helper call arguments.
    fn inlay_hints(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<InlayHint>> {
        let depth = cx.workspace.configuration.inlay_hint.depth;
        if depth == InlayHintDepth::Disabled {
            return Ok(Vec::new());
        }
        let parsed = cx.parsed();
        let doc = parsed.document();
        let mut hints = Vec::new();

        for &node in parsed.nodes_of_type(NodeType::EelHelperMethod) {
            let NodeKind::EelHelperMethod { helper, method } = parsed.kind(node) else {
                continue;
            };
            let Some(method) = cx.workspace.helper(helper).and_then(|t| t.method(method)) else {
                continue;
            };
            let Some(expression) = doc.find_parent(node, NodeType::EelExpression) else {
                continue;
            };
            let NodeKind::EelExpression { code, code_begin } = doc.kind(expression) else {
                continue;
            };
            let after_name = doc.span(node).end.saturating_sub(*code_begin);
            let Some(open) = code.get(after_name..).and_then(|rest| rest.find('(')) else {
                continue;
            };

            let arguments = eel::call_arguments(code, after_name + open);
            for (parameter, argument) in method.parameters.iter().zip(arguments) {
                if depth == InlayHintDepth::NoLiteral && eel::is_literal(&code[argument.clone()]) {
                    continue;
                }
                hints.push(InlayHint {
                    position: parsed.position_of(code_begin + argument.start),
                    label: InlayHintLabel::String(format!("{}:", parameter.name)),
                    kind: Some(InlayHintKind::PARAMETER),
                    text_edits: None,
                    tooltip: None,
                    padding_left: None,
                    padding_right: Some(true),
                    data: None,
                });
            }
        }
        Ok(hints)
    }
}
