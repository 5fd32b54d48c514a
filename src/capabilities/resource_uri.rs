//! `resource://Vendor.Site/Public/app.css` strings.
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, LocationLink, Position, Url};

use super::{Capability, CapabilityContext, CapabilityElement, DIAGNOSTIC_SOURCE, ElementError, ElementResult, position_link};
use crate::fusion::{NodeKind, NodeType};
use crate::workspace::parse_resource_uri;

pub struct ResourceUriElement;

impl ResourceUriElement {
    fn uri_at<'a>(&self, cx: &CapabilityContext<'a>) -> Option<&'a str> {
        match cx.node_kind()? {
            NodeKind::ResourceUri { uri } => Some(uri),
            _ => None,
        }
    }
}

impl CapabilityElement for ResourceUriElement {
    fn name(&self) -> &'static str {
        "resource-uri"
    }

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool {
        match capability {
            Capability::Diagnostics => true,
            Capability::Definition | Capability::Hover => matches!(node, Some(NodeKind::ResourceUri { .. })),
            _ => false,
        }
    }

    fn definition(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        let Some(path) = self.uri_at(cx).and_then(|uri| cx.workspace.resolve_resource(uri)) else {
            return Ok(Vec::new());
        };
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let target = Url::from_file_path(&path)
            .map_err(|_| ElementError::InvalidUri(path.display().to_string()))?;
        Ok(vec![position_link(cx.origin_range(), target.as_str(), Position::default())?])
    }

    fn hover(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        let Some(uri) = self.uri_at(cx) else {
            return Ok(None);
        };
        Ok(Some(match cx.workspace.resolve_resource(uri) {
            Some(path) if path.is_file() => format!("`{}`", path.display()),
            Some(path) => format!("`{}` (missing)", path.display()),
            None => format!("`{}`", uri),
        }))
    }

    fn diagnostics(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<Diagnostic>> {
        let parsed = cx.parsed();
        let mut diagnostics = Vec::new();
        for &node in parsed.nodes_of_type(NodeType::ResourceUri) {
            let NodeKind::ResourceUri { uri } = parsed.kind(node) else {
                continue;
            };
            let Some((key, relative)) = parse_resource_uri(uri) else {
                continue;
            };
            let message = match cx.workspace.package_by_key(key) {
                None => format!("Package \"{}\" not found", key),
                // A folder prefix concatenated with more path later on
                Some(_) if relative.is_empty() || relative.ends_with('/') => continue,
                Some(package) if !package.resource_path(relative).exists() => {
                    format!("Resource \"{}\" not found", uri)
                }
                Some(_) => continue,
            };
            diagnostics.push(Diagnostic {
                range: parsed.range_of(node),
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message,
                ..Diagnostic::default()
            });
        }
        Ok(diagnostics)
    }
}
