//! Document and workspace symbols for prototype declarations.
use tower_lsp::lsp_types::{DocumentSymbol, Location, SymbolInformation, SymbolKind};

use super::{Capability, CapabilityContext, CapabilityElement, ElementResult, url};
use crate::fusion::{NodeId, NodeKind};
use crate::parsed_file::ParsedFile;
use crate::workspace::Workspace;

pub struct SymbolElement;

/// `extends X` for creations, `overwrite` for everything else.
fn symbol_detail(parsed: &ParsedFile, segment: NodeId) -> String {
    match parsed.extends_of(segment).and_then(|base| parsed.kind(base).prototype_name()) {
        Some(base) => format!("extends {}", base),
        None => "overwrite".to_string(),
    }
}

/// Every declaring segment of a file, creations first.
fn declarations(parsed: &ParsedFile) -> impl Iterator<Item = (NodeId, &str)> + '_ {
    parsed
        .prototype_creations()
        .iter()
        .chain(parsed.prototype_overwrites())
        .filter_map(|&segment| Some((segment, parsed.document().segment_identifier(segment)?)))
}

impl CapabilityElement for SymbolElement {
    fn name(&self) -> &'static str {
        "symbols"
    }

    fn is_responsible(&self, capability: Capability, _node: Option<&NodeKind>) -> bool {
        matches!(capability, Capability::DocumentSymbols | Capability::WorkspaceSymbols)
    }

    fn document_symbols(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<DocumentSymbol>> {
        let parsed = cx.parsed();
        let mut symbols = Vec::new();
        for (segment, name) in declarations(parsed) {
            let Some(statement) = parsed.statement_of(segment) else {
                continue;
            };
            #[allow(deprecated)]
            symbols.push(DocumentSymbol {
                name: name.to_string(),
                detail: Some(symbol_detail(parsed, segment)),
                kind: SymbolKind::CLASS,
                tags: None,
                deprecated: None,
                range: parsed.range_of(statement),
                selection_range: parsed.range_of(segment),
                children: None,
            });
        }
        Ok(symbols)
    }

    fn workspace_symbols(&self, workspace: &Workspace, query: &str) -> ElementResult<Vec<SymbolInformation>> {
        let query = query.to_lowercase();
        let mut symbols = Vec::new();
        for parsed in &workspace.files {
            for &segment in parsed.prototype_creations() {
                let Some(name) = parsed.document().segment_identifier(segment) else {
                    continue;
                };
                if !name.to_lowercase().contains(&query) {
                    continue;
                }
                #[allow(deprecated)]
                symbols.push(SymbolInformation {
                    name: name.to_string(),
                    kind: SymbolKind::CLASS,
                    tags: None,
                    deprecated: None,
                    location: Location::new(url(&parsed.uri)?, parsed.range_of(segment)),
                    container_name: parsed.package.clone(),
                });
            }
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::context::Context;
    use std::sync::Arc;
    use tower_lsp::lsp_types::{Position, Url};

    fn workspace(root: &std::path::Path) -> Workspace {
        let mut workspace = Workspace::new("test", root.to_path_buf(), Arc::new(Context::new()));
        workspace.init(Configuration::default());
        let uri = Url::from_file_path(root.join("Card.fusion")).expect("absolute path");
        workspace.add_file(
            uri.as_str(),
            "prototype(Vendor.Site:Card) < prototype(Neos.Fusion:Component) {\n  title = ''\n}\nprototype(Neos.Fusion:Tag).attributes.x = 1\n"
                .to_string(),
        );
        workspace
    }

    #[test]
    fn test_document_symbols() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let workspace = workspace(dir.path());
        let cx = CapabilityContext {
            workspace: &workspace,
            file: 0,
            node: None,
            position: Position::default(),
        };
        let symbols = SymbolElement.document_symbols(&cx).expect("symbols");
        let names: Vec<(&str, Option<&str>)> = symbols
            .iter()
            .map(|s| (s.name.as_str(), s.detail.as_deref()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Vendor.Site:Card", Some("extends Neos.Fusion:Component")),
                ("Neos.Fusion:Tag", Some("overwrite")),
            ]
        );
        assert_eq!(symbols[0].range.start.line, 0);
        assert_eq!(symbols[0].range.end.line, 2);
    }

    #[test]
    fn test_workspace_symbols_filter_by_query() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let workspace = workspace(dir.path());
        let found = SymbolElement.workspace_symbols(&workspace, "card").expect("symbols");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Vendor.Site:Card");
        assert!(SymbolElement.workspace_symbols(&workspace, "tag").expect("symbols").is_empty());
    }
}
