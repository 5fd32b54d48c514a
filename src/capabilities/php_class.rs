//! PHP classes named from Fusion: `@class`, and controllers and actions of
//! action URIs.
use std::sync::Arc;

use tower_lsp::lsp_types::LocationLink;

use super::{Capability, CapabilityContext, CapabilityElement, ElementResult, fenced, position_link};
use crate::composer;
use crate::fusion::NodeKind;
use crate::php::{ClassDefinition, ClassLookup, ClassMethod};

pub struct PhpClassElement;

/// `Vendor.Site` + `Shop` → `Vendor\Site\Controller\ShopController`.
pub fn controller_fqcn(package: &str, controller: &str) -> String {
    format!(
        "{}\\Controller\\{}Controller",
        composer::namespace_of_package_key(package),
        controller.replace('/', "\\")
    )
}

/// The PHP method implementing `action`.
pub fn action_method_name(action: &str) -> String {
    format!("{}Action", action)
}

enum Target {
    Class(Arc<ClassDefinition>),
    Method(Arc<ClassDefinition>, ClassMethod),
}

impl PhpClassElement {
    fn target(&self, cx: &CapabilityContext<'_>) -> Option<Target> {
        let classes = cx.workspace.classes();
        match cx.node_kind()? {
            NodeKind::PhpClassReference { fqcn } => classes.class_definition(fqcn).map(Target::Class),
            NodeKind::ActionUriController { package, controller } => classes
                .class_definition(&controller_fqcn(package, controller))
                .map(Target::Class),
            NodeKind::ActionUriAction {
                package,
                controller,
                action,
            } => {
                let class = classes.class_definition(&controller_fqcn(package, controller))?;
                let method = class.method(&action_method_name(action))?.clone();
                Some(Target::Method(class, method))
            }
            _ => None,
        }
    }
}

impl CapabilityElement for PhpClassElement {
    fn name(&self) -> &'static str {
        "php-class"
    }

    fn is_responsible(&self, capability: Capability, node: Option<&NodeKind>) -> bool {
        matches!(capability, Capability::Definition | Capability::Hover)
            && matches!(
                node,
                Some(
                    NodeKind::PhpClassReference { .. }
                        | NodeKind::ActionUriController { .. }
                        | NodeKind::ActionUriAction { .. }
                )
            )
    }

    fn definition(&self, cx: &CapabilityContext<'_>) -> ElementResult<Vec<LocationLink>> {
        let link = match self.target(cx) {
            Some(Target::Class(class)) => position_link(cx.origin_range(), &class.uri, class.position)?,
            Some(Target::Method(class, method)) => {
                position_link(cx.origin_range(), &class.uri, method.position)?
            }
            None => return Ok(Vec::new()),
        };
        Ok(vec![link])
    }

    fn hover(&self, cx: &CapabilityContext<'_>) -> ElementResult<Option<String>> {
        Ok(match self.target(cx) {
            Some(Target::Class(class)) => Some(format!(
                "{}\n\n{} public method(s)",
                fenced("php", &format!("class {}", class.fqcn)),
                class.methods.len()
            )),
            Some(Target::Method(class, method)) => {
                Some(fenced("php", &format!("{}::{}", class.fqcn, method.label())))
            }
            None => None,
        })
    }
}
