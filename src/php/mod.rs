//! PHP class resolution.
//!
//! Fully-qualified class names are mapped to files through the packages'
//! PSR-4 autoload maps, then scanned structurally by [`extract`].  Results
//! are cached per FQCN in the shared `classes` cache and tagged with the
//! class file's URI, so a change to that file drops the entry and the next
//! lookup re-derives it.
//!
//! Resolution failures are silent: a class that cannot be found or does not
//! look like the expected class simply yields `None`.
pub mod docblock;
pub mod extract;

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Url};
use tracing::debug;

use crate::composer;
use crate::context::Context;
use crate::workspace::Package;

pub use extract::parse_class;

/// One parameter of a public PHP method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassParameter {
    /// The parameter name WITHOUT the `$` prefix.
    pub name: String,
    pub type_hint: Option<String>,
    /// The raw default value expression, if any.
    pub default_value: Option<String>,
    /// Whether the parameter is variadic (`...$rest`).
    pub spread: bool,
}

impl ClassParameter {
    pub fn label(&self) -> String {
        let mut label = String::new();
        if let Some(ref hint) = self.type_hint {
            label.push_str(hint);
            label.push(' ');
        }
        if self.spread {
            label.push_str("...");
        }
        label.push('$');
        label.push_str(&self.name);
        if let Some(ref default) = self.default_value {
            label.push_str(" = ");
            label.push_str(default);
        }
        label
    }
}

/// A public method of a PHP class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMethod {
    pub name: String,
    pub parameters: Vec<ClassParameter>,
    /// `@return` type from the doc comment, else the signature's return type.
    pub return_type: Option<String>,
    pub return_description: Option<String>,
    pub description: Option<String>,
    pub is_static: bool,
    /// Position of the method name.
    pub position: Position,
}

impl ClassMethod {
    /// The name EEL uses for this method: getters lose their `get` prefix
    /// (`getFoo` → `foo`).
    pub fn normalized_name(&self) -> String {
        match self.name.strip_prefix("get") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => {
                let mut chars = rest.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => self.name.clone(),
                }
            }
            _ => self.name.clone(),
        }
    }

    /// Whether `name` refers to this method, either literally or through its
    /// normalized getter name.
    pub fn valid(&self, name: &str) -> bool {
        self.name == name || self.normalized_name() == name
    }

    /// Signature label, e.g. `substr(string $string, int $start, $length = null): string`.
    pub fn label(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(ClassParameter::label).collect();
        let ret = self
            .return_type
            .as_ref()
            .map(|r| format!(": {}", r))
            .unwrap_or_default();
        format!("{}({}){}", self.name, params.join(", "), ret)
    }

    pub fn required_parameter_count(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| p.default_value.is_none() && !p.spread)
            .count()
    }
}

/// Cached facts about one PHP class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    pub fqcn: String,
    pub uri: String,
    /// Position of the class name in its declaration.
    pub position: Position,
    pub methods: Vec<ClassMethod>,
}

impl ClassDefinition {
    pub fn short_name(&self) -> &str {
        self.fqcn.rsplit('\\').next().unwrap_or(&self.fqcn)
    }

    /// Exact match first, then getter normalization.
    pub fn method(&self, name: &str) -> Option<&ClassMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .or_else(|| self.methods.iter().find(|m| m.valid(name)))
    }
}

/// Anything that can answer "what does this FQCN look like".
pub trait ClassLookup {
    fn class_definition(&self, fqcn: &str) -> Option<Arc<ClassDefinition>>;
}

/// Resolves classes against a set of packages' autoload maps.
pub struct PhpResolver<'a> {
    context: &'a Context,
    packages: &'a [Package],
}

impl<'a> PhpResolver<'a> {
    pub fn new(context: &'a Context, packages: &'a [Package]) -> Self {
        Self { context, packages }
    }

    fn derive(&self, fqcn: &str) -> Option<ClassDefinition> {
        let path = self.packages.iter().find_map(|package| {
            composer::resolve_class_path(&package.manifest.autoload, &package.path, fqcn)
        })?;
        let content = std::fs::read_to_string(&path).ok()?;
        let uri = Url::from_file_path(&path).ok()?.to_string();
        let class = parse_class(fqcn, &uri, &content);
        if class.is_none() {
            debug!(fqcn, path = %path.display(), "file does not declare the expected class");
        }
        class
    }
}

impl ClassLookup for PhpResolver<'_> {
    fn class_definition(&self, fqcn: &str) -> Option<Arc<ClassDefinition>> {
        let fqcn = fqcn.trim_start_matches('\\');
        if let Some(class) = self.context.classes.get(fqcn) {
            return Some(class);
        }
        // Misses are not cached: the file may appear later.
        let class = Arc::new(self.derive(fqcn)?);
        self.context
            .classes
            .set(fqcn, Arc::clone(&class), &[class.uri.as_str()]);
        Some(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str) -> ClassMethod {
        ClassMethod {
            name: name.to_string(),
            parameters: Vec::new(),
            return_type: None,
            return_description: None,
            description: None,
            is_static: false,
            position: Position::default(),
        }
    }

    #[test]
    fn test_normalized_getter_names() {
        assert_eq!(method("getFoo").normalized_name(), "foo");
        assert_eq!(method("getURL").normalized_name(), "uRL");
        assert_eq!(method("get").normalized_name(), "get");
        assert_eq!(method("getaway").normalized_name(), "getaway");
        assert_eq!(method("trim").normalized_name(), "trim");
    }

    #[test]
    fn test_method_label() {
        let mut m = method("substr");
        m.parameters = vec![
            ClassParameter {
                name: "string".to_string(),
                type_hint: Some("string".to_string()),
                default_value: None,
                spread: false,
            },
            ClassParameter {
                name: "length".to_string(),
                type_hint: None,
                default_value: Some("null".to_string()),
                spread: false,
            },
        ];
        m.return_type = Some("string".to_string());
        assert_eq!(m.label(), "substr(string $string, $length = null): string");
        assert_eq!(m.required_parameter_count(), 1);
    }

    #[test]
    fn test_definition_prefers_exact_method() {
        let class = ClassDefinition {
            fqcn: "Vendor\\Helper".to_string(),
            uri: "file:///Helper.php".to_string(),
            position: Position::default(),
            methods: vec![method("getFoo"), method("foo")],
        };
        assert_eq!(class.method("foo").map(|m| m.name.as_str()), Some("foo"));
        assert_eq!(class.short_name(), "Helper");
    }
}
