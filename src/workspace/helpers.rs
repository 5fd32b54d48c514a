//! EEL helpers exposed through `Neos.Fusion.defaultContext`.
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;
use serde_yaml::Value;
use tracing::debug;

use super::settings;
use crate::fusion::eel;
use crate::php::{ClassDefinition, ClassLookup, ClassMethod};

/// One `Name.method(…)` call site inside EEL code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCall {
    /// Range of the helper name, relative to the scanned code.
    pub name: Range<usize>,
    /// Range of the method name, relative to the scanned code.
    pub method: Range<usize>,
    pub method_name: String,
}

/// A named EEL helper and the PHP class behind it.
#[derive(Debug, Clone)]
pub struct EelHelperToken {
    pub name: String,
    pub fqcn: String,
    regex: Regex,
    pub class: Option<Arc<ClassDefinition>>,
}

impl EelHelperToken {
    pub fn new(name: &str, fqcn: &str, class: Option<Arc<ClassDefinition>>) -> Option<Self> {
        let pattern = format!(
            r"\b({})\.([A-Za-z_][A-Za-z0-9_]*)\s*\(",
            regex::escape(name)
        );
        let regex = Regex::new(&pattern).ok()?;
        Some(Self {
            name: name.to_string(),
            fqcn: fqcn.trim_start_matches('\\').to_string(),
            regex,
            class,
        })
    }

    pub fn methods(&self) -> &[ClassMethod] {
        self.class.as_deref().map(|c| c.methods.as_slice()).unwrap_or(&[])
    }

    pub fn method(&self, name: &str) -> Option<&ClassMethod> {
        self.class.as_deref().and_then(|c| c.method(name))
    }

    /// Every call of this helper in `code`, string literals excluded.
    pub fn calls(&self, code: &str) -> Vec<HelperCall> {
        let masked = eel::mask_strings(code);
        self.regex
            .captures_iter(&masked)
            .filter_map(|caps| {
                let name = caps.get(1)?;
                let method = caps.get(2)?;
                // `foo.String.trim(…)` is a member access, not a helper call
                if masked[..name.start()].ends_with('.') {
                    return None;
                }
                Some(HelperCall {
                    name: name.range(),
                    method: method.range(),
                    method_name: method.as_str().to_string(),
                })
            })
            .collect()
    }
}

/// `(name, fqcn)` pairs from the merged settings' default context.
pub fn helper_definitions(settings: &Value) -> Vec<(String, String)> {
    let Some(Value::Mapping(context)) =
        settings::lookup(settings, &["Neos", "Fusion", "defaultContext"])
    else {
        return Vec::new();
    };

    let mut definitions: Vec<(String, String)> = context
        .iter()
        .filter_map(|(name, fqcn)| Some((name.as_str()?.to_string(), fqcn.as_str()?.to_string())))
        .collect();
    definitions.sort();
    definitions
}

/// Build helper tokens, resolving each helper class through `classes`.
pub fn build_tokens(settings: &Value, classes: &dyn ClassLookup) -> Vec<EelHelperToken> {
    helper_definitions(settings)
        .into_iter()
        .filter_map(|(name, fqcn)| {
            let class = classes.class_definition(&fqcn);
            if class.is_none() {
                debug!(helper = %name, fqcn = %fqcn, "helper class not found");
            }
            EelHelperToken::new(&name, &fqcn, class)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_skip_strings_and_member_access() {
        let token = EelHelperToken::new("String", "Neos\\Eel\\Helper\\StringHelper", None)
            .expect("valid token");
        let code = "String.trim(x) + 'String.no()' + foo.String.crop(y) + String.toUpperCase (z)";
        let calls = token.calls(code);

        let methods: Vec<&str> = calls.iter().map(|c| c.method_name.as_str()).collect();
        assert_eq!(methods, vec!["trim", "toUpperCase"]);
        assert_eq!(&code[calls[0].name.clone()], "String");
        assert_eq!(&code[calls[0].method.clone()], "trim");
        assert_eq!(token.fqcn, "Neos\\Eel\\Helper\\StringHelper");
    }

    #[test]
    fn test_dotted_helper_names() {
        let token = EelHelperToken::new("Neos.Link", "Neos\\Neos\\Fusion\\Helper\\LinkHelper", None)
            .expect("valid token");
        let calls = token.calls("Neos.Link.hasSupportedScheme(uri)");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, 0..9);
        assert!(token.calls("NeosXLink.hasSupportedScheme(uri)").is_empty());
    }

    #[test]
    fn test_helper_definitions_from_settings() {
        let settings: Value = serde_yaml::from_str(
            "Neos:\n  Fusion:\n    defaultContext:\n      String: 'Neos\\Eel\\Helper\\StringHelper'\n      Array: 'Neos\\Eel\\Helper\\ArrayHelper'\n      Disabled: ~\n",
        )
        .expect("valid yaml");
        assert_eq!(
            helper_definitions(&settings),
            vec![
                ("Array".to_string(), "Neos\\Eel\\Helper\\ArrayHelper".to_string()),
                ("String".to_string(), "Neos\\Eel\\Helper\\StringHelper".to_string()),
            ]
        );
    }
}
