//! Structural extraction of PHP class facts.
//!
//! This is not a PHP parser.  A class file is accepted when it declares the
//! expected namespace and class name, and public method signatures are
//! picked out with regular expressions.
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::Position;

use super::docblock;
use super::{ClassDefinition, ClassMethod, ClassParameter};

static METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*((?:(?:final|abstract|static)[ \t]+)*)public[ \t]+((?:static[ \t]+)?)function[ \t]+&?([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(",
    )
    .expect("valid method regex")
});

static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^\s*(?:#\[[^\]]*\]\s*)?(?:(?:public|protected|private|readonly)\s+)*(?:([?A-Za-z_\\][A-Za-z0-9_\\|?]*)\s+)?&?\s*(\.\.\.)?\s*\$([A-Za-z_][A-Za-z0-9_]*)(?:\s*=\s*(.+?))?\s*$",
    )
    .expect("valid parameter regex")
});

static RETURN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*:\s*(\??[A-Za-z_\\][A-Za-z0-9_\\|?]*)").expect("valid return type regex")
});

/// Extract a [`ClassDefinition`] for `fqcn` from PHP source.
///
/// Returns `None` when the file does not declare `namespace <ns>;` and
/// `class <Name>` for the requested class.
pub fn parse_class(fqcn: &str, uri: &str, content: &str) -> Option<ClassDefinition> {
    let fqcn = fqcn.trim_start_matches('\\');
    let (namespace, class_name) = match fqcn.rsplit_once('\\') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, fqcn),
    };

    // Declarations are only looked for in code, never in comments.
    let code = mask_comments(content);

    if let Some(namespace) = namespace {
        let namespace_pattern = format!(r"(?m)^\s*namespace\s+{}\s*;", regex::escape(namespace));
        if !Regex::new(&namespace_pattern).ok()?.is_match(&code) {
            return None;
        }
    }

    let class_pattern = format!(r"\bclass\s+({})\b", regex::escape(class_name));
    let class_match = Regex::new(&class_pattern).ok()?.captures(&code)?.get(1)?;
    let position = offset_to_position(content, class_match.start());

    let lines: Vec<&str> = content.lines().collect();
    let methods = METHOD
        .captures_iter(&code)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(3)?;
            let is_static = caps.get(1).is_some_and(|m| m.as_str().contains("static"))
                || caps.get(2).is_some_and(|m| !m.as_str().is_empty());

            let params_start = whole.end();
            let params_end = closing_paren(content, params_start - 1)?;
            let parameters = parse_parameters(&content[params_start..params_end]);
            let signature_return = RETURN_TYPE
                .captures(&content[params_end + 1..])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_start_matches('\\').to_string());

            let name_position = offset_to_position(content, name.start());
            let doc = docblock::method_doc(&lines, name_position.line as usize);

            Some(ClassMethod {
                name: name.as_str().to_string(),
                parameters,
                return_type: doc.return_type.or(signature_return),
                return_description: doc.return_description,
                description: doc.description,
                is_static,
                position: name_position,
            })
        })
        .collect();

    Some(ClassDefinition {
        fqcn: fqcn.to_string(),
        uri: uri.to_string(),
        position,
        methods,
    })
}

/// Parse a raw parameter list (the text between the parentheses).
pub fn parse_parameters(raw: &str) -> Vec<ClassParameter> {
    split_top_level(raw)
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .filter_map(|p| {
            let caps = PARAMETER.captures(p)?;
            Some(ClassParameter {
                name: caps.get(3)?.as_str().to_string(),
                type_hint: caps.get(1).map(|m| m.as_str().to_string()),
                default_value: caps.get(4).map(|m| m.as_str().trim().to_string()),
                spread: caps.get(2).is_some(),
            })
        })
        .collect()
}

/// Split on commas that are not nested in brackets or strings.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in raw.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Byte index of the `)` closing the `(` at `open`.
fn closing_paren(content: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let bytes = content.as_bytes();
    let mut i = open;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(q) => {
                if byte == b'\\' {
                    i += 1;
                } else if byte == q {
                    quote = None;
                }
            }
            None => match byte {
                b'\'' | b'"' => quote = Some(byte),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Blank out `//`, `#` and `/* */` comments, keeping byte offsets and
/// newlines.  `#[` starts an attribute, not a comment.
fn mask_comments(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut out = bytes.to_vec();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if let Some(q) = quote {
            if byte == b'\\' {
                i += 1;
            } else if byte == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        let comment_end = match byte {
            b'\'' | b'"' => {
                quote = Some(byte);
                None
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => Some(
                content[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len()),
            ),
            b'/' if bytes.get(i + 1) == Some(&b'/') => Some(line_end(content, i)),
            b'#' if bytes.get(i + 1) != Some(&b'[') => Some(line_end(content, i)),
            _ => None,
        };
        match comment_end {
            Some(end) => {
                for masked in &mut out[i..end] {
                    if *masked != b'\n' {
                        *masked = b' ';
                    }
                }
                i = end;
            }
            None => i += 1,
        }
    }

    // Only whole comments were overwritten, so the rest is still UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| content.to_string())
}

fn line_end(content: &str, from: usize) -> usize {
    content[from..].find('\n').map(|p| from + p).unwrap_or(content.len())
}

fn offset_to_position(content: &str, offset: usize) -> Position {
    let before = &content[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|p| p + 1).unwrap_or(0);
    Position {
        line: line as u32,
        character: before[line_start..].encode_utf16().count() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELPER: &str = r#"<?php
namespace Vendor\Site\Eel;

use Neos\Eel\ProtectedContextAwareInterface;

class FooHelper implements ProtectedContextAwareInterface
{
    /**
     * Return the foo
     * @return string the foo value
     */
    public function getFoo($a, $b = 'x')
    {
        return $a . $b;
    }

    public static function join(string $glue, ?array ...$pieces): string
    {
    }

    public function withDefault(array $options = array('a', 'b'), int $limit = 5) {}

    protected function hidden() {}

    private function secret() {}

    public function allowsCallOfMethod($methodName)
    {
        return true;
    }
}
"#;

    #[test]
    fn test_parse_class_methods() {
        let class = parse_class("Vendor\\Site\\Eel\\FooHelper", "file:///FooHelper.php", HELPER)
            .expect("class resolves");
        assert_eq!(class.position, Position { line: 5, character: 6 });

        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["getFoo", "join", "withDefault", "allowsCallOfMethod"]);

        let get_foo = &class.methods[0];
        assert_eq!(get_foo.parameters.len(), 2);
        assert_eq!(get_foo.parameters[0].name, "a");
        assert_eq!(get_foo.parameters[0].default_value, None);
        assert_eq!(get_foo.parameters[1].default_value.as_deref(), Some("'x'"));
        assert_eq!(get_foo.description.as_deref(), Some("Return the foo"));
        assert_eq!(get_foo.return_type.as_deref(), Some("string"));
        assert_eq!(get_foo.return_description.as_deref(), Some("the foo value"));
        assert!(get_foo.valid("foo"));
        assert!(get_foo.valid("getFoo"));
        assert!(!get_foo.valid("bar"));

        let join = &class.methods[1];
        assert!(join.is_static);
        assert_eq!(join.parameters[0].type_hint.as_deref(), Some("string"));
        assert!(join.parameters[1].spread);
        assert_eq!(join.parameters[1].type_hint.as_deref(), Some("?array"));
        assert_eq!(join.return_type.as_deref(), Some("string"));

        let with_default = &class.methods[2];
        assert_eq!(with_default.parameters.len(), 2);
        assert_eq!(
            with_default.parameters[0].default_value.as_deref(),
            Some("array('a', 'b')")
        );
    }

    #[test]
    fn test_class_names_in_comments_are_ignored() {
        let content = "<?php\n\
            namespace Vendor\\Site;\n\
            \n\
            /**\n\
             * Replaces the old class Helper.\n\
             * public function legacy($x)\n\
             */\n\
            // class Helper was moved\n\
            # class Helper\n\
            #[Attribute]\n\
            final class Helper\n\
            {\n\
                public function greet($name) {}\n\
            }\n";
        let class = parse_class("Vendor\\Site\\Helper", "file:///Helper.php", content).expect("class resolves");
        assert_eq!(class.position, Position { line: 10, character: 6 });
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["greet"]);

        let commented_out = "<?php\nnamespace Vendor\\Site;\n// class Helper {}\n";
        assert!(parse_class("Vendor\\Site\\Helper", "file:///Helper.php", commented_out).is_none());
    }

    #[test]
    fn test_parse_class_requires_namespace_and_class() {
        assert!(parse_class("Other\\Ns\\FooHelper", "file:///x.php", HELPER).is_none());
        assert!(parse_class("Vendor\\Site\\Eel\\BarHelper", "file:///x.php", HELPER).is_none());
    }
}
