//! AFX scanning.
//!
//! AFX bodies are scanned leniently: tag names, attribute names, quoted
//! attribute values and `{…}` expressions are turned into child nodes of
//! the owning `DslExpression`.  Malformed markup never fails the file, the
//! scanner simply skips what it does not understand.
use super::ast::{FusionDocument, NodeId, NodeKind, Span};
use super::eel;

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b':')
}

fn is_attribute_byte(byte: u8) -> bool {
    is_name_byte(byte) || byte == b'@'
}

/// Scan `code` (which starts at absolute offset `base`) and attach the
/// discovered nodes to `parent`.
pub(crate) fn scan(doc: &mut FusionDocument, parent: NodeId, code: &str, base: usize) {
    let bytes = code.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' if code[i..].starts_with("<!--") => {
                i = code[i..].find("-->").map(|p| i + p + 3).unwrap_or(bytes.len());
            }
            b'<' if i + 1 < bytes.len()
                && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'/') =>
            {
                i = scan_tag(doc, parent, code, base, i);
            }
            b'{' => {
                let end = matching_brace(bytes, i).unwrap_or(bytes.len());
                push_expression(doc, parent, code, base, i, end);
                i = end + 1;
            }
            _ => i += 1,
        }
    }
}

/// Scan one tag starting at `<`.  Returns the index after the tag.
fn scan_tag(doc: &mut FusionDocument, parent: NodeId, code: &str, base: usize, start: usize) -> usize {
    let bytes = code.as_bytes();
    let mut i = start + 1;
    let closing = bytes[i] == b'/';
    if closing {
        i += 1;
    }

    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    if i == name_start {
        return i;
    }

    let tag = doc.push(
        NodeKind::AfxTag {
            name: code[name_start..i].to_string(),
            closing,
        },
        Span::new(name_start, i).offset_by(base),
        Some(parent),
    );

    while i < bytes.len() {
        match bytes[i] {
            b'>' => return i + 1,
            b'/' if bytes.get(i + 1) == Some(&b'>') => return i + 2,
            b'{' => {
                // `{...props}` spread or similar
                let end = matching_brace(bytes, i).unwrap_or(bytes.len());
                push_expression(doc, tag, code, base, i, end);
                i = end + 1;
            }
            byte if is_attribute_byte(byte) => {
                let attr_start = i;
                while i < bytes.len() && is_attribute_byte(bytes[i]) {
                    i += 1;
                }
                let attribute = doc.push(
                    NodeKind::AfxAttribute {
                        name: code[attr_start..i].to_string(),
                    },
                    Span::new(attr_start, i).offset_by(base),
                    Some(tag),
                );
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if bytes.get(i) != Some(&b'=') {
                    continue;
                }
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                match bytes.get(i) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let value_start = i + 1;
                        let value_end = code[value_start..]
                            .find(quote as char)
                            .map(|p| value_start + p)
                            .unwrap_or(bytes.len());
                        doc.push(
                            NodeKind::StringValue {
                                value: code[value_start..value_end].to_string(),
                            },
                            Span::new(i, (value_end + 1).min(bytes.len())).offset_by(base),
                            Some(attribute),
                        );
                        i = value_end + 1;
                    }
                    Some(b'{') => {
                        let end = matching_brace(bytes, i).unwrap_or(bytes.len());
                        push_expression(doc, attribute, code, base, i, end);
                        i = end + 1;
                    }
                    _ => {}
                }
            }
            _ => i += 1,
        }
    }

    i
}

/// Push an `EelExpression` for `{…}` spanning `open..=close` and its object
/// paths.
fn push_expression(
    doc: &mut FusionDocument,
    parent: NodeId,
    code: &str,
    base: usize,
    open: usize,
    close: usize,
) {
    let inner_end = close.min(code.len());
    let inner = &code[(open + 1).min(inner_end)..inner_end];
    let code_begin = base + open + 1;
    let expression = doc.push(
        NodeKind::EelExpression {
            code: inner.to_string(),
            code_begin,
        },
        Span::new(open, (close + 1).min(code.len())).offset_by(base),
        Some(parent),
    );
    for (range, path) in eel::object_paths(inner) {
        doc.push(
            NodeKind::EelObjectPath { path },
            Span::new(range.start, range.end).offset_by(code_begin),
            Some(expression),
        );
    }
}

/// Index of the `}` matching the `{` at `open`, string-aware.
pub(crate) fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
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
                b'"' | b'\'' => quote = Some(byte),
                b'{' => depth += 1,
                b'}' => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::ast::NodeType;

    fn scan_code(code: &str) -> FusionDocument {
        let mut doc = FusionDocument::new();
        let root = doc.push(NodeKind::FusionFile, Span::new(0, code.len()), None);
        scan(&mut doc, root, code, 0);
        doc
    }

    #[test]
    fn test_scan_tags_attributes_and_expressions() {
        let code = r#"<Vendor.Site:Card title="Hi" text={props.text}>{props.body}</Vendor.Site:Card>"#;
        let doc = scan_code(code);

        let tags: Vec<(String, bool)> = doc
            .ids()
            .filter_map(|id| match doc.kind(id) {
                NodeKind::AfxTag { name, closing } => Some((name.clone(), *closing)),
                _ => None,
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                ("Vendor.Site:Card".to_string(), false),
                ("Vendor.Site:Card".to_string(), true)
            ]
        );

        let paths: Vec<String> = doc
            .ids()
            .filter_map(|id| match doc.kind(id) {
                NodeKind::EelObjectPath { path } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["props.text", "props.body"]);

        let attribute = doc
            .ids()
            .find(|&id| doc.kind(id).node_type() == NodeType::AfxAttribute)
            .expect("attribute");
        let span = doc.span(attribute);
        assert_eq!(&code[span.begin..span.end], "title");
        let value = doc.children(attribute)[0];
        assert_eq!(
            doc.kind(value),
            &NodeKind::StringValue {
                value: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_matching_brace_skips_strings() {
        let bytes = b"{ a ? '}' : {b} } rest";
        assert_eq!(matching_brace(bytes, 0), Some(16));
    }

    #[test]
    fn test_unterminated_markup_does_not_panic() {
        let doc = scan_code("<div class=\"x");
        assert!(doc.ids().any(|id| doc.kind(id).node_type() == NodeType::AfxTag));
    }
}
