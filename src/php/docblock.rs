//! Doc comment scanning for PHP methods.
//!
//! Only the comment directly above a method signature is considered.  The
//! scan walks backwards line by line from the signature to the opening
//! `/**` and collects the `@return` tag plus free-text description lines.

/// What a method's doc comment says about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDoc {
    pub description: Option<String>,
    pub return_type: Option<String>,
    pub return_description: Option<String>,
}

/// Scan the doc comment that ends on the line directly above
/// `signature_line` (0-based) in `lines`.
pub fn method_doc(lines: &[&str], signature_line: usize) -> MethodDoc {
    let mut doc = MethodDoc::default();
    let Some(comment_lines) = comment_above(lines, signature_line) else {
        return doc;
    };

    let mut description = Vec::new();
    for line in comment_lines {
        let trimmed = line
            .trim()
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .trim()
            .trim_start_matches('*')
            .trim();

        if let Some(rest) = trimmed.strip_prefix("@return") {
            // `@returnFoo` is a different tag
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let mut parts = rest.trim().splitn(2, char::is_whitespace);
            if let Some(return_type) = parts.next().filter(|t| !t.is_empty()) {
                doc.return_type = Some(return_type.trim_start_matches('\\').to_string());
            }
            if let Some(text) = parts.next().map(str::trim).filter(|t| !t.is_empty()) {
                doc.return_description = Some(text.to_string());
            }
        } else if trimmed.starts_with('@') {
            continue;
        } else if !trimmed.is_empty() {
            description.push(trimmed.to_string());
        }
    }

    if !description.is_empty() {
        doc.description = Some(description.join("\n"));
    }
    doc
}

/// The lines of the `/** … */` block ending right above `signature_line`,
/// in source order.  Attribute lines (`#[…]`) between the comment and the
/// signature are skipped.
fn comment_above<'a>(lines: &[&'a str], signature_line: usize) -> Option<Vec<&'a str>> {
    let mut index = signature_line;
    loop {
        index = index.checked_sub(1)?;
        let trimmed = lines.get(index)?.trim();
        if trimmed.starts_with("#[") {
            continue;
        }
        if !trimmed.ends_with("*/") {
            return None;
        }
        break;
    }

    let end = index;
    loop {
        let trimmed = lines[index].trim_start();
        if trimmed.starts_with("/**") {
            return Some(lines[index..=end].to_vec());
        }
        if trimmed.starts_with("/*") {
            // plain block comment, not a doc comment
            return None;
        }
        index = index.checked_sub(1)?;
    }
}
