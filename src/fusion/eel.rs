//! Lightweight EEL scanning.
//!
//! EEL is not parsed into a full expression tree.  The server only needs to
//! know where `props.x` / `this.x` references, quoted string literals and
//! helper call sites are, so the code is scanned with regular expressions
//! after string contents have been masked out.
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static OBJECT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:props|this)(?:\.[A-Za-z0-9_\-]*)+").expect("valid object path regex")
});

static INSTANCEOF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[instanceof\s+([A-Za-z0-9.]+:[A-Za-z0-9.]+)\s*\]").expect("valid instanceof regex")
});

/// Replace the contents of quoted strings with spaces.
///
/// Byte offsets are preserved, the quotes themselves are kept.
pub fn mask_strings(code: &str) -> String {
    let mut out = Vec::with_capacity(code.len());
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for &byte in code.as_bytes() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                    out.push(b' ');
                } else if byte == b'\\' {
                    escaped = true;
                    out.push(b' ');
                } else if byte == q {
                    quote = None;
                    out.push(byte);
                } else {
                    out.push(b' ');
                }
            }
            None => {
                if byte == b'"' || byte == b'\'' {
                    quote = Some(byte);
                }
                out.push(byte);
            }
        }
    }

    // Only ASCII was written over string contents, everything else is copied
    // byte for byte from valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| " ".repeat(code.len()))
}

/// `props.x…` / `this.x…` occurrences outside of string literals, with
/// ranges relative to `code`.
pub fn object_paths(code: &str) -> Vec<(Range<usize>, String)> {
    let masked = mask_strings(code);
    OBJECT_PATH
        .find_iter(&masked)
        .filter(|m| !masked[..m.start()].ends_with('.'))
        .map(|m| (m.range(), m.as_str().to_string()))
        .collect()
}

/// Contents of quoted string literals (quotes excluded), relative to `code`.
pub fn string_literals(code: &str) -> Vec<(Range<usize>, String)> {
    let bytes = code.as_bytes();
    let mut literals = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte != b'"' && byte != b'\'' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && bytes[j] != byte {
            if bytes[j] == b'\\' {
                j += 1;
            }
            j += 1;
        }
        let end = j.min(bytes.len());
        literals.push((start..end, code[start..end].to_string()));
        i = end + 1;
    }

    literals
}

/// `[instanceof Vendor:Name]` clauses in a string, as (name range, name).
pub fn instanceof_clauses(text: &str) -> Vec<(Range<usize>, String)> {
    INSTANCEOF
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.range(), m.as_str().to_string()))
        .collect()
}

/// Whether `code` is nothing but a bare `props` reference.
pub fn is_bare_props(code: &str) -> bool {
    code.trim() == "props"
}

/// Find the innermost unclosed `Name.method(` before `cursor` in `code`
/// and the index of the argument the cursor is in.
pub fn call_at(code: &str, cursor: usize) -> Option<(String, String, u32)> {
    let masked = mask_strings(code);
    let before = masked.get(..cursor.min(masked.len()))?;
    let bytes = before.as_bytes();

    let mut depth = 0i32;
    let mut commas = 0u32;
    let mut i = bytes.len();
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b')' | b']' | b'}' => depth += 1,
            b'[' | b'{' if depth > 0 => depth -= 1,
            b'[' | b'{' => return None,
            b'(' if depth > 0 => depth -= 1,
            b'(' => {
                let callee = before[..i].trim_end();
                let start = callee
                    .char_indices()
                    .rev()
                    .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                    .map(|(p, c)| p + c.len_utf8())
                    .unwrap_or(0);
                let callee = &callee[start..];
                let (helper, method) = callee.rsplit_once('.')?;
                if helper.is_empty() || method.is_empty() {
                    return None;
                }
                return Some((helper.to_string(), method.to_string(), commas));
            }
            b',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    None
}

/// Trimmed ranges of the top-level arguments of the call whose `(` is at
/// `open`.  An unclosed call yields the arguments up to the end of `code`.
pub fn call_arguments(code: &str, open: usize) -> Vec<Range<usize>> {
    let masked = mask_strings(code);
    let bytes = masked.as_bytes();
    let mut arguments = Vec::new();
    let mut depth = 0i32;
    let mut start = open + 1;
    let mut end = bytes.len();

    for (i, &byte) in bytes.iter().enumerate().skip(open + 1) {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' if depth > 0 => depth -= 1,
            b')' => {
                end = i;
                break;
            }
            b',' if depth == 0 => {
                arguments.push(start..i);
                start = i + 1;
            }
            _ => {}
        }
    }
    arguments.push(start..end.max(start));

    arguments
        .into_iter()
        .filter_map(|range| {
            let raw = &code[range.clone()];
            let leading = raw.len() - raw.trim_start().len();
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| {
                let begin = range.start + leading;
                begin..begin + trimmed.len()
            })
        })
        .collect()
}

/// Whether an argument is a plain string, number or keyword literal.
pub fn is_literal(argument: &str) -> bool {
    let argument = argument.trim();
    let quoted = ['\'', '"'].into_iter().any(|quote| {
        argument.len() >= 2
            && argument.starts_with(quote)
            && argument.ends_with(quote)
            && !argument[1..argument.len() - 1].contains(quote)
    });
    quoted
        || argument.parse::<f64>().is_ok()
        || matches!(argument, "true" | "false" | "null" | "TRUE" | "FALSE" | "NULL")
}
