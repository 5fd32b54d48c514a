//! Fusion parser.
//!
//! A small recursive-descent parser producing a [`FusionDocument`].  It
//! stops at the first syntax error; the caller decides what to do with a
//! file that does not parse.
use thiserror::Error;

use super::afx;
use super::ast::{Comment, FusionDocument, NodeId, NodeKind, Span};
use super::eel;

/// A syntax error at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at offset {offset})")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

type ParseResult<T> = Result<T, ParseError>;

/// Parse Fusion source text.
pub fn parse(text: &str) -> Result<FusionDocument, ParseError> {
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        doc: FusionDocument::new(),
    };
    let root = parser
        .doc
        .push(NodeKind::FusionFile, Span::new(0, text.len()), None);
    let list = parser
        .doc
        .push(NodeKind::StatementList, Span::new(0, text.len()), Some(root));
    parser.statement_list(list, false)?;
    Ok(parser.doc)
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

fn is_object_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_'
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    doc: FusionDocument,
}

impl<'a> Parser<'a> {
    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError {
            message: message.into(),
            offset: self.pos,
        })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Consume a comment at the cursor, if any.
    fn comment(&mut self) -> ParseResult<bool> {
        let start = self.pos;
        if self.rest().starts_with("/*") {
            let Some(end) = self.rest()[2..].find("*/") else {
                return self.error("Unterminated block comment");
            };
            self.pos += end + 4;
        } else if self.rest().starts_with("//") || self.peek() == Some(b'#') {
            let end = self.rest().find('\n').unwrap_or(self.rest().len());
            self.pos += end;
        } else {
            return Ok(false);
        }
        self.doc.comments.push(Comment {
            span: Span::new(start, self.pos),
            text: self.text[start..self.pos].to_string(),
        });
        Ok(true)
    }

    /// Skip whitespace, newlines, `;` and comments between statements.
    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | b';') => self.pos += 1,
                Some(b'/' | b'#') => {
                    if !self.comment()? {
                        return Ok(());
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn statement_list(&mut self, list: NodeId, in_block: bool) -> ParseResult<()> {
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None if in_block => return self.error("Unexpected end of file, expected `}`"),
                None => return Ok(()),
                Some(b'}') if in_block => return Ok(()),
                Some(b'}') => return self.error("Unexpected `}`"),
                _ => {}
            }

            if self.at_include() {
                self.include(list)?;
            } else {
                self.statement(list)?;
            }
        }
    }

    fn at_include(&self) -> bool {
        let Some(rest) = self.rest().strip_prefix("include") else {
            return false;
        };
        rest.trim_start_matches([' ', '\t']).starts_with(':')
    }

    fn include(&mut self, list: NodeId) -> ParseResult<()> {
        let start = self.pos;
        let colon = self.rest().find(':').unwrap_or(0);
        self.pos += colon + 1;
        let line_end = self.rest().find('\n').unwrap_or(self.rest().len());
        let path = self.rest()[..line_end].trim().to_string();
        self.pos += line_end;
        self.doc.push(
            NodeKind::IncludeStatement { path },
            Span::new(start, self.pos),
            Some(list),
        );
        Ok(())
    }

    fn statement(&mut self, list: NodeId) -> ParseResult<()> {
        let start = self.pos;
        let statement = self
            .doc
            .push(NodeKind::ObjectStatement, Span::new(start, start), Some(list));

        self.path(statement)?;
        self.skip_inline_whitespace();

        let has_operation = match self.peek() {
            Some(b'=') => {
                let op_start = self.pos;
                self.pos += 1;
                let operation = self.doc.push(
                    NodeKind::ValueAssignment,
                    Span::new(op_start, op_start + 1),
                    Some(statement),
                );
                self.skip_inline_whitespace();
                self.value(operation)?;
                self.doc.set_end(operation, self.pos);
                true
            }
            Some(b'<') => {
                let op_start = self.pos;
                self.pos += 1;
                let operation = self.doc.push(
                    NodeKind::ValueCopy,
                    Span::new(op_start, op_start + 1),
                    Some(statement),
                );
                self.skip_inline_whitespace();
                self.path(operation)?;
                self.doc.set_end(operation, self.pos);
                true
            }
            Some(b'>') => {
                self.doc.push(
                    NodeKind::ValueUnset,
                    Span::new(self.pos, self.pos + 1),
                    Some(statement),
                );
                self.pos += 1;
                true
            }
            _ => false,
        };

        self.skip_inline_whitespace();
        if self.peek() == Some(b'{') {
            self.block(statement)?;
        } else if !has_operation {
            return self.error("Expected `=`, `<`, `>` or `{` after path");
        }

        self.doc.set_end(statement, self.pos);
        self.end_of_statement()
    }

    fn end_of_statement(&mut self) -> ParseResult<()> {
        self.skip_inline_whitespace();
        if matches!(self.peek(), Some(b'/' | b'#')) {
            self.comment()?;
        }
        match self.peek() {
            None | Some(b'\n' | b'\r' | b';' | b'}') => Ok(()),
            Some(_) => self.error("Unexpected character after statement"),
        }
    }

    fn block(&mut self, statement: NodeId) -> ParseResult<()> {
        let start = self.pos;
        self.pos += 1;
        let block = self
            .doc
            .push(NodeKind::Block, Span::new(start, start), Some(statement));
        let list = self
            .doc
            .push(NodeKind::StatementList, Span::new(self.pos, self.pos), Some(block));
        self.statement_list(list, true)?;
        self.doc.set_end(list, self.pos);
        // statement_list only returns in a block when it sees `}`
        self.pos += 1;
        self.doc.set_end(block, self.pos);
        Ok(())
    }

    fn path(&mut self, parent: NodeId) -> ParseResult<()> {
        let start = self.pos;
        let path = self
            .doc
            .push(NodeKind::ObjectPath, Span::new(start, start), Some(parent));
        loop {
            self.segment(path)?;
            if self.peek() == Some(b'.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.doc.set_end(path, self.pos);
        Ok(())
    }

    fn segment(&mut self, path: NodeId) -> ParseResult<()> {
        if self.rest().starts_with("prototype(") {
            self.pos += "prototype(".len();
            let Some(close) = self.rest().find(')') else {
                return self.error("Unterminated prototype name, expected `)`");
            };
            let name_start = self.pos;
            let name = self.rest()[..close].trim().to_string();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return self.error("Invalid prototype name");
            }
            self.pos += close + 1;
            self.doc.push(
                NodeKind::PrototypePathSegment { identifier: name },
                Span::new(name_start, name_start + close),
                Some(path),
            );
            return Ok(());
        }

        match self.peek() {
            Some(b'@') => {
                let start = self.pos;
                self.pos += 1;
                let identifier = self.identifier()?;
                self.doc.push(
                    NodeKind::MetaPathSegment { identifier },
                    Span::new(start, self.pos),
                    Some(path),
                );
            }
            Some(quote @ (b'"' | b'\'')) => {
                let start = self.pos;
                let identifier = self.quoted(quote)?;
                self.doc.push(
                    NodeKind::PathSegment { identifier },
                    Span::new(start, self.pos),
                    Some(path),
                );
            }
            Some(byte) if is_identifier_byte(byte) => {
                let start = self.pos;
                let identifier = self.identifier()?;
                self.doc.push(
                    NodeKind::PathSegment { identifier },
                    Span::new(start, self.pos),
                    Some(path),
                );
            }
            _ => return self.error("Expected path segment"),
        }
        Ok(())
    }

    fn identifier(&mut self) -> ParseResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_byte) {
            self.pos += 1;
        }
        if self.pos == start {
            return self.error("Expected identifier");
        }
        Ok(self.text[start..self.pos].to_string())
    }

    /// Parse a quoted string at the cursor and return its unescaped value.
    fn quoted(&mut self, quote: u8) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(byte) = self.peek() else {
                self.pos = start;
                return self.error("Unterminated string");
            };
            match byte {
                b'\\' => {
                    if let Some(next) = self.rest()[1..].chars().next() {
                        if next as u32 != quote as u32 && next != '\\' {
                            value.push('\\');
                        }
                        value.push(next);
                        self.pos += 1 + next.len_utf8();
                    } else {
                        self.pos += 1;
                    }
                }
                b if b == quote => {
                    self.pos += 1;
                    return Ok(value);
                }
                _ => {
                    let Some(ch) = self.rest().chars().next() else {
                        return self.error("Unterminated string");
                    };
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn value(&mut self, operation: NodeId) -> ParseResult<()> {
        let start = self.pos;
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let value = self.quoted(quote)?;
                self.doc.push(
                    NodeKind::StringValue { value },
                    Span::new(start, self.pos),
                    Some(operation),
                );
            }
            Some(b'$') if self.peek_at(1) == Some(b'{') => {
                let Some(close) = afx::matching_brace(self.bytes, start + 1) else {
                    return self.error("Unterminated EEL expression, expected `}`");
                };
                let code_begin = start + 2;
                let code = self.text[code_begin..close].to_string();
                self.pos = close + 1;
                let expression = self.doc.push(
                    NodeKind::EelExpression {
                        code: code.clone(),
                        code_begin,
                    },
                    Span::new(start, self.pos),
                    Some(operation),
                );
                for (range, path) in eel::object_paths(&code) {
                    self.doc.push(
                        NodeKind::EelObjectPath { path },
                        Span::new(range.start, range.end).offset_by(code_begin),
                        Some(expression),
                    );
                }
            }
            Some(byte) if byte.is_ascii_digit() || (byte == b'-' && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())) => {
                self.number(operation)?;
            }
            Some(byte) if byte.is_ascii_alphabetic() => {
                let word_end = self
                    .rest()
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'))
                    .unwrap_or(self.rest().len());
                let word = &self.rest()[..word_end];
                let after = self.bytes.get(self.pos + word_end).copied();

                if after == Some(b'`') {
                    return self.dsl(operation, word_end);
                }
                if after == Some(b':') {
                    return self.object_value(operation);
                }

                let kind = match word {
                    "true" | "TRUE" => NodeKind::BoolValue { value: true },
                    "false" | "FALSE" => NodeKind::BoolValue { value: false },
                    "null" | "NULL" => NodeKind::NullValue,
                    _ => return self.error(format!("Unexpected value `{}`", word)),
                };
                self.pos += word_end;
                self.doc
                    .push(kind, Span::new(start, self.pos), Some(operation));
            }
            _ => return self.error("Expected value"),
        }
        Ok(())
    }

    fn number(&mut self, operation: NodeId) -> ParseResult<()> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let is_float = self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit());
        if is_float {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal = &self.text[start..self.pos];
        let kind = if is_float {
            match literal.parse() {
                Ok(value) => NodeKind::FloatValue { value },
                Err(_) => return self.error("Invalid number"),
            }
        } else {
            match literal.parse() {
                Ok(value) => NodeKind::IntValue { value },
                Err(_) => return self.error("Invalid number"),
            }
        };
        self.doc
            .push(kind, Span::new(start, self.pos), Some(operation));
        Ok(())
    }

    fn object_value(&mut self, operation: NodeId) -> ParseResult<()> {
        let start = self.pos;
        while self.peek().is_some_and(is_object_name_byte) {
            self.pos += 1;
        }
        if self.peek() != Some(b':') {
            return self.error("Expected `:` in object name");
        }
        self.pos += 1;
        let local_start = self.pos;
        while self.peek().is_some_and(is_object_name_byte) {
            self.pos += 1;
        }
        if self.pos == local_start {
            return self.error("Expected object name after `:`");
        }
        self.doc.push(
            NodeKind::FusionObjectValue {
                name: self.text[start..self.pos].to_string(),
            },
            Span::new(start, self.pos),
            Some(operation),
        );
        Ok(())
    }

    fn dsl(&mut self, operation: NodeId, identifier_len: usize) -> ParseResult<()> {
        let start = self.pos;
        let identifier = self.rest()[..identifier_len].to_string();
        self.pos += identifier_len + 1;
        let code_begin = self.pos;
        let Some(close) = self.rest().find('`') else {
            return self.error("Unterminated DSL expression, expected closing backtick");
        };
        let code = self.rest()[..close].to_string();
        self.pos += close + 1;

        let expression = self.doc.push(
            NodeKind::DslExpression {
                identifier: identifier.clone(),
                code: code.clone(),
                code_begin,
            },
            Span::new(start, self.pos),
            Some(operation),
        );
        if identifier == "afx" {
            afx::scan(&mut self.doc, expression, &code, code_begin);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::ast::NodeType;

    fn statements(doc: &FusionDocument) -> Vec<NodeId> {
        doc.ids()
            .filter(|&id| doc.kind(id).node_type() == NodeType::ObjectStatement)
            .collect()
    }

    #[test]
    fn test_parse_prototype_declaration() {
        let text = "prototype(Vendor.Site:Card) < prototype(Neos.Fusion:Component) {\n    title = 'Hello'\n}\n";
        let doc = parse(text).expect("parses");
        let stmts = statements(&doc);
        assert_eq!(stmts.len(), 2);

        let card = stmts[0];
        assert_eq!(doc.declared_prototype(card), Some("Vendor.Site:Card"));
        let copied = doc.copied_path(card).expect("copy operation");
        let base = doc.children(copied)[0];
        assert_eq!(doc.segment_identifier(base), Some("Neos.Fusion:Component"));
        let span = doc.span(doc.path_segments(card)[0]);
        assert_eq!(&text[span.begin..span.end], "Vendor.Site:Card");

        let title = stmts[1];
        assert_eq!(doc.path_string(title), "title");
        let value = doc.assigned_value(title).expect("value");
        assert_eq!(
            doc.kind(value),
            &NodeKind::StringValue {
                value: "Hello".to_string()
            }
        );
        assert_eq!(doc.block_statements(card), vec![title]);
    }

    #[test]
    fn test_parse_values() {
        let text = concat!(
            "a = 1\n",
            "b = -2.5\n",
            "c = true\n",
            "d = NULL\n",
            "e = Neos.Fusion:Tag\n",
            "f = ${props.title}\n",
            "g = afx`<div>{props.body}</div>`\n",
            "h >\n",
            "@context.x = \"y\"\n",
        );
        let doc = parse(text).expect("parses");
        let values: Vec<NodeType> = statements(&doc)
            .into_iter()
            .filter_map(|s| doc.assigned_value(s))
            .map(|v| doc.kind(v).node_type())
            .collect();
        assert_eq!(
            values,
            vec![
                NodeType::IntValue,
                NodeType::FloatValue,
                NodeType::BoolValue,
                NodeType::NullValue,
                NodeType::FusionObjectValue,
                NodeType::EelExpression,
                NodeType::DslExpression,
                NodeType::StringValue,
            ]
        );
        let object_paths = doc
            .ids()
            .filter(|&id| doc.kind(id).node_type() == NodeType::EelObjectPath)
            .count();
        assert_eq!(object_paths, 2);
    }

    #[test]
    fn test_parse_comments_and_includes() {
        let text = "include: resource://Vendor.Site/Private/Fusion/**/*\n# hash\n// slash\n/* block */\na = 1 // trailing\n";
        let doc = parse(text).expect("parses");
        assert_eq!(doc.comments.len(), 4);
        assert!(doc.ids().any(|id| matches!(
            doc.kind(id),
            NodeKind::IncludeStatement { path } if path == "resource://Vendor.Site/Private/Fusion/**/*"
        )));
    }

    #[test]
    fn test_parse_nested_blocks_link_parents() {
        let doc = parse("a {\n  b {\n    c = 1\n  }\n}\n").expect("parses");
        let stmts = statements(&doc);
        let c = stmts[2];
        let parents: Vec<String> = doc
            .ancestors(c)
            .filter(|&id| doc.kind(id).node_type() == NodeType::ObjectStatement)
            .map(|id| doc.path_string(id))
            .collect();
        assert_eq!(parents, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_errors_report_offset() {
        let err = parse("a = 1\nb {\n  c = 2\n").expect_err("missing brace");
        assert_eq!(err.offset, 18);
        assert!(err.message.contains("expected `}`"));

        let err = parse("a = ${props.x\n").expect_err("unterminated eel");
        assert!(err.message.contains("EEL"));

        assert!(parse("a b\n").is_err());
    }
}
