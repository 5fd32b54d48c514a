//! Byte offset ↔ line/column conversion and located nodes.
//!
//! Offsets from the parser are converted once per node into LSP positions
//! (UTF-16 columns).  The per-file [`LineIndex`] is itself cached in the
//! `line_indexes` tagged cache under the file URI.
use memchr::memchr_iter;
use tower_lsp::lsp_types::{Position, Range};

use crate::fusion::{NodeId, NodeType, Span};

/// Start offsets of every line in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr_iter(b'\n', text.as_bytes()).map(|i| i + 1));
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset into a position.  `text` must be the text the
    /// index was built from.
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        let character = text
            .get(line_start..offset)
            .map(|s| s.encode_utf16().count())
            .unwrap_or(offset - line_start);
        Position {
            line: line as u32,
            character: character as u32,
        }
    }

    /// Convert a position into a byte offset, clamping to the line end.
    pub fn offset(&self, text: &str, position: Position) -> usize {
        let Some(&line_start) = self.line_starts.get(position.line as usize) else {
            return self.len;
        };
        let line_end = self
            .line_starts
            .get(position.line as usize + 1)
            .copied()
            .unwrap_or(self.len);
        let line = &text[line_start..line_end];

        let mut units = 0u32;
        for (byte, ch) in line.char_indices() {
            if units >= position.character || ch == '\n' {
                return line_start + byte;
            }
            units += ch.len_utf16() as u32;
        }
        line_end
    }

    pub fn range(&self, text: &str, span: Span) -> Range {
        Range {
            start: self.position(text, span.begin),
            end: self.position(text, span.end),
        }
    }
}

/// A node together with its resolved line/column span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedNode {
    pub node: NodeId,
    pub node_type: NodeType,
    pub range: Range,
}

impl LocatedNode {
    pub fn contains(&self, position: Position) -> bool {
        let start = self.range.start;
        let end = self.range.end;
        (position.line, position.character) >= (start.line, start.character)
            && (position.line, position.character) <= (end.line, end.character)
    }

    pub fn lines(&self) -> std::ops::RangeInclusive<u32> {
        self.range.start.line..=self.range.end.line
    }

    pub fn weight(&self) -> u32 {
        weight(self.node_type)
    }
}

/// Specificity of a node kind when several nodes cover the cursor.
///
/// Concrete references outrank the values that contain them, which outrank
/// generic structure.
pub fn weight(node_type: NodeType) -> u32 {
    match node_type {
        NodeType::FusionFile | NodeType::StatementList | NodeType::Block => 0,
        NodeType::ObjectStatement => 5,
        NodeType::ObjectPath
        | NodeType::ValueAssignment
        | NodeType::ValueCopy
        | NodeType::ValueUnset
        | NodeType::IncludeStatement => 10,
        NodeType::DslExpression => 15,
        NodeType::EelExpression => 20,
        NodeType::StringValue
        | NodeType::IntValue
        | NodeType::FloatValue
        | NodeType::BoolValue
        | NodeType::NullValue => 25,
        NodeType::PathSegment | NodeType::MetaPathSegment => 30,
        NodeType::AfxAttribute | NodeType::AfxTag => 35,
        NodeType::FusionObjectValue | NodeType::PrototypePathSegment => 40,
        NodeType::EelObjectPath => 45,
        NodeType::PrototypeReference
        | NodeType::ResourceUri
        | NodeType::PhpClassReference
        | NodeType::ActionUriController
        | NodeType::ActionUriAction => 50,
        NodeType::EelHelper => 55,
        NodeType::EelHelperMethod => 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_round_trip_with_multibyte_text() {
        let text = "a = 'ä'\nb = ${props.x}\n";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 3);

        let offset = text.find("props").unwrap();
        let position = index.position(text, offset);
        assert_eq!(position, Position { line: 1, character: 6 });
        assert_eq!(index.offset(text, position), offset);

        let after_umlaut = text.find("'\n").unwrap();
        assert_eq!(index.position(text, after_umlaut), Position { line: 0, character: 6 });
    }

    #[test]
    fn test_offset_clamps_past_line_end() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset(text, Position { line: 0, character: 99 }), 2);
        assert_eq!(index.offset(text, Position { line: 7, character: 0 }), 5);
    }

    #[test]
    fn test_concrete_nodes_outrank_statements() {
        assert!(weight(NodeType::EelObjectPath) > weight(NodeType::EelExpression));
        assert!(weight(NodeType::EelHelperMethod) > weight(NodeType::EelHelper));
        assert!(weight(NodeType::PrototypeReference) > weight(NodeType::AfxTag));
        assert!(weight(NodeType::PathSegment) > weight(NodeType::ObjectStatement));
    }
}
