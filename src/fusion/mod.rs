//! Fusion syntax: the node arena, the parser, and the embedded AFX and EEL
//! scanners.
pub mod afx;
pub mod ast;
pub mod eel;
pub mod parser;

pub use ast::{Comment, FusionDocument, Node, NodeId, NodeKind, NodeType, Span};
pub use parser::{ParseError, parse};
