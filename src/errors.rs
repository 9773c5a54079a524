use thiserror::Error;

use crate::dom::NodeId;

/// Errors raised while configuring the chunker.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// A budget smaller than one UTF-8 scalar could never make progress
    #[error("chunk budget of {0} bytes is too small (minimum 4)")]
    BudgetTooSmall(usize),

    #[error("paragraph separator must not be empty")]
    EmptySeparator,
}

/// Errors from a named-entity recognizer. All of them abort the run.
#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("failed to start recognizer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recognizer `{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("cannot parse recognizer output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("recognizer returned span {start}..{end} outside a chunk of {len} characters")]
    InvalidSpan { start: usize, end: usize, len: usize },

    #[error("invalid gazetteer line {line}: {reason}")]
    Gazetteer { line: usize, reason: String },

    #[error("cannot compile gazetteer pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors from parsing or editing a document tree.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("closing tag </{0}> has no matching start tag")]
    UnexpectedEnd(String),

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRootElement,

    /// The node was already replaced or never attached
    #[error("node {0:?} is not attached to the tree")]
    Detached(NodeId),

    #[error("node {0:?} cannot have children")]
    NotAContainer(NodeId),
}
