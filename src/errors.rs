//! Analysis errors definition.

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("duplicate class: {0}")]
    DuplicateClass(String),

    #[error("duplicate method {sig} in class {class}")]
    DuplicateMethod { class: String, sig: String },

    #[error("duplicate control flow node: {0}")]
    DuplicateNode(String),

    #[error("unknown control flow node: {0}")]
    UnknownNode(String),

    #[error("statement {0} is out of bounds for the method body")]
    StmtOutOfBounds(String),

    #[error("exit node {0} has outgoing edges")]
    ExitWithSuccessors(String),

    #[error("method {0} has no body")]
    NoBody(String),

    #[error("reachable method {0} has no control flow graph")]
    MissingCfg(String),

    #[error("entry method {0} has no control flow graph")]
    MissingEntry(String),
}
