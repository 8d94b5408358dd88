//! Core error types for the generation pipeline
//!
//! Each stage owns a small error enum; [`VectorSigmaError`] wraps them for
//! callers that drive the whole pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while extracting a diagram from its container
///
/// The line parser itself never fails; unrecognized lines are skipped.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no plantuml found in markdown")]
    MissingPlantUml,

    #[error("missing end of plantuml code block in markdown")]
    UnterminatedPlantUml,
}

/// Which side of an incremental merge a source text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Existing,
    Generated,
}

impl std::fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceOrigin::Existing => write!(f, "existing"),
            SourceOrigin::Generated => write!(f, "generated"),
        }
    }
}

/// Errors raised by the incremental merge engine
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Syntax error in {origin} source: {message} at line {line}, column {column}")]
    Syntax {
        origin: SourceOrigin,
        message: String,
        line: usize,
        column: usize,
    },
}

impl MergeError {
    /// Create a new syntax error from a `syn` parse failure
    pub fn syntax(origin: SourceOrigin, error: &syn::Error) -> Self {
        let start = error.span().start();
        Self::Syntax {
            origin,
            message: error.to_string(),
            line: start.line,
            column: start.column,
        }
    }
}

/// Fatal errors raised by the abstract machine
///
/// Action and guard failures are data: they are captured in the extended
/// state and only surface as [`MachineError::Failed`] once the machine
/// reaches its final state.
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("max state depth exceeded: depth {depth} is above the limit of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("missing config for state: {state}")]
    MissingState { state: String },

    #[error("state {state} has no matching guard and no default transition")]
    Stalled { state: String },

    #[error("no action bound for name: {name}")]
    UnboundAction { name: String },

    #[error("no guard bound for name: {name}")]
    UnboundGuard { name: String },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Errors raised while rendering, writing, or formatting generated files
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Render error: {message}")]
    Render { message: String },

    #[error("failed to initialize new module, file exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("invalid output {}: not a directory", path.display())]
    InvalidOutput { path: PathBuf },

    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GeneratorError {
    /// Create a new render error
    pub fn render_error(message: String) -> Self {
        Self::Render { message }
    }

    /// Create a new IO error bound to the path that caused it
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error for callers that run the whole pipeline
#[derive(Error, Debug)]
pub enum VectorSigmaError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_syntax_error() {
        let err = syn::parse_file("fn broken( {").err().unwrap();
        let error = MergeError::syntax(SourceOrigin::Existing, &err);
        let error_msg = format!("{}", error);
        assert!(error_msg.contains("Syntax error"));
        assert!(error_msg.contains("existing source"));
    }

    #[test]
    fn test_depth_exceeded() {
        let error = MachineError::DepthExceeded { depth: 6, max: 5 };
        let error_msg = format!("{}", error);
        assert!(error_msg.contains("max state depth exceeded"));
        assert!(error_msg.contains("limit of 5"));
    }

    #[test]
    fn test_failed_is_transparent() {
        let error = MachineError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(format!("{}", error), "disk on fire");
    }

    #[test]
    fn test_io_error_keeps_path() {
        use std::io;
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = GeneratorError::io("fsm/actions.rs", io_err);
        let error_msg = format!("{}", error);
        assert!(error_msg.contains("IO error"));
        assert!(error_msg.contains("fsm/actions.rs"));
        assert!(error_msg.contains("File not found"));
    }

    #[test]
    fn test_wrapping_into_top_level() {
        let error: VectorSigmaError = ParseError::MissingPlantUml.into();
        assert_eq!(format!("{}", error), "no plantuml found in markdown");
    }
}
