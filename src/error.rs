use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced at the CLI boundary. Nothing inside the simulation
/// loop is recoverable; coherence violations panic instead.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to open trace file '{path}': {source}")]
    TraceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trace line {line_no} in '{path}': {line:?}")]
    TraceParse {
        path: PathBuf,
        line_no: usize,
        line: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
