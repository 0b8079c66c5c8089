use crate::core::io::CodecError;
use crate::pipeline::mapping::MappingError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A failure scoped to a single manifest row.
///
/// Row errors are logged and reported; they never abort sibling rows.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("structure '{id}' could not be resolved: {reason}")]
    Resolution { id: String, reason: String },

    #[error("bundle conversion failed for '{id}': {reason}")]
    Conversion { id: String, reason: String },

    #[error("chain mapping for '{id}' could not be normalized: {source}")]
    Mapping {
        id: String,
        #[source]
        source: MappingError,
    },

    #[error("failed to load structure '{id}' from {path}: {source}", path = path.display())]
    Load {
        id: String,
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("failed to write filtered output for '{id}': {source}")]
    Write {
        id: String,
        #[source]
        source: CodecError,
    },
}

impl RowError {
    /// The structure id the failing row referred to.
    pub fn structure_id(&self) -> &str {
        match self {
            RowError::Resolution { id, .. }
            | RowError::Conversion { id, .. }
            | RowError::Mapping { id, .. }
            | RowError::Load { id, .. }
            | RowError::Write { id, .. } => id,
        }
    }
}

/// A failure that aborts the whole run.
///
/// Only configuration-level problems qualify; everything else is a
/// [`RowError`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no manifest file found in {dir}", dir = dir.display())]
    MissingManifest { dir: PathBuf },

    #[error("input area {dir} is not readable: {source}", dir = dir.display())]
    InputAreaUnreadable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare run directories: {0}")]
    Layout(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
