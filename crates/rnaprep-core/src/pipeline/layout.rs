use crate::pipeline::error::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory contract of one shared run area.
///
/// The root doubles as the input area; everything the pipeline produces
/// lands in the fixed subdirectories below it. The same root is
/// bind-mounted into the execution environments, so relative placement is
/// part of the contract with the external tools.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub const STAGING_DIR: &'static str = "staging";
    pub const MAPPINGS_DIR: &'static str = "mappings";
    pub const BUNDLES_DIR: &'static str = "bundles";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The shared-area root; input structure files live directly here.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where filtered and passed-through structure files are staged.
    pub fn staging(&self) -> PathBuf {
        self.root.join(Self::STAGING_DIR)
    }

    /// The normalized chain-mapping store.
    pub fn mappings(&self) -> PathBuf {
        self.root.join(Self::MAPPINGS_DIR)
    }

    /// The bundle-file store.
    pub fn bundles(&self) -> PathBuf {
        self.root.join(Self::BUNDLES_DIR)
    }

    /// Normalized mapping table for one structure id.
    pub fn mapping_table(&self, structure_id: &str) -> PathBuf {
        self.mappings().join(format!("{structure_id}.csv"))
    }

    /// Bundle directory for one structure id.
    pub fn bundle_store(&self, structure_id: &str) -> PathBuf {
        self.bundles().join(structure_id)
    }

    /// Output folder for one tool kind, e.g. `rnaview-output`.
    pub fn tool_output(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Creates the run directories and verifies the input area is readable.
    pub fn prepare(&self) -> Result<(), PipelineError> {
        fs::read_dir(&self.root).map_err(|source| PipelineError::InputAreaUnreadable {
            dir: self.root.clone(),
            source,
        })?;
        for dir in [self.staging(), self.mappings(), self.bundles()] {
            fs::create_dir_all(&dir).map_err(PipelineError::Layout)?;
        }
        Ok(())
    }
}
