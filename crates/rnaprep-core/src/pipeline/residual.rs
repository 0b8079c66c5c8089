use crate::core::io::FileFormat;
use crate::pipeline::error::PipelineError;
use crate::pipeline::layout::RunLayout;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Copies unreferenced input structure files into the staging area.
///
/// Every structure file whose base name is not a manifest id passes
/// through unmodified; such files are assumed to be single-purpose
/// already, so no chain or RNA filtering applies.
pub fn import_residual(
    layout: &RunLayout,
    manifest_ids: &HashSet<String>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let staging = layout.staging();
    let mut copied = Vec::new();

    let entries =
        fs::read_dir(layout.root()).map_err(|source| PipelineError::InputAreaUnreadable {
            dir: layout.root().to_path_buf(),
            source,
        })?;

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_structure = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension)
            .is_some();
        if !is_structure {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if manifest_ids.contains(&stem) {
            debug!("Skipping '{}': referenced by the manifest", path.display());
            continue;
        }

        let dest = staging.join(path.file_name().unwrap_or_default());
        fs::copy(&path, &dest)?;
        debug!("Imported residual file {}", dest.display());
        copied.push(dest);
    }

    info!("Residual import copied {} file(s)", copied.len());
    Ok(copied)
}
