//! Bundle Converter boundary.
//!
//! Oversized modern-format structures are split into legacy-compatible
//! bundles by an external tool running inside the annotation environment.
//! This module only orchestrates the invocation and collects the raw
//! report path; interpreting the report belongs to the mapping normalizer.

use crate::exec::environment::{CONTAINER_DATA_DIR, ExecutionEnvironment};
use crate::pipeline::error::RowError;
use crate::pipeline::layout::RunLayout;
use crate::pipeline::resolver::StructureHandle;
use std::path::PathBuf;
use tracing::{debug, info};

/// The in-container splitter binary.
const SPLITTER_BIN: &str = "BeEM";

/// Suffix of the raw chain-remapping report the splitter emits.
const REPORT_SUFFIX: &str = "-chain-id-mapping.txt";

/// Runs the splitter against a modern-format structure file.
///
/// The tool works in the shared-area root and emits, next to its input,
/// zero or more bundle files plus exactly one raw mapping report. Returns
/// the host-side path of that report.
pub async fn split_structure(
    env: &dyn ExecutionEnvironment,
    layout: &RunLayout,
    handle: &StructureHandle,
) -> Result<PathBuf, RowError> {
    let file_name = handle
        .local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RowError::Conversion {
            id: handle.id.clone(),
            reason: format!("structure path '{}' has no file name", handle.local_path.display()),
        })?;

    let script = format!(
        r#"cd {data} && {bin} "{file}""#,
        data = CONTAINER_DATA_DIR,
        bin = SPLITTER_BIN,
        file = file_name,
    );
    debug!("Splitting '{}' with: {script}", handle.id);

    let output = env
        .exec(&script)
        .await
        .map_err(|e| RowError::Conversion {
            id: handle.id.clone(),
            reason: e.to_string(),
        })?;

    if !output.success() {
        return Err(RowError::Conversion {
            id: handle.id.clone(),
            reason: format!(
                "splitter exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    let report_path = layout
        .root()
        .join(format!("{}{}", handle.id, REPORT_SUFFIX));
    if !report_path.is_file() {
        return Err(RowError::Conversion {
            id: handle.id.clone(),
            reason: format!(
                "splitter finished but left no report at {}",
                report_path.display()
            ),
        });
    }

    info!("Split '{}' ; report at {}", handle.id, report_path.display());
    Ok(report_path)
}
