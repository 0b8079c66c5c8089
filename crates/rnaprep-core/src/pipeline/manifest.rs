use crate::pipeline::error::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// One manifest entry: a structure id and the chain selection for it.
///
/// Rows are immutable once parsed. `chain_spec` is either `"*"` or a
/// `;`-separated set of chain identifiers; interpretation happens in the
/// filter, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub id: String,
    pub chain_spec: String,
}

/// A line that could not become a [`ManifestRow`]. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRowError {
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct ParsedManifest {
    pub rows: Vec<ManifestRow>,
    pub dropped: Vec<ManifestRowError>,
    pub header_skipped: bool,
}

/// Substrings that mark the first non-blank line as a column header.
///
/// This heuristic can misclassify a legitimate first data row whose id
/// happens to contain one of these words; that ambiguity is inherited
/// behavior and deliberately left in place.
const HEADER_HINTS: [&str; 3] = ["pdb", "path", "chain"];

fn looks_like_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Picks the single manifest for a run from the shared-area root.
///
/// Exactly one `*.csv` is used per run. When several candidates exist the
/// lexicographically first filename wins and a non-fatal warning is logged;
/// no manifest at all aborts the run.
pub fn select_manifest(dir: &Path) -> Result<PathBuf, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::InputAreaUnreadable {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();

    candidates.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    match candidates.first() {
        None => Err(PipelineError::MissingManifest {
            dir: dir.to_path_buf(),
        }),
        Some(first) => {
            if candidates.len() > 1 {
                warn!(
                    "Multiple manifest files found in {}; using the first: {}",
                    dir.display(),
                    first.display()
                );
            }
            Ok(first.clone())
        }
    }
}

/// Parses manifest text into ordered rows.
///
/// Blank lines are skipped. The first non-blank line is discarded when it
/// looks like a header. Lines are split on commas with no quoting support
/// (values containing a comma are not representable). Rows with fewer than
/// two columns are dropped with a logged error and parsing continues.
pub fn parse_manifest(content: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut header_checked = false;

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        if !header_checked {
            header_checked = true;
            if looks_like_header(line) {
                parsed.header_skipped = true;
                continue;
            }
        }

        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 2 {
            error!("Skipping manifest row {line_num} (needs at least 2 columns): {line}");
            parsed.dropped.push(ManifestRowError {
                line: line_num,
                content: line.to_string(),
            });
            continue;
        }

        parsed.rows.push(ManifestRow {
            id: cols[0].trim().to_string(),
            chain_spec: cols[1].trim().to_string(),
        });
    }

    parsed
}
