use crate::pipeline::layout::RunLayout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// One `(bundleFile, newChainId, originalChainId)` triple.
///
/// Serialized as one row of the normalized table, whose header is
/// `File,New_chain_ID,Original_chain_ID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "File")]
    pub bundle_file: String,
    #[serde(rename = "New_chain_ID")]
    pub new_chain_id: String,
    #[serde(rename = "Original_chain_ID")]
    pub original_chain_id: String,
}

/// The normalized chain remapping of one split structure.
///
/// Recovered from the splitter's raw report; once persisted it is the only
/// way back from bundle-local chain ids to the ids of the original
/// modern-format file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMapping {
    pub structure_id: String,
    pub entries: Vec<MappingEntry>,
}

impl ChainMapping {
    /// Entries whose original chain id passes `keep`.
    pub fn restrict<'a>(&'a self, keep: impl Fn(&str) -> bool) -> Vec<&'a MappingEntry> {
        self.entries
            .iter()
            .filter(|e| keep(&e.original_chain_id))
            .collect()
    }

    /// Groups entries by bundle file, preserving a deterministic order.
    pub fn group_by_bundle<'a>(
        entries: &[&'a MappingEntry],
    ) -> BTreeMap<&'a str, Vec<&'a MappingEntry>> {
        let mut groups: BTreeMap<&str, Vec<&MappingEntry>> = BTreeMap::new();
        for entry in entries {
            groups.entry(&entry.bundle_file).or_default().push(entry);
        }
        groups
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("table error: {0}")]
    Table(#[from] csv::Error),

    #[error("report line {line}: chain-id pair outside any bundle section")]
    OrphanPair { line: usize },

    #[error("bundle section '{bundle}' has an odd number of chain-id tokens")]
    UnpairedToken { bundle: String },

    #[error("report contains no bundle sections")]
    NoSections,

    #[error("referenced bundle file '{file}' not found next to the report")]
    MissingBundle { file: String },

    #[error("no normalized mapping found for '{structure_id}'")]
    NotFound { structure_id: String },
}

/// Parses a raw chain-remapping report.
///
/// Grammar: a line `<bundleFilename>:` opens a section; every following
/// whitespace-separated token pair is `<newChainId> <originalChainId>` until
/// the next section header or end of input. Blank lines are skipped, and a
/// single leading column-title line (it mentions "chain" and is not a
/// section header) is ignored.
pub fn parse_report(content: &str) -> Result<Vec<MappingEntry>, MappingError> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    let mut seen_content = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(bundle) = line.strip_suffix(':') {
            sections.push((bundle.trim().to_string(), Vec::new()));
            seen_content = true;
            continue;
        }

        if !seen_content && line.to_lowercase().contains("chain") {
            // The report's own column titles.
            seen_content = true;
            continue;
        }
        seen_content = true;

        match sections.last_mut() {
            Some((_, tokens)) => {
                tokens.extend(line.split_whitespace().map(str::to_string));
            }
            None => return Err(MappingError::OrphanPair { line: idx + 1 }),
        }
    }

    if sections.is_empty() {
        return Err(MappingError::NoSections);
    }

    let mut entries = Vec::new();
    for (bundle, tokens) in sections {
        if tokens.len() % 2 != 0 {
            return Err(MappingError::UnpairedToken { bundle });
        }
        for pair in tokens.chunks(2) {
            entries.push(MappingEntry {
                bundle_file: bundle.clone(),
                new_chain_id: pair[0].clone(),
                original_chain_id: pair[1].clone(),
            });
        }
    }
    Ok(entries)
}

/// Normalizes a raw report and relocates it into the run's stores.
///
/// All-or-nothing per structure id: every referenced bundle file is
/// verified up front, the table is staged under a temporary name, and the
/// commit order (bundles, then table, then raw-report deletion) is rolled
/// back on failure, so the filter never observes a half-written mapping.
pub fn normalize(
    layout: &RunLayout,
    structure_id: &str,
    report_path: &Path,
) -> Result<ChainMapping, MappingError> {
    let content = fs::read_to_string(report_path)?;
    let entries = parse_report(&content)?;

    let report_dir = report_path.parent().unwrap_or_else(|| Path::new("."));
    let mut bundle_files: Vec<&str> = entries.iter().map(|e| e.bundle_file.as_str()).collect();
    bundle_files.sort_unstable();
    bundle_files.dedup();

    for file in &bundle_files {
        if !report_dir.join(file).is_file() {
            return Err(MappingError::MissingBundle {
                file: (*file).to_string(),
            });
        }
    }

    // Stage the normalized table next to its final location.
    let table_path = layout.mapping_table(structure_id);
    let tmp_path = table_path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for entry in &entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
    }

    // Commit: move bundles into a fresh per-id store, rolling back on error.
    let store = layout.bundle_store(structure_id);
    if store.exists() {
        fs::remove_dir_all(&store)?;
    }
    fs::create_dir_all(&store)?;

    let mut moved: Vec<&str> = Vec::new();
    for file in &bundle_files {
        match fs::rename(report_dir.join(file), store.join(file)) {
            Ok(()) => moved.push(file),
            Err(e) => {
                for done in moved {
                    let _ = fs::rename(store.join(done), report_dir.join(done));
                }
                let _ = fs::remove_dir_all(&store);
                let _ = fs::remove_file(&tmp_path);
                return Err(MappingError::Io(e));
            }
        }
    }

    if let Err(e) = fs::rename(&tmp_path, &table_path) {
        for done in &bundle_files {
            let _ = fs::rename(store.join(done), report_dir.join(done));
        }
        let _ = fs::remove_dir_all(&store);
        let _ = fs::remove_file(&tmp_path);
        return Err(MappingError::Io(e));
    }

    fs::remove_file(report_path)?;
    info!(
        "Normalized chain mapping for '{}': {} entr{} across {} bundle(s)",
        structure_id,
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        bundle_files.len()
    );

    Ok(ChainMapping {
        structure_id: structure_id.to_string(),
        entries,
    })
}

/// True when a normalized mapping for this id is already persisted.
pub fn exists(layout: &RunLayout, structure_id: &str) -> bool {
    layout.mapping_table(structure_id).is_file()
}

/// Loads the persisted mapping for a structure id.
pub fn load(layout: &RunLayout, structure_id: &str) -> Result<ChainMapping, MappingError> {
    let table_path = layout.mapping_table(structure_id);
    if !table_path.is_file() {
        return Err(MappingError::NotFound {
            structure_id: structure_id.to_string(),
        });
    }

    let mut reader = csv::Reader::from_path(&table_path)?;
    let mut entries = Vec::new();
    for record in reader.deserialize() {
        entries.push(record?);
    }
    debug!(
        "Loaded chain mapping for '{}' ({} entries)",
        structure_id,
        entries.len()
    );

    Ok(ChainMapping {
        structure_id: structure_id.to_string(),
        entries,
    })
}
