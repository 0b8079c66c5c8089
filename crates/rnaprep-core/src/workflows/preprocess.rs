//! The preprocessing workflow: manifest in, staged per-chain RNA files out.
//!
//! Rows are processed sequentially; one row's failure is logged and never
//! aborts its siblings. Only configuration-level problems (no manifest,
//! unreadable input area) abort the run.

use crate::core::io::WrittenPair;
use crate::exec::environment::EnvSlot;
use crate::pipeline::context::RunContext;
use crate::pipeline::convert;
use crate::pipeline::error::{PipelineError, RowError};
use crate::pipeline::filter::{self, ChainFilterSpec};
use crate::pipeline::manifest::{self, ManifestRow, ManifestRowError};
use crate::pipeline::mapping;
use crate::pipeline::progress::{Progress, ProgressReporter};
use crate::pipeline::residual;
use crate::core::io::FileFormat;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Terminal state of one manifest row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// All matching chains written; zero matches is still `Written`.
    Written,
    /// A row-scoped error stopped this row. Terminal and isolated.
    Failed,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowState::Written => write!(f, "written"),
            RowState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug)]
pub struct RowReport {
    pub row: ManifestRow,
    pub state: RowState,
    pub outputs: Vec<WrittenPair>,
    pub error: Option<RowError>,
}

#[derive(Debug)]
pub struct RunReport {
    pub manifest_path: PathBuf,
    pub header_skipped: bool,
    pub dropped_rows: Vec<ManifestRowError>,
    pub rows: Vec<RowReport>,
    pub residual: Vec<PathBuf>,
}

impl RunReport {
    pub fn written_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.state == RowState::Written)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.state == RowState::Failed)
            .count()
    }
}

/// Runs the whole preprocessing pipeline over the shared area.
#[instrument(skip_all, name = "preprocess_workflow")]
pub async fn run(
    ctx: &RunContext<'_>,
    reporter: &ProgressReporter<'_>,
) -> Result<RunReport, PipelineError> {
    reporter.report(Progress::PhaseStart { name: "Manifest" });
    ctx.layout.prepare()?;

    let manifest_path = manifest::select_manifest(ctx.layout.root())?;
    info!("Using manifest {}", manifest_path.display());
    let content = fs::read_to_string(&manifest_path)?;
    let parsed = manifest::parse_manifest(&content);
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::RowsStart {
        total: parsed.rows.len() as u64,
    });
    let mut rows = Vec::with_capacity(parsed.rows.len());
    for row in parsed.rows {
        reporter.report(Progress::RowStart { id: row.id.clone() });
        let report = process_row(ctx, row).await;
        match (&report.state, &report.error) {
            (RowState::Failed, Some(e)) => error!("Row '{}' failed: {e}", report.row.id),
            _ => info!(
                "Row '{}' written ({} output file pair(s))",
                report.row.id,
                report.outputs.len()
            ),
        }
        reporter.report(Progress::RowFinish);
        rows.push(report);
    }
    reporter.report(Progress::RowsFinish);

    reporter.report(Progress::PhaseStart { name: "Residual import" });
    let manifest_ids: HashSet<String> = rows.iter().map(|r| r.row.id.clone()).collect();
    let residual = residual::import_residual(&ctx.layout, &manifest_ids)?;
    reporter.report(Progress::PhaseFinish);

    Ok(RunReport {
        manifest_path,
        header_skipped: parsed.header_skipped,
        dropped_rows: parsed.dropped,
        rows,
        residual,
    })
}

async fn process_row(ctx: &RunContext<'_>, row: ManifestRow) -> RowReport {
    match try_process_row(ctx, &row).await {
        Ok(outputs) => RowReport {
            row,
            state: RowState::Written,
            outputs,
            error: None,
        },
        Err(e) => RowReport {
            row,
            state: RowState::Failed,
            outputs: Vec::new(),
            error: Some(e),
        },
    }
}

/// Drives one row through its state machine:
/// resolve → (legacy: direct filter) | (modern: convert → map → bundled
/// filter) → write.
async fn try_process_row(
    ctx: &RunContext<'_>,
    row: &ManifestRow,
) -> Result<Vec<WrittenPair>, RowError> {
    let spec = ChainFilterSpec::parse(&row.chain_spec);
    let layout = &ctx.layout;

    let (handle, model) = crate::pipeline::resolver::resolve(layout, &row.id, ctx.fetcher).await?;

    let filtered = match handle.format {
        FileFormat::Legacy => filter::filter_direct(&model, &spec),
        FileFormat::Modern => {
            // The stores are long-lived caches keyed by structure id;
            // only convert when no normalized mapping exists yet.
            let chain_mapping = if mapping::exists(layout, &row.id) {
                info!("Reusing persisted chain mapping for '{}'", row.id);
                mapping::load(layout, &row.id).map_err(|source| RowError::Mapping {
                    id: row.id.clone(),
                    source,
                })?
            } else {
                let env = ctx.environments.get(EnvSlot::Annotation);
                let report_path = convert::split_structure(env, layout, &handle).await?;
                mapping::normalize(layout, &row.id, &report_path).map_err(|source| {
                    RowError::Mapping {
                        id: row.id.clone(),
                        source,
                    }
                })?
            };
            filter::filter_bundled(&layout.bundle_store(&row.id), &chain_mapping, &spec)?
        }
    };

    if filtered.is_empty() {
        warn!(
            "No chain of '{}' matched spec '{}' with the RNA predicate; zero outputs",
            row.id, row.chain_spec
        );
        return Ok(Vec::new());
    }

    let staging = layout.staging();
    let mut outputs = Vec::with_capacity(filtered.len());
    for structure in &filtered {
        outputs.push(filter::write_filtered(&staging, structure)?);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::environment::{
        CommandOutput, EnvError, EnvSlot, EnvironmentSet, ExecutionEnvironment,
    };
    use crate::pipeline::layout::RunLayout;
    use crate::pipeline::resolver::{FetchError, StructureFetcher};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::watch;

    const RNA_PDB: &str = "\
ATOM      1  P     G A   1      10.000  11.000  12.000  1.00  0.50           P
ATOM      2  P     U A   2      11.000  12.000  13.000  1.00  0.50           P
ATOM      3  P     C B   1      12.000  13.000  14.000  1.00  0.50           P
HETATM    4  O   HOH W   1      20.000  21.000  22.000  1.00  0.00           O
END
";

    struct NoFetcher;

    #[async_trait]
    impl StructureFetcher for NoFetcher {
        async fn fetch_by_id(&self, id: &str, _dest_dir: &Path) -> Result<PathBuf, FetchError> {
            Err(FetchError::NotFound { id: id.to_string() })
        }
    }

    /// Environment double standing in for the splitter container.
    ///
    /// On exec it writes the given bundles and report into the shared root
    /// and counts invocations.
    struct SplitterEnv {
        root: PathBuf,
        report: Option<(String, String)>,
        bundles: Vec<(String, String)>,
        execs: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionEnvironment for SplitterEnv {
        fn slot(&self) -> EnvSlot {
            EnvSlot::Annotation
        }

        fn name(&self) -> &str {
            "splitter"
        }

        async fn ensure_running(&self) -> Result<(), EnvError> {
            Ok(())
        }

        async fn exec(&self, _script: &str) -> Result<CommandOutput, EnvError> {
            self.execs.fetch_add(1, Ordering::SeqCst);
            if let Some((name, content)) = &self.report {
                fs::write(self.root.join(name), content).unwrap();
            }
            for (name, content) in &self.bundles {
                fs::write(self.root.join(name), content).unwrap();
            }
            Ok(CommandOutput::default())
        }

        async fn stop(&self, progress: watch::Sender<u8>) -> Result<(), EnvError> {
            let _ = progress.send(100);
            Ok(())
        }
    }

    fn idle_env_set(root: &Path) -> (EnvironmentSet, Arc<SplitterEnv>) {
        let splitter = Arc::new(SplitterEnv {
            root: root.to_path_buf(),
            report: None,
            bundles: Vec::new(),
            execs: AtomicUsize::new(0),
        });
        let analysis = Arc::new(SplitterEnv {
            root: root.to_path_buf(),
            report: None,
            bundles: Vec::new(),
            execs: AtomicUsize::new(0),
        });
        (EnvironmentSet::new(splitter.clone(), analysis), splitter)
    }

    fn write_inputs(root: &Path, manifest: &str, files: &[(&str, &str)]) {
        fs::write(root.join("manifest.csv"), manifest).unwrap();
        for (name, content) in files {
            fs::write(root.join(name), content).unwrap();
        }
    }

    fn output_names(report: &RunReport) -> Vec<String> {
        let mut names: Vec<String> = report
            .rows
            .iter()
            .flat_map(|r| r.outputs.iter())
            .flat_map(|pair| {
                [
                    pair.legacy_path
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                    pair.modern_path
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                ]
            })
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn legacy_rows_are_filtered_directly_into_staging() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n1abc,*\n", &[("1abc.pdb", RNA_PDB)]);
        let (envs, splitter) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(report.written_count(), 1);
        assert_eq!(
            output_names(&report),
            vec!["1abc_A.cif", "1abc_A.pdb", "1abc_B.cif", "1abc_B.pdb"]
        );
        // No conversion happened for a legacy source.
        assert_eq!(splitter.execs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_spec_restricts_the_emitted_chains() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n1abc,B\n", &[("1abc.pdb", RNA_PDB)]);
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(output_names(&report), vec!["1abc_B.cif", "1abc_B.pdb"]);
    }

    #[tokio::test]
    async fn one_bad_row_never_aborts_its_siblings() {
        let dir = tempdir().unwrap();
        let manifest = "pdb_id,chains\n1abc,*\nmissing,*\n2def,*\n3ghi,*\n4jkl,*\n";
        write_inputs(
            dir.path(),
            manifest,
            &[
                ("1abc.pdb", RNA_PDB),
                ("2def.pdb", RNA_PDB),
                ("3ghi.pdb", RNA_PDB),
                ("4jkl.pdb", RNA_PDB),
            ],
        );
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(report.rows.len(), 5);
        assert_eq!(report.written_count(), 4);
        assert_eq!(report.failed_count(), 1);
        let failed = report
            .rows
            .iter()
            .find(|r| r.state == RowState::Failed)
            .unwrap();
        assert_eq!(failed.row.id, "missing");
        assert!(matches!(failed.error, Some(RowError::Resolution { .. })));
    }

    #[tokio::test]
    async fn zero_matching_chains_is_written_with_no_outputs() {
        let dir = tempdir().unwrap();
        // Chain Z does not exist.
        write_inputs(dir.path(), "pdb_id,chains\n1abc,Z\n", &[("1abc.pdb", RNA_PDB)]);
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(report.written_count(), 1);
        assert!(report.rows[0].outputs.is_empty());
    }

    #[tokio::test]
    async fn rerunning_on_unchanged_input_yields_identical_output_paths() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n1abc,*\n", &[("1abc.pdb", RNA_PDB)]);
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let first = run(&ctx, &ProgressReporter::new()).await.unwrap();
        let second = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(output_names(&first), output_names(&second));
    }

    #[tokio::test]
    async fn residual_files_pass_through_unmodified() {
        let dir = tempdir().unwrap();
        write_inputs(
            dir.path(),
            "pdb_id,chains\n1abc,*\n",
            &[("1abc.pdb", RNA_PDB), ("orphan.pdb", "raw bytes, no parse\n")],
        );
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(report.residual.len(), 1);
        let copied = &report.residual[0];
        assert_eq!(copied.file_name().unwrap(), "orphan.pdb");
        assert_eq!(
            fs::read(copied).unwrap(),
            fs::read(dir.path().join("orphan.pdb")).unwrap()
        );
    }

    const BUNDLE_PDB: &str = "\
ATOM      1  P     G A   1      10.000  11.000  12.000  1.00  0.50           P
ATOM      2  P     U B   1      11.000  12.000  13.000  1.00  0.50           P
END
";

    /// A modern-format source whose serials overflow the legacy field.
    const BIG_CIF: &str = "\
data_9xyz
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.type_symbol
_atom_site.label_atom_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.label_seq_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
ATOM 100001 P P G A0 1 1.0 2.0 3.0
ATOM 100002 P P U B5 1 2.0 3.0 4.0
";

    fn splitter_env_set(root: &Path) -> (EnvironmentSet, Arc<SplitterEnv>) {
        let splitter = Arc::new(SplitterEnv {
            root: root.to_path_buf(),
            report: Some((
                "9xyz-chain-id-mapping.txt".into(),
                "    New chain ID    Original chain ID\n9xyz-bundle1.pdb:\n  A  A0\n  B  B5\n"
                    .into(),
            )),
            bundles: vec![("9xyz-bundle1.pdb".into(), BUNDLE_PDB.into())],
            execs: AtomicUsize::new(0),
        });
        let analysis = Arc::new(SplitterEnv {
            root: root.to_path_buf(),
            report: None,
            bundles: Vec::new(),
            execs: AtomicUsize::new(0),
        });
        (EnvironmentSet::new(splitter.clone(), analysis), splitter)
    }

    #[tokio::test]
    async fn modern_rows_go_through_convert_map_and_bundled_filter() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n9xyz,*\n", &[("9xyz.cif", BIG_CIF)]);
        let (envs, splitter) = splitter_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(report.written_count(), 1);
        // Bundled names carry both the original and the remapped id.
        assert_eq!(
            output_names(&report),
            vec![
                "9xyz_A0_A.cif",
                "9xyz_A0_A.pdb",
                "9xyz_B5_B.cif",
                "9xyz_B5_B.pdb"
            ]
        );
        assert_eq!(splitter.execs.load(Ordering::SeqCst), 1);
        // The raw report was consumed and the stores were populated.
        assert!(!dir.path().join("9xyz-chain-id-mapping.txt").exists());
        assert!(ctx.layout.mapping_table("9xyz").is_file());
        assert!(
            ctx.layout
                .bundle_store("9xyz")
                .join("9xyz-bundle1.pdb")
                .is_file()
        );
    }

    #[tokio::test]
    async fn persisted_mappings_skip_the_splitter_on_rerun() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n9xyz,*\n", &[("9xyz.cif", BIG_CIF)]);
        let (envs, splitter) = splitter_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        run(&ctx, &ProgressReporter::new()).await.unwrap();
        let second = run(&ctx, &ProgressReporter::new()).await.unwrap();

        assert_eq!(splitter.execs.load(Ordering::SeqCst), 1);
        assert_eq!(second.written_count(), 1);
    }

    #[tokio::test]
    async fn bundled_wildcard_round_trips_the_original_chain_ids() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path(), "pdb_id,chains\n9xyz,*\n", &[("9xyz.cif", BIG_CIF)]);
        let (envs, _) = splitter_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let report = run(&ctx, &ProgressReporter::new()).await.unwrap();

        let mapping = mapping::load(&ctx.layout, "9xyz").unwrap();
        let mut from_report: Vec<&str> = mapping
            .entries
            .iter()
            .map(|e| e.original_chain_id.as_str())
            .collect();
        from_report.sort_unstable();

        let mut emitted: Vec<String> = report.rows[0]
            .outputs
            .iter()
            .map(|pair| {
                let name = pair.legacy_path.file_stem().unwrap().to_string_lossy();
                // 9xyz_<orig>_<new>
                name.split('_').nth(1).unwrap().to_string()
            })
            .collect();
        emitted.sort();

        assert_eq!(from_report, emitted);
    }

    #[tokio::test]
    async fn missing_manifest_aborts_the_run() {
        let dir = tempdir().unwrap();
        let (envs, _) = idle_env_set(dir.path());
        let ctx = RunContext::new(RunLayout::new(dir.path()), &NoFetcher, &envs);

        let err = run(&ctx, &ProgressReporter::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingManifest { .. }));
    }
}
