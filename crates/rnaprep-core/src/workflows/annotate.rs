//! Tool dispatch workflow: runs the enabled annotation tools against the
//! staged output area. A failing job is reported and never blocks the
//! remaining kinds.

use crate::exec::environment::EnvironmentSet;
use crate::exec::jobs::ToolKind;
use crate::exec::runner::{JobError, ToolJobRunner};
use tracing::{error, info, instrument};

#[derive(Debug)]
pub struct JobReport {
    pub kind: ToolKind,
    pub result: Result<(), JobError>,
}

/// Dispatches the given tool kinds, in order, against the staged files.
#[instrument(skip_all, name = "annotate_workflow")]
pub async fn run_tools(environments: &EnvironmentSet, kinds: &[ToolKind]) -> Vec<JobReport> {
    let runner = ToolJobRunner::new(environments);
    let mut reports = Vec::with_capacity(kinds.len());

    for &kind in kinds {
        info!("Dispatching '{kind}'");
        let result = runner.run_kind(kind).await;
        if let Err(e) = &result {
            error!("Tool job '{kind}' failed: {e}");
        }
        reports.push(JobReport { kind, result });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::environment::{
        CommandOutput, EnvError, EnvSlot, ExecutionEnvironment,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    /// Environment whose first N execs fail, then succeed.
    struct FlakyEnv {
        slot: EnvSlot,
        fail_first: usize,
        execs: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionEnvironment for FlakyEnv {
        fn slot(&self) -> EnvSlot {
            self.slot
        }

        fn name(&self) -> &str {
            "flaky"
        }

        async fn ensure_running(&self) -> Result<(), EnvError> {
            Ok(())
        }

        async fn exec(&self, _script: &str) -> Result<CommandOutput, EnvError> {
            let n = self.execs.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                exit_code: if n < self.fail_first { 1 } else { 0 },
                ..Default::default()
            })
        }

        async fn stop(&self, progress: watch::Sender<u8>) -> Result<(), EnvError> {
            let _ = progress.send(100);
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_failing_kind_does_not_block_the_rest() {
        // The first exec (rnaview's preflight) fails; everything after
        // succeeds.
        let annotation = Arc::new(FlakyEnv {
            slot: EnvSlot::Annotation,
            fail_first: 1,
            execs: AtomicUsize::new(0),
        });
        let analysis = Arc::new(FlakyEnv {
            slot: EnvSlot::Analysis,
            fail_first: 0,
            execs: AtomicUsize::new(0),
        });
        let set = EnvironmentSet::new(annotation, analysis);

        let reports = run_tools(&set, &[ToolKind::RnaView, ToolKind::X3dna]).await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(
            reports[0].result,
            Err(JobError::Prerequisites { .. })
        ));
        assert!(reports[1].result.is_ok());
    }

    #[tokio::test]
    async fn all_kinds_run_in_the_requested_order() {
        let annotation = Arc::new(FlakyEnv {
            slot: EnvSlot::Annotation,
            fail_first: 0,
            execs: AtomicUsize::new(0),
        });
        let analysis = Arc::new(FlakyEnv {
            slot: EnvSlot::Analysis,
            fail_first: 0,
            execs: AtomicUsize::new(0),
        });
        let set = EnvironmentSet::new(annotation, analysis);

        let reports = run_tools(&set, &ToolKind::ALL).await;

        let kinds: Vec<ToolKind> = reports.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, ToolKind::ALL);
        assert!(reports.iter().all(|r| r.result.is_ok()));
    }
}
