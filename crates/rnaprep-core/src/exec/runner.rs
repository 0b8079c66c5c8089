use crate::exec::environment::{EnvError, EnvironmentSet};
use crate::exec::jobs::{ToolJobSpec, ToolKind};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A failure scoped to one tool job. Other kinds keep running.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("prerequisites for '{kind}' are missing: {detail}")]
    Prerequisites { kind: ToolKind, detail: String },

    #[error("'{kind}' exited with status {code}")]
    ExitStatus {
        kind: ToolKind,
        code: i64,
        stderr: String,
    },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Executes declarative tool jobs inside the run's environments.
///
/// The runner validates only that the working directory and binary exist;
/// it never interprets tool-specific output. Re-running a job against
/// unchanged staged inputs overwrites the same outputs.
pub struct ToolJobRunner<'a> {
    environments: &'a EnvironmentSet,
}

impl<'a> ToolJobRunner<'a> {
    pub fn new(environments: &'a EnvironmentSet) -> Self {
        Self { environments }
    }

    pub async fn run_kind(&self, kind: ToolKind) -> Result<(), JobError> {
        self.run_spec(&kind.spec()).await
    }

    pub async fn run_spec(&self, spec: &ToolJobSpec) -> Result<(), JobError> {
        let env = self.environments.get(spec.slot);

        let preflight = env.exec(&spec.render_preflight()).await?;
        if !preflight.success() {
            return Err(JobError::Prerequisites {
                kind: spec.kind,
                detail: format!(
                    "working directory '{}' or binary '{}' not found in environment '{}'",
                    spec.workdir,
                    spec.binary,
                    env.name()
                ),
            });
        }

        let script = spec.render_script();
        debug!("Dispatching '{}' job: {script}", spec.kind);
        let output = env.exec(&script).await?;

        if !output.success() {
            warn!(
                "'{}' job failed with status {}: {}",
                spec.kind,
                output.exit_code,
                output.stderr.trim()
            );
            return Err(JobError::ExitStatus {
                kind: spec.kind,
                code: output.exit_code,
                stderr: output.stderr,
            });
        }

        info!("'{}' job completed", spec.kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::environment::{
        CommandOutput, EnvSlot, EnvironmentSet, ExecutionEnvironment,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::sync::watch;

    /// Scripted environment: answers each exec with the next canned output.
    struct ScriptedEnv {
        slot: EnvSlot,
        outputs: Mutex<Vec<CommandOutput>>,
        executed: Mutex<Vec<String>>,
    }

    impl ScriptedEnv {
        fn new(slot: EnvSlot, outputs: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self {
                slot,
                outputs: Mutex::new(outputs),
                executed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExecutionEnvironment for ScriptedEnv {
        fn slot(&self) -> EnvSlot {
            self.slot
        }

        fn name(&self) -> &str {
            "scripted"
        }

        async fn ensure_running(&self) -> Result<(), EnvError> {
            Ok(())
        }

        async fn exec(&self, script: &str) -> Result<CommandOutput, EnvError> {
            self.executed.lock().unwrap().push(script.to_string());
            let mut outputs = self.outputs.lock().unwrap();
            Ok(if outputs.is_empty() {
                CommandOutput::default()
            } else {
                outputs.remove(0)
            })
        }

        async fn stop(&self, progress: watch::Sender<u8>) -> Result<(), EnvError> {
            let _ = progress.send(100);
            Ok(())
        }
    }

    fn ok_output() -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            ..Default::default()
        }
    }

    fn failing_output(code: i64) -> CommandOutput {
        CommandOutput {
            exit_code: code,
            stderr: "boom".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn preflight_runs_before_the_job_script() {
        let annotation = ScriptedEnv::new(EnvSlot::Annotation, vec![ok_output(), ok_output()]);
        let analysis = ScriptedEnv::new(EnvSlot::Analysis, vec![]);
        let set = EnvironmentSet::new(annotation.clone(), analysis);

        ToolJobRunner::new(&set)
            .run_kind(ToolKind::RnaView)
            .await
            .unwrap();

        let executed = annotation.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].contains("command -v ./rnaview"));
        assert!(executed[1].contains("for file in /data/staging/*.pdb"));
    }

    #[tokio::test]
    async fn missing_prerequisites_block_the_dispatch() {
        let annotation = ScriptedEnv::new(EnvSlot::Annotation, vec![failing_output(1)]);
        let analysis = ScriptedEnv::new(EnvSlot::Analysis, vec![]);
        let set = EnvironmentSet::new(annotation.clone(), analysis);

        let err = ToolJobRunner::new(&set)
            .run_kind(ToolKind::Bpnet)
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Prerequisites { kind: ToolKind::Bpnet, .. }));
        // The job script itself never ran.
        assert_eq!(annotation.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_as_a_job_error() {
        let analysis = ScriptedEnv::new(EnvSlot::Analysis, vec![ok_output(), failing_output(3)]);
        let annotation = ScriptedEnv::new(EnvSlot::Annotation, vec![]);
        let set = EnvironmentSet::new(annotation, analysis);

        let err = ToolJobRunner::new(&set)
            .run_kind(ToolKind::X3dna)
            .await
            .unwrap_err();

        match err {
            JobError::ExitStatus { kind, code, stderr } => {
                assert_eq!(kind, ToolKind::X3dna);
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
