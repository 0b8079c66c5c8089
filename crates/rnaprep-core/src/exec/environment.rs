use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Path the shared run area is bound to inside every environment.
pub const CONTAINER_DATA_DIR: &str = "/data";

/// The two execution environments a run owns.
///
/// `Annotation` hosts the bundle splitter and the Python-based annotation
/// tools; `Analysis` hosts the compiled analysis suite. Exactly two slots
/// exist, which is what gives the shutdown barrier its two stop operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvSlot {
    Annotation,
    Analysis,
}

impl EnvSlot {
    pub const ALL: [EnvSlot; 2] = [EnvSlot::Annotation, EnvSlot::Analysis];

    pub fn name(&self) -> &'static str {
        match self {
            EnvSlot::Annotation => "annotation",
            EnvSlot::Analysis => "analysis",
        }
    }
}

/// Captured result of one in-environment command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("environment '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("command execution failed in '{name}': {reason}")]
    Exec { name: String, reason: String },

    #[error("failed to stop environment '{name}': {reason}")]
    Stop { name: String, reason: String },
}

/// An isolated execution environment bound to the shared run directory.
///
/// The contract is deliberately narrow: run a command, observe exit status
/// and captured output, stop the environment. No other IPC exists.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    fn slot(&self) -> EnvSlot;

    /// Human-readable name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Brings the environment up (idempotent) and waits until it accepts
    /// commands.
    async fn ensure_running(&self) -> Result<(), EnvError>;

    /// Runs a shell script inside the environment and captures its output.
    async fn exec(&self, script: &str) -> Result<CommandOutput, EnvError>;

    /// Stops the environment, reporting coarse progress (0–100) through
    /// `progress` as the operation advances.
    async fn stop(&self, progress: watch::Sender<u8>) -> Result<(), EnvError>;
}

/// The pair of environments owned by one run, addressed by slot.
#[derive(Clone)]
pub struct EnvironmentSet {
    annotation: Arc<dyn ExecutionEnvironment>,
    analysis: Arc<dyn ExecutionEnvironment>,
}

impl EnvironmentSet {
    pub fn new(
        annotation: Arc<dyn ExecutionEnvironment>,
        analysis: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self {
            annotation,
            analysis,
        }
    }

    pub fn get(&self, slot: EnvSlot) -> &dyn ExecutionEnvironment {
        match slot {
            EnvSlot::Annotation => self.annotation.as_ref(),
            EnvSlot::Analysis => self.analysis.as_ref(),
        }
    }

    pub fn pair(&self) -> (Arc<dyn ExecutionEnvironment>, Arc<dyn ExecutionEnvironment>) {
        (self.annotation.clone(), self.analysis.clone())
    }
}
