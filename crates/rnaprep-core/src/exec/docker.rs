//! Docker-backed execution environments.
//!
//! Container lifecycle and in-container execution over bollard: image
//! presence is checked up front, stale same-named containers are replaced,
//! and commands run through attached exec instances so stdout/stderr land
//! in the captured output.

use crate::exec::environment::{
    CONTAINER_DATA_DIR, CommandOutput, EnvError, EnvSlot, ExecutionEnvironment,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    InspectContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::CreateContainerOptions;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Grace period handed to `docker stop` before the daemon escalates.
const STOP_TIMEOUT_SECS: i64 = 10;
/// How long to wait for a started container to reach the running state.
const START_TIMEOUT: Duration = Duration::from_secs(30);
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DockerEnvironment {
    docker: Docker,
    slot: EnvSlot,
    image: String,
    container_name: String,
    shared_dir: PathBuf,
}

impl DockerEnvironment {
    pub fn connect(
        slot: EnvSlot,
        image: &str,
        container_name: &str,
        shared_dir: &Path,
    ) -> Result<Self, EnvError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| EnvError::Unavailable {
                name: container_name.to_string(),
                reason: format!("failed to connect to Docker daemon: {e}"),
            })?;
        Ok(Self {
            docker,
            slot,
            image: image.to_string(),
            container_name: container_name.to_string(),
            shared_dir: shared_dir.to_path_buf(),
        })
    }

    fn unavailable(&self, reason: impl ToString) -> EnvError {
        EnvError::Unavailable {
            name: self.container_name.clone(),
            reason: reason.to_string(),
        }
    }

    fn exec_err(&self, reason: impl ToString) -> EnvError {
        EnvError::Exec {
            name: self.container_name.clone(),
            reason: reason.to_string(),
        }
    }

    async fn is_running(&self) -> bool {
        match self
            .docker
            .inspect_container(&self.container_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|s| s.running)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn remove_stale_container(&self) {
        let result = self
            .docker
            .remove_container(
                &self.container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;
        if result.is_ok() {
            debug!("Removed stale container '{}'", self.container_name);
        }
    }
}

#[async_trait]
impl ExecutionEnvironment for DockerEnvironment {
    fn slot(&self) -> EnvSlot {
        self.slot
    }

    fn name(&self) -> &str {
        &self.container_name
    }

    async fn ensure_running(&self) -> Result<(), EnvError> {
        if self.is_running().await {
            debug!("Container '{}' already running", self.container_name);
            return Ok(());
        }

        self.docker
            .inspect_image(&self.image)
            .await
            .map_err(|e| self.unavailable(format!("image '{}' not found: {e}", self.image)))?;

        self.remove_stale_container().await;

        let bind = format!("{}:{}", self.shared_dir.display(), CONTAINER_DATA_DIR);
        let config = ContainerCreateBody {
            image: Some(self.image.clone()),
            host_config: Some(HostConfig {
                binds: Some(vec![bind]),
                ..Default::default()
            }),
            // Keep the container alive; work arrives via exec.
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            tty: Some(false),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(self.container_name.clone()),
                    platform: String::new(),
                }),
                config,
            )
            .await
            .map_err(|e| self.unavailable(format!("failed to create container: {e}")))?;

        self.docker
            .start_container(
                &self.container_name,
                None::<StartContainerOptions<String>>,
            )
            .await
            .map_err(|e| self.unavailable(format!("failed to start container: {e}")))?;

        let started = Instant::now();
        loop {
            if self.is_running().await {
                info!(
                    "Container '{}' ({} slot) is running",
                    self.container_name,
                    self.slot.name()
                );
                return Ok(());
            }
            if started.elapsed() > START_TIMEOUT {
                return Err(self.unavailable(format!(
                    "container did not reach running state within {START_TIMEOUT:?}"
                )));
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
    }

    async fn exec(&self, script: &str) -> Result<CommandOutput, EnvError> {
        debug!("exec in '{}': {}", self.container_name, script);

        let exec = self
            .docker
            .create_exec(
                &self.container_name,
                CreateExecOptions {
                    cmd: Some(vec!["bash", "-c", script]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| self.exec_err(format!("failed to create exec: {e}")))?;

        let start = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| self.exec_err(format!("failed to start exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } = start {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(self.exec_err(format!("output stream failed: {e}")));
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| self.exec_err(format!("failed to inspect exec: {e}")))?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn stop(&self, progress: watch::Sender<u8>) -> Result<(), EnvError> {
        info!("Stopping container '{}'", self.container_name);
        let _ = progress.send(10);

        let stop_result = self
            .docker
            .stop_container(
                &self.container_name,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await;
        let _ = progress.send(80);

        if let Err(e) = stop_result {
            // The container may already be gone; verify before failing.
            if self.is_running().await {
                return Err(EnvError::Stop {
                    name: self.container_name.clone(),
                    reason: e.to_string(),
                });
            }
            warn!(
                "Stop of '{}' reported '{}' but the container is not running",
                self.container_name, e
            );
        }

        let _ = progress.send(100);
        info!("Container '{}' stopped", self.container_name);
        Ok(())
    }
}
