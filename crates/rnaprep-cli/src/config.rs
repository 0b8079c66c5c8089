use crate::error::{CliError, Result};
use rnaprep::exec::jobs::ToolKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_GRACE_SECS: u64 = 3;

/// One environment's image and container names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub image: String,
    pub container: String,
}

/// Fully-resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub shared_dir: PathBuf,
    pub grace: Duration,
    pub annotation: EnvConfig,
    pub analysis: EnvConfig,
    pub tools: Vec<ToolKind>,
}

/// What a TOML config file may provide; every field is optional and CLI
/// arguments win over file values.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    #[serde(rename = "shared-dir")]
    pub shared_dir: Option<PathBuf>,
    #[serde(rename = "grace-secs")]
    pub grace_secs: Option<u64>,
    #[serde(default)]
    pub environments: PartialEnvironments,
    #[serde(default)]
    pub tools: PartialTools,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialEnvironments {
    pub annotation: Option<PartialEnvConfig>,
    pub analysis: Option<PartialEnvConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialEnvConfig {
    pub image: Option<String>,
    pub container: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialTools {
    pub enabled: Option<Vec<String>>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read config file '{}': {e}", path.display()))
        })?;
        let parsed = toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("cannot parse config file '{}': {e}", path.display()))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(parsed)
    }

    /// Loads the file when given, otherwise starts from an empty config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Resolves the final configuration. CLI-provided values override the
    /// file; anything still missing falls back to defaults, except the
    /// shared directory, which must come from somewhere.
    pub fn resolve(
        self,
        cli_shared_dir: Option<PathBuf>,
        cli_grace_secs: Option<u64>,
        cli_tools: &[String],
    ) -> Result<RunConfig> {
        let shared_dir = cli_shared_dir
            .or(self.shared_dir)
            .ok_or_else(|| {
                CliError::Config(
                    "no shared directory given (use --shared-dir or set shared-dir in the config file)"
                        .to_string(),
                )
            })?;

        let grace_secs = cli_grace_secs
            .or(self.grace_secs)
            .unwrap_or(DEFAULT_GRACE_SECS);

        let tool_names: Option<Vec<String>> = if cli_tools.is_empty() {
            self.tools.enabled
        } else {
            Some(cli_tools.to_vec())
        };
        let tools = match tool_names {
            None => ToolKind::ALL.to_vec(),
            Some(names) => names
                .iter()
                .map(|name| {
                    name.parse::<ToolKind>()
                        .map_err(|e| CliError::Argument(e.to_string()))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let annotation = resolve_env(
            self.environments.annotation,
            "rnaprep-tools",
            "rnaprep-annotation",
        );
        let analysis = resolve_env(
            self.environments.analysis,
            "rnaprep-x3dna",
            "rnaprep-analysis",
        );

        Ok(RunConfig {
            shared_dir,
            grace: Duration::from_secs(grace_secs),
            annotation,
            analysis,
            tools,
        })
    }
}

fn resolve_env(
    partial: Option<PartialEnvConfig>,
    default_image: &str,
    default_container: &str,
) -> EnvConfig {
    let partial = partial.unwrap_or_default();
    EnvConfig {
        image: partial.image.unwrap_or_else(|| default_image.to_string()),
        container: partial
            .container
            .unwrap_or_else(|| default_container.to_string()),
    }
}
