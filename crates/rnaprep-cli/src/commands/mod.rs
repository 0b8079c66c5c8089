pub mod annotate;
pub mod down;
pub mod run;

use crate::config::RunConfig;
use crate::error::Result;
use rnaprep::exec::docker::DockerEnvironment;
use rnaprep::exec::environment::{EnvSlot, EnvironmentSet};
use std::sync::Arc;

/// Connects both Docker environments for the configured run area.
pub(crate) fn build_environments(config: &RunConfig) -> Result<EnvironmentSet> {
    let annotation = DockerEnvironment::connect(
        EnvSlot::Annotation,
        &config.annotation.image,
        &config.annotation.container,
        &config.shared_dir,
    )?;
    let analysis = DockerEnvironment::connect(
        EnvSlot::Analysis,
        &config.analysis.image,
        &config.analysis.container,
        &config.shared_dir,
    )?;
    Ok(EnvironmentSet::new(Arc::new(annotation), Arc::new(analysis)))
}
