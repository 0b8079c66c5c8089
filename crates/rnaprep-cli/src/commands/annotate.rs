use crate::cli::AnnotateArgs;
use crate::commands::build_environments;
use crate::config::PartialRunConfig;
use crate::error::Result;
use rnaprep::exec::environment::EnvSlot;
use rnaprep::workflows;
use tracing::info;

pub async fn run(args: AnnotateArgs) -> Result<()> {
    let config = PartialRunConfig::load(args.config.as_deref())?.resolve(
        args.shared_dir.clone(),
        None,
        &args.tools,
    )?;

    let environments = build_environments(&config)?;
    environments.get(EnvSlot::Annotation).ensure_running().await?;
    environments.get(EnvSlot::Analysis).ensure_running().await?;

    info!(
        "Dispatching {} tool kind(s) against {}",
        config.tools.len(),
        config.shared_dir.display()
    );
    let reports = workflows::annotate::run_tools(&environments, &config.tools).await;

    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    for job in &reports {
        match &job.result {
            Ok(()) => println!("  ✓ {}", job.kind),
            Err(e) => println!("  ✗ {}: {e}", job.kind),
        }
    }
    println!(
        "{} tool job(s) completed, {} failed.",
        reports.len() - failed,
        failed
    );

    Ok(())
}
