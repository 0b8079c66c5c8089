use crate::cli::RunArgs;
use crate::commands::build_environments;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::progress::CliProgressHandler;
use rnaprep::exec::environment::EnvSlot;
use rnaprep::pipeline::context::RunContext;
use rnaprep::pipeline::layout::RunLayout;
use rnaprep::pipeline::progress::ProgressReporter;
use rnaprep::pipeline::resolver::RcsbFetcher;
use rnaprep::workflows;
use tracing::{info, warn};

pub async fn run(args: RunArgs) -> Result<()> {
    let config = PartialRunConfig::load(args.config.as_deref())?.resolve(
        args.shared_dir.clone(),
        None,
        &[],
    )?;
    info!("Preprocessing shared area {}", config.shared_dir.display());

    let environments = build_environments(&config)?;
    if args.no_environments {
        warn!("--no-environments given; bundle conversion will fail for modern-format rows");
    } else {
        environments.get(EnvSlot::Annotation).ensure_running().await?;
        environments.get(EnvSlot::Analysis).ensure_running().await?;
    }

    let fetcher = RcsbFetcher::new();
    let ctx = RunContext::new(
        RunLayout::new(&config.shared_dir),
        &fetcher,
        &environments,
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting preprocessing...");
    let report = workflows::preprocess::run(&ctx, &reporter).await?;

    println!(
        "Processed {} manifest row(s): {} written, {} failed.",
        report.rows.len(),
        report.written_count(),
        report.failed_count()
    );
    if !report.dropped_rows.is_empty() {
        println!(
            "  {} malformed manifest row(s) were skipped.",
            report.dropped_rows.len()
        );
    }
    for row in report.rows.iter().filter(|r| r.error.is_some()) {
        println!(
            "  ✗ {}: {}",
            row.row.id,
            row.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
        );
    }
    println!(
        "Residual import copied {} unreferenced file(s) into staging.",
        report.residual.len()
    );

    if args.with_tools {
        println!("Dispatching annotation tools...");
        let job_reports = workflows::annotate::run_tools(&environments, &config.tools).await;
        for job in &job_reports {
            match &job.result {
                Ok(()) => println!("  ✓ {}", job.kind),
                Err(e) => println!("  ✗ {}: {e}", job.kind),
            }
        }
    }

    Ok(())
}
