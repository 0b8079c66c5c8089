use crate::cli::DownArgs;
use crate::commands::build_environments;
use crate::config::PartialRunConfig;
use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rnaprep::exec::shutdown::{ShutdownBarrier, StopOutcome};
use std::time::Duration;
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(args: DownArgs) -> Result<()> {
    let config = PartialRunConfig::load(args.config.as_deref())?.resolve(
        args.shared_dir.clone(),
        args.grace_secs,
        &[],
    )?;

    let environments = build_environments(&config)?;
    info!(
        "Stopping environments '{}' and '{}'",
        config.annotation.container, config.analysis.container
    );

    let (mut barrier, handle_a, handle_b) = ShutdownBarrier::begin(&environments, config.grace);

    let pb = ProgressBar::new(100).with_style(
        ProgressStyle::with_template("{msg:<24} [{bar:40.cyan/blue}] {pos}%")
            .expect("Failed to create bar style template")
            .progress_chars("##-"),
    );
    pb.set_message("Stopping environments");

    // Dismissal stays blocked until both stop operations are terminal;
    // Ctrl-C before that is rejected, not honored.
    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                pb.set_position(barrier.combined_progress() as u64);
                if barrier.is_open() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                match barrier.try_dismiss() {
                    Ok(()) => break,
                    Err(blocked) => {
                        pb.println(format!(
                            "Teardown still in progress ({}%); dismissal blocked.",
                            blocked.progress
                        ));
                    }
                }
            }
        }
    }

    let outcomes = barrier.wait().await;
    pb.set_position(barrier.combined_progress() as u64);
    pb.finish_and_clear();

    for (name, outcome) in [
        (&config.annotation.container, outcomes[0]),
        (&config.analysis.container, outcomes[1]),
    ] {
        match outcome {
            StopOutcome::Succeeded => println!("  ✓ {name} stopped"),
            StopOutcome::Failed => println!("  ✗ {name} failed to stop"),
            StopOutcome::Cancelled => println!("  - {name} stop cancelled"),
        }
    }

    println!(
        "Closing in {}s...",
        config.grace.as_secs()
    );
    tokio::time::sleep(barrier.grace()).await;

    let _ = handle_a.await;
    let _ = handle_b.await;
    Ok(())
}
