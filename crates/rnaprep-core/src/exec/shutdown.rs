//! Teardown coordination for the two execution environments.
//!
//! Both "stop environment" operations run in parallel; a shared gate stays
//! closed until each has reported a terminal state. Combined progress is
//! the clamped arithmetic mean of the two individual progress signals.

use crate::exec::environment::{EnvironmentSet, ExecutionEnvironment};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Terminal state of one stop operation.
///
/// Cancellation is terminal for barrier purposes but does not imply the
/// environment actually stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl StopOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StopOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct OpState {
    progress: u8,
    outcome: Option<StopOutcome>,
}

/// Write side of one stop operation's state.
#[derive(Clone)]
pub struct StopReporter {
    tx: watch::Sender<OpState>,
}

impl StopReporter {
    /// Records progress, clamped to 100. Ignored once terminal.
    pub fn set_progress(&self, pct: u8) {
        self.tx.send_modify(|state| {
            if state.outcome.is_none() {
                state.progress = pct.min(100);
            }
        });
    }

    /// Marks the operation terminal. Later calls are ignored.
    pub fn finish(&self, outcome: StopOutcome) {
        self.tx.send_modify(|state| {
            if state.outcome.is_none() {
                state.outcome = Some(outcome);
            }
        });
    }

    /// Runs one environment's stop operation to a terminal state,
    /// forwarding its progress signal into the barrier.
    pub async fn drive(self, env: Arc<dyn ExecutionEnvironment>) -> StopOutcome {
        let (progress_tx, mut progress_rx) = watch::channel(0u8);
        let forwarder = {
            let reporter = self.clone();
            tokio::spawn(async move {
                while progress_rx.changed().await.is_ok() {
                    let pct = *progress_rx.borrow();
                    reporter.set_progress(pct);
                }
            })
        };

        let result = env.stop(progress_tx).await;
        let _ = forwarder.await;

        let outcome = match result {
            Ok(()) => StopOutcome::Succeeded,
            Err(e) => {
                warn!("Stop operation for '{}' failed: {e}", env.name());
                StopOutcome::Failed
            }
        };
        self.finish(outcome);
        outcome
    }
}

#[derive(Debug, Error)]
#[error("environment teardown still in progress ({progress}%)")]
pub struct DismissBlocked {
    pub progress: u8,
}

/// The completion gate over exactly two stop operations.
pub struct ShutdownBarrier {
    ops: [watch::Receiver<OpState>; 2],
    grace: Duration,
}

impl ShutdownBarrier {
    /// Creates a barrier and the two reporters its operations feed.
    pub fn new(grace: Duration) -> (Self, StopReporter, StopReporter) {
        let (tx_a, rx_a) = watch::channel(OpState::default());
        let (tx_b, rx_b) = watch::channel(OpState::default());
        (
            Self {
                ops: [rx_a, rx_b],
                grace,
            },
            StopReporter { tx: tx_a },
            StopReporter { tx: tx_b },
        )
    }

    /// Spawns the stop operations for both environments and returns the
    /// barrier guarding them.
    pub fn begin(
        environments: &EnvironmentSet,
        grace: Duration,
    ) -> (Self, JoinHandle<StopOutcome>, JoinHandle<StopOutcome>) {
        let (barrier, reporter_a, reporter_b) = Self::new(grace);
        let (annotation, analysis) = environments.pair();
        let handle_a = tokio::spawn(reporter_a.drive(annotation));
        let handle_b = tokio::spawn(reporter_b.drive(analysis));
        (barrier, handle_a, handle_b)
    }

    /// Clamped arithmetic mean of the two progress signals.
    pub fn combined_progress(&self) -> u8 {
        let a = self.ops[0].borrow().progress.min(100) as u16;
        let b = self.ops[1].borrow().progress.min(100) as u16;
        (((a + b) / 2) as u8).min(100)
    }

    /// True once both operations are terminal.
    pub fn is_open(&self) -> bool {
        self.ops.iter().all(|rx| rx.borrow().outcome.is_some())
    }

    /// Manual dismissal; rejected while the gate is closed.
    pub fn try_dismiss(&self) -> Result<(), DismissBlocked> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DismissBlocked {
                progress: self.combined_progress(),
            })
        }
    }

    /// Waits until both operations are terminal.
    ///
    /// A reporter dropped without a terminal report counts as cancelled;
    /// the gate must never stay closed over an abandoned operation.
    pub async fn wait(&mut self) -> [StopOutcome; 2] {
        let mut outcomes = [StopOutcome::Cancelled; 2];
        for (i, rx) in self.ops.iter_mut().enumerate() {
            loop {
                if let Some(outcome) = rx.borrow().outcome {
                    outcomes[i] = outcome;
                    break;
                }
                if rx.changed().await.is_err() {
                    outcomes[i] = StopOutcome::Cancelled;
                    break;
                }
            }
        }
        outcomes
    }

    /// Waits for the gate, then lets the fixed grace period elapse before
    /// auto-dismissal.
    pub async fn wait_and_dismiss(&mut self) -> [StopOutcome; 2] {
        let outcomes = self.wait().await;
        tokio::time::sleep(self.grace).await;
        outcomes
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}
