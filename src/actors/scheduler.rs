//! SchedulerActor - drives the poll cycles
//!
//! One long-lived task probes all endpoints sequentially, sleeping for the
//! configured interval before every cycle.
//!
//! ## Message Flow
//!
//! ```text
//! sleep(interval) → Engine::run_cycle → sleep(interval) → ...
//!     ↑
//!     └─── Commands (CheckNow, UpdateInterval) and the cancellation token
//! ```
//!
//! ## States
//!
//! `idle` between cycles, `probing` while a cycle runs. The state is published
//! through a watch channel so any number of readers can observe it.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::{CycleReport, Engine};
use crate::notification::default_state_max_age;

use super::messages::{SchedulerCommand, SchedulerState};

/// Actor that owns the poll loop
pub struct SchedulerActor {
    engine: Engine,

    /// Pause before every cycle
    interval_duration: Duration,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    state_tx: watch::Sender<SchedulerState>,

    cancel: CancellationToken,
}

impl SchedulerActor {
    pub fn new(
        engine: Engine,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        state_tx: watch::Sender<SchedulerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            interval_duration,
            command_rx,
            state_tx,
            cancel,
        }
    }

    /// Run until the cancellation token fires
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        match self.engine.tracker().prune_older_than(default_state_max_age()) {
            Ok(0) => {}
            Ok(pruned) => debug!("pruned {pruned} stale notification states"),
            Err(e) => warn!("failed to prune notification states: {e}"),
        }

        let mut ticker = Self::ticker(self.interval_duration);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }

                _ = ticker.tick() => {
                    self.run_cycle().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let report = self.run_cycle().await;
                            let _ = respond_to.send(report);
                        }

                        SchedulerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = Self::ticker(self.interval_duration);
                        }
                    }
                }
            }
        }

        self.state_tx.send_replace(SchedulerState::Idle);
        debug!("scheduler actor stopped");
    }

    /// First tick only after a full interval
    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn run_cycle(&self) -> CycleReport {
        self.state_tx.send_replace(SchedulerState::Probing);
        let report = self.engine.run_cycle(&self.cancel).await;
        self.state_tx.send_replace(SchedulerState::Idle);

        info!(
            "cycle done: {} probed, {} up, {} down, {} alerts sent, {} alert failures, {} skipped",
            report.probed,
            report.up,
            report.down,
            report.alerts_sent,
            report.alert_failures,
            report.skipped
        );
        report
    }
}

/// Handle for controlling a running SchedulerActor
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    state_rx: watch::Receiver<SchedulerState>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Spawn the scheduler on the current runtime
    pub fn spawn(engine: Engine, interval: Duration) -> Self {
        Self::spawn_with_token(engine, interval, CancellationToken::new())
    }

    /// Spawn with an externally owned cancellation token
    pub fn spawn_with_token(engine: Engine, interval: Duration, cancel: CancellationToken) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

        let actor = SchedulerActor::new(engine, interval, cmd_rx, state_tx, cancel.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            state_rx,
            cancel,
        }
    }

    /// Run one cycle now and wait for its summary
    ///
    /// Queued behind a cycle that is already running.
    pub async fn check_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CheckNow { respond_to: tx })
            .await
            .context("scheduler is not running")?;

        rx.await.context("scheduler stopped before finishing the cycle")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_secs })
            .await
            .context("scheduler is not running")?;
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the scheduler and wait until it has stopped
    ///
    /// A cycle in progress finishes the endpoint it is probing and skips the rest.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.sender.closed().await;
    }
}
