//! Message types for talking to the scheduler actor
//!
//! Commands travel over an mpsc channel and carry a oneshot sender when the
//! caller waits for an answer. Shutdown is not a command: it is signalled
//! through the scheduler's cancellation token so it also interrupts a cycle.

use std::fmt;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::engine::CycleReport;

/// Commands accepted by the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run one cycle right away (the interval timer keeps its cadence)
    CheckNow {
        /// Channel to send the cycle summary back
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Change the pause between cycles, effective from the next sleep
    UpdateInterval { interval_secs: u64 },
}

/// What the scheduler is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Sleeping between cycles
    #[default]
    Idle,

    /// A cycle is in progress
    Probing,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Probing => "probing",
        })
    }
}
