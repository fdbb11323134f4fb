//! Accumulator lifecycle state.

use std::fmt;

use serde::Serialize;

/// Lifecycle of a [`BatchAccumulator`](crate::BatchAccumulator).
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`. A failed start
/// goes from `Starting` straight back to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Stopped => "stopped",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
