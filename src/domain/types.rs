//! Shared identifiers and lifecycle enumerations for compilation jobs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-ordered identifier of a single compilation job.
///
/// Backed by a UUID v7 so identifiers sort by creation time and stay unique
/// across concurrent jobs in the same process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a compilation job.
///
/// `Terminated` is the only terminal state; it is entered once the workspace
/// has been released, whichever state the job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    WorkspaceReady,
    CompilerRunning,
    Succeeded,
    Failed,
    Terminated,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::WorkspaceReady => "workspace_ready",
            JobState::CompilerRunning => "compiler_running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Terminated => "terminated",
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, next),
            (Created, WorkspaceReady)
                | (Created, Failed)
                | (WorkspaceReady, CompilerRunning)
                | (WorkspaceReady, Failed)
                | (CompilerRunning, Succeeded)
                | (CompilerRunning, Failed)
                | (Succeeded, Terminated)
                | (Failed, Terminated)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
