//! Progress reporting
//!
//! The driver emits an event at every phase transition and around every
//! target build. Hosts implement [`ProgressObserver`] to drive a UI; every
//! method has a no-op default so observers implement only what they need.

use std::fmt;
use std::time::Duration;

/// Pipeline phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Parsing,
    LoadingState,
    Expanding,
    Analyzing,
    CheckingDirty,
    Compiling,
    SavingState,
    Complete,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BuildPhase::Parsing => "parsing",
            BuildPhase::LoadingState => "loading state",
            BuildPhase::Expanding => "expanding sources",
            BuildPhase::Analyzing => "analyzing dependencies",
            BuildPhase::CheckingDirty => "checking for changes",
            BuildPhase::Compiling => "compiling",
            BuildPhase::SavingState => "saving state",
            BuildPhase::Complete => "complete",
        };
        write!(f, "{text}")
    }
}

/// Observer for pipeline and per-target events
pub trait ProgressObserver: Send + Sync {
    /// The pipeline entered a new phase
    fn phase_started(&self, _phase: BuildPhase) {}

    /// A target was dispatched to a worker
    fn target_started(&self, _name: &str) {}

    /// A target's build finished
    fn target_finished(&self, _name: &str, _success: bool, _duration: Duration) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}
