//! Presentation boundary of the orchestrator.
//!
//! The orchestrator pushes phase changes and status views; presenters only
//! render them and never call back into the run.

use indexmap::IndexMap;

use crate::tracker::OrderedStatusView;

use super::run::RunPhase;
use super::DeploymentOutcome;

/// Receives progress of a deployment run.
pub trait StatusPresenter: Send {
    /// Called when the run enters a new phase.
    fn phase_changed(&mut self, _phase: RunPhase) {}

    /// Called once per poll tick with the current view.
    ///
    /// The view is repeated unchanged when a listing failed.
    fn progress(&mut self, view: &OrderedStatusView, total_expected: usize);

    /// Called once when the deployment succeeded.
    fn succeeded(&mut self, _outcome: &DeploymentOutcome) {}

    /// Called once when the run failed.
    fn failed(&mut self, _reason: &str, _errors: &IndexMap<String, String>) {}
}

/// Presenter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl StatusPresenter for NullPresenter {
    fn progress(&mut self, _view: &OrderedStatusView, _total_expected: usize) {}
}
