//! Aggregation of polled sub-operation listings.
//!
//! The control plane reports deployment progress as a flat list of
//! sub-operation records. Each poll returns the whole list again, records for
//! resources that are not materialized yet carry no resource id, and the same
//! resource can appear several times. [`OperationStatusTracker`] folds these
//! listings into one entry per resource whose state only moves forward.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Message recorded for a failed resource that reported no error details.
pub const NO_ERROR_DETAILS: &str = "no error details reported";

/// Provisioning state of a single sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    /// Accepted but not started.
    Pending,
    /// In progress.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Failed,
}

impl OperationState {
    /// Returns true if the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns a display symbol for the state.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Pending => "○",
            Self::Running => "◐",
            Self::Succeeded => "●",
            Self::Failed => "✗",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// One record of a sub-operation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOperation {
    /// Resource ID, present once the resource has been materialized.
    pub resource_id: Option<String>,
    /// Resource type (e.g. `Microsoft.Storage/storageAccounts`).
    pub resource_type: String,
    /// Reported state.
    pub state: OperationState,
    /// Error message, only set for failed records.
    pub error_message: Option<String>,
}

impl SubOperation {
    /// Creates a record for a materialized resource.
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        state: OperationState,
    ) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            resource_type: resource_type.into(),
            state,
            error_message: None,
        }
    }

    /// Sets the error message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Returns the resource ID if it is present and non-empty.
    #[must_use]
    pub fn tracked_id(&self) -> Option<&str> {
        self.resource_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Last known progress of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedResource {
    /// Resource ID.
    pub resource_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Current state.
    pub state: OperationState,
    /// First error message observed while failed.
    pub error: Option<String>,
}

impl TrackedResource {
    fn from_record(resource_id: &str, record: &SubOperation) -> Self {
        let mut resource = Self {
            resource_id: resource_id.to_string(),
            resource_type: record.resource_type.clone(),
            state: record.state,
            error: None,
        };
        resource.record_error(record);
        resource
    }

    /// Applies a later record for the same resource.
    fn apply(&mut self, record: &SubOperation) {
        if record.state != self.state {
            if self.state.is_terminal() && !record.state.is_terminal() {
                debug!(
                    "Ignoring {} -> {} for {}",
                    self.state, record.state, self.resource_id
                );
            } else {
                debug!("{}: {} -> {}", self.resource_id, self.state, record.state);
                self.state = record.state;
            }
        }
        self.record_error(record);
    }

    fn record_error(&mut self, record: &SubOperation) {
        if record.state == OperationState::Failed && self.error.is_none() {
            if let Some(message) = record.error_message.as_deref().filter(|m| !m.is_empty()) {
                self.error = Some(message.to_string());
            }
        }
    }

    /// Returns the recorded error or the placeholder text.
    #[must_use]
    pub fn error_or_default(&self) -> &str {
        self.error.as_deref().unwrap_or(NO_ERROR_DETAILS)
    }
}

/// Ordered snapshot of tracked resources handed to presenters.
///
/// Succeeded resources come first; within each group resources keep the order
/// in which they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderedStatusView {
    /// Tracked resources in display order.
    pub resources: Vec<TrackedResource>,
}

impl OrderedStatusView {
    /// Number of resources in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if no resource has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of resources in the given state.
    #[must_use]
    pub fn count(&self, state: OperationState) -> usize {
        self.resources.iter().filter(|r| r.state == state).count()
    }

    /// Iterates over the resources in display order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedResource> {
        self.resources.iter()
    }
}

/// Folds repeated sub-operation listings into per-resource state.
#[derive(Debug, Default)]
pub struct OperationStatusTracker {
    resources: IndexMap<String, TrackedResource>,
}

impl OperationStatusTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one complete listing and returns the resulting view.
    ///
    /// Records without a resource ID are skipped. A resource in a final state
    /// never goes back to pending or running.
    pub fn observe(&mut self, snapshot: &[SubOperation]) -> OrderedStatusView {
        for record in snapshot {
            let Some(id) = record.tracked_id() else {
                continue;
            };

            match self.resources.get_mut(id) {
                Some(resource) => resource.apply(record),
                None => {
                    debug!("Tracking {} ({})", id, record.resource_type);
                    self.resources
                        .insert(id.to_string(), TrackedResource::from_record(id, record));
                }
            }
        }

        self.view()
    }

    /// Returns the current view without merging anything.
    #[must_use]
    pub fn view(&self) -> OrderedStatusView {
        let mut resources: Vec<TrackedResource> = self.resources.values().cloned().collect();
        resources.sort_by_key(|r| r.state != OperationState::Succeeded);
        OrderedStatusView { resources }
    }

    /// Returns every failed resource with its first error, in first-seen order.
    #[must_use]
    pub fn collect_errors(&self) -> IndexMap<String, String> {
        self.resources
            .values()
            .filter(|r| r.state == OperationState::Failed)
            .map(|r| (r.resource_id.clone(), r.error_or_default().to_string()))
            .collect()
    }

    /// Number of distinct resources seen so far.
    #[must_use]
    pub fn resources_seen(&self) -> usize {
        self.resources.len()
    }

    /// Looks up a tracked resource.
    #[must_use]
    pub fn get(&self, resource_id: &str) -> Option<&TrackedResource> {
        self.resources.get(resource_id)
    }
}
