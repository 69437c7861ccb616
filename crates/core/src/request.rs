//! Publication requests: state machine, validation and approval policy.
//!
//! A request bundles `(item, version)` pairs. Approving it moves each item's
//! `public` ref to the bundled version; closing it discards it. Both are
//! terminal.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ItemId, Operator, ProjectId, RequestId, Timestamp, UserId, VersionId};
use crate::version::{RefName, VersionSelector};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a request title.
pub const MAX_TITLE_LENGTH: usize = 255;

/// Maximum length of a request description.
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Draft,
    Waiting,
    Approved,
    Closed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Waiting => "WAITING",
            Self::Approved => "APPROVED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Closed)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    ///
    /// `Draft -> Waiting -> Approved`, and any non-terminal state `-> Closed`.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Draft, Waiting) | (Waiting, Approved) | (Draft | Waiting, Closed)
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "WAITING" => Ok(Self::Waiting),
            "APPROVED" => Ok(Self::Approved),
            "CLOSED" => Ok(Self::Closed),
            other => Err(CoreError::Validation(format!(
                "Invalid request state '{other}'. Must be one of: DRAFT, WAITING, APPROVED, CLOSED"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One publication intent: make `version_id` the public version of `item_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub item_id: ItemId,
    pub version_id: VersionId,
    /// Ref the version was resolved from, when the caller named a ref.
    pub source_ref: Option<RefName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub reviewer_ids: Vec<UserId>,
    pub state: RequestState,
    pub items: Vec<RequestItem>,
    pub created_by: Operator,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub approved_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

impl Request {
    /// The version this request would publish for `item_id`.
    pub fn target_for(&self, item_id: ItemId) -> Option<VersionId> {
        self.items
            .iter()
            .find(|i| i.item_id == item_id)
            .map(|i| i.version_id)
    }

    /// Fail with a conflict when the request can no longer change.
    pub fn ensure_open(&self) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Request {} is already {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

/// Caller input for one request entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemInput {
    pub item_id: ItemId,
    pub target: VersionSelector,
}

impl RequestItemInput {
    pub fn version(item_id: ItemId, version_id: VersionId) -> Self {
        Self {
            item_id,
            target: VersionSelector::Version(version_id),
        }
    }

    pub fn latest(item_id: ItemId) -> Self {
        Self {
            item_id,
            target: VersionSelector::Ref(RefName::Latest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub reviewer_ids: Vec<UserId>,
    pub items: Vec<RequestItemInput>,
    /// Initial state; the policy default applies when `None`.
    pub state: Option<RequestState>,
}

/// Wholesale replacement of a request's editable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUpdate {
    pub title: String,
    pub description: Option<String>,
    pub reviewer_ids: Vec<UserId>,
    pub items: Vec<RequestItemInput>,
    /// Move between `Draft` and `Waiting`; `None` keeps the current state.
    pub state: Option<RequestState>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a request title: non-empty after trimming and within
/// [`MAX_TITLE_LENGTH`].
pub fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation(
            "Request title must not be empty".to_string(),
        ));
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Request title must not exceed {MAX_TITLE_LENGTH} characters, got {len}"
        )));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), CoreError> {
    if let Some(d) = description {
        if d.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(CoreError::Validation(format!(
                "Request description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

/// A request needs at least one entry and at most one entry per item.
pub fn validate_item_inputs(items: &[RequestItemInput]) -> Result<(), CoreError> {
    if items.is_empty() {
        return Err(CoreError::Validation(
            "A request must contain at least one item".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for input in items {
        if !seen.insert(input.item_id) {
            return Err(CoreError::Validation(format!(
                "Item {} appears more than once in the request",
                input.item_id
            )));
        }
    }
    Ok(())
}

/// Validate the state a request is created in or edited into.
pub fn validate_open_state(state: RequestState) -> Result<(), CoreError> {
    if state.is_terminal() {
        return Err(CoreError::Validation(format!(
            "Request state must be DRAFT or WAITING, got {state}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Policy hook
// ---------------------------------------------------------------------------

/// Decisions the workflow leaves to the embedding application.
pub trait RequestPolicy: Send + Sync {
    /// State of a new request when the caller does not choose one.
    fn default_state(&self) -> RequestState {
        RequestState::Waiting
    }

    /// Decide whether `approver` may approve `request`.
    fn authorize_approval(&self, request: &Request, approver: &Operator) -> Result<(), CoreError>;
}

/// Requests start out `Waiting`; anyone may approve.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRequestPolicy;

impl RequestPolicy for DefaultRequestPolicy {
    fn authorize_approval(&self, _request: &Request, _approver: &Operator) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Only users listed as reviewers may approve. Requests with no reviewers
/// fall back to allowing any user.
#[derive(Debug, Clone, Copy)]
pub struct ReviewerPolicy {
    pub default_state: RequestState,
}

impl Default for ReviewerPolicy {
    fn default() -> Self {
        Self {
            default_state: RequestState::Waiting,
        }
    }
}

impl RequestPolicy for ReviewerPolicy {
    fn default_state(&self) -> RequestState {
        self.default_state
    }

    fn authorize_approval(&self, request: &Request, approver: &Operator) -> Result<(), CoreError> {
        let Some(user) = approver.user() else {
            return Err(CoreError::Forbidden(
                "Only users can approve requests".to_string(),
            ));
        };
        if request.reviewer_ids.is_empty() || request.reviewer_ids.contains(&user) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "User {user} is not a reviewer of request {}",
                request.id
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
