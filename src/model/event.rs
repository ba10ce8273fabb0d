//! Event types carried by hook tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A repository event that can trigger a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventType {
    Create,
    Delete,
    Fork,
    Push,
    Issues,
    IssueAssign,
    IssueLabel,
    IssueMilestone,
    IssueComment,
    PullRequest,
    PullRequestAssign,
    PullRequestLabel,
    PullRequestMilestone,
    PullRequestComment,
    PullRequestReviewApproved,
    PullRequestReviewRejected,
    PullRequestReviewComment,
    PullRequestSync,
    PullRequestReviewRequest,
    Wiki,
    Repository,
    Release,
    Package,
}

impl HookEventType {
    pub const ALL: [Self; 23] = [
        Self::Create,
        Self::Delete,
        Self::Fork,
        Self::Push,
        Self::Issues,
        Self::IssueAssign,
        Self::IssueLabel,
        Self::IssueMilestone,
        Self::IssueComment,
        Self::PullRequest,
        Self::PullRequestAssign,
        Self::PullRequestLabel,
        Self::PullRequestMilestone,
        Self::PullRequestComment,
        Self::PullRequestReviewApproved,
        Self::PullRequestReviewRejected,
        Self::PullRequestReviewComment,
        Self::PullRequestSync,
        Self::PullRequestReviewRequest,
        Self::Wiki,
        Self::Repository,
        Self::Release,
        Self::Package,
    ];

    /// Full event type name, sent as the `*-Event-Type` headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Fork => "fork",
            Self::Push => "push",
            Self::Issues => "issues",
            Self::IssueAssign => "issue_assign",
            Self::IssueLabel => "issue_label",
            Self::IssueMilestone => "issue_milestone",
            Self::IssueComment => "issue_comment",
            Self::PullRequest => "pull_request",
            Self::PullRequestAssign => "pull_request_assign",
            Self::PullRequestLabel => "pull_request_label",
            Self::PullRequestMilestone => "pull_request_milestone",
            Self::PullRequestComment => "pull_request_comment",
            Self::PullRequestReviewApproved => "pull_request_review_approved",
            Self::PullRequestReviewRejected => "pull_request_review_rejected",
            Self::PullRequestReviewComment => "pull_request_review_comment",
            Self::PullRequestSync => "pull_request_sync",
            Self::PullRequestReviewRequest => "pull_request_review_request",
            Self::Wiki => "wiki",
            Self::Repository => "repository",
            Self::Release => "release",
            Self::Package => "package",
        }
    }

    /// Short event name, sent as the `*-Event` headers.
    ///
    /// Sub-kinds collapse onto the event family a receiver subscribes to.
    #[must_use]
    pub const fn event(self) -> &'static str {
        match self {
            Self::Issues | Self::IssueAssign | Self::IssueLabel | Self::IssueMilestone => "issues",
            Self::PullRequest
            | Self::PullRequestAssign
            | Self::PullRequestLabel
            | Self::PullRequestMilestone
            | Self::PullRequestSync
            | Self::PullRequestReviewRequest => "pull_request",
            Self::IssueComment | Self::PullRequestComment => "issue_comment",
            Self::PullRequestReviewApproved => "pull_request_approved",
            Self::PullRequestReviewRejected => "pull_request_rejected",
            Self::PullRequestReviewComment => "pull_request_comment",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for HookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`HookEventType`].
#[derive(Debug, Error)]
#[error("unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for HookEventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ParseEventTypeError(s.to_string()))
    }
}
