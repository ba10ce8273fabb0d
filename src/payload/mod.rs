//! Payload conversion layer.
//!
//! A typed hook task stores a canonical JSON document. [`EventPayload::decode`]
//! is the single place that maps an event type onto the document shape, and
//! [`PayloadConvertor`] lets each provider turn that shape into its own
//! message. A provider that has nothing to send for an event answers
//! [`Conversion::Unsupported`].

mod types;

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;

pub use types::{
    Comment, CreatePayload, DeletePayload, ForkPayload, Issue, IssueCommentPayload, IssuePayload,
    Package, PackagePayload, PayloadCommit, PayloadUser, PullRequest, PullRequestPayload,
    PushPayload, RefName, Release, ReleasePayload, Repository, RepositoryPayload, ReviewPayload,
    User, WikiPayload,
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::HookEventType;

/// Kind of review carried by a review event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    Approved,
    Rejected,
    Comment,
}

impl ReviewKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Comment => "comment",
        }
    }
}

/// Error decoding a stored payload document.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to decode {event} payload: {source}")]
    Decode {
        event: HookEventType,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded canonical payload, one variant per conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Create(CreatePayload),
    Delete(DeletePayload),
    Fork(ForkPayload),
    Issue(IssuePayload),
    IssueComment(IssueCommentPayload),
    Push(PushPayload),
    PullRequest(PullRequestPayload),
    Review(PullRequestPayload, ReviewKind),
    Repository(RepositoryPayload),
    Release(ReleasePayload),
    Wiki(WikiPayload),
    Package(PackagePayload),
}

impl EventPayload {
    /// Decodes `content` according to `event`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Decode`] when the document does not match the
    /// shape of the event.
    pub fn decode(event: HookEventType, content: &[u8]) -> Result<Self, PayloadError> {
        use HookEventType as E;

        fn parse<T: DeserializeOwned>(event: E, content: &[u8]) -> Result<T, PayloadError> {
            serde_json::from_slice(content).map_err(|source| PayloadError::Decode { event, source })
        }

        Ok(match event {
            E::Create => Self::Create(parse(event, content)?),
            E::Delete => Self::Delete(parse(event, content)?),
            E::Fork => Self::Fork(parse(event, content)?),
            E::Push => Self::Push(parse(event, content)?),
            E::Issues | E::IssueAssign | E::IssueLabel | E::IssueMilestone => {
                Self::Issue(parse(event, content)?)
            }
            E::IssueComment | E::PullRequestComment => Self::IssueComment(parse(event, content)?),
            E::PullRequest
            | E::PullRequestAssign
            | E::PullRequestLabel
            | E::PullRequestMilestone
            | E::PullRequestSync
            | E::PullRequestReviewRequest => Self::PullRequest(parse(event, content)?),
            E::PullRequestReviewApproved => {
                Self::Review(parse(event, content)?, ReviewKind::Approved)
            }
            E::PullRequestReviewRejected => {
                Self::Review(parse(event, content)?, ReviewKind::Rejected)
            }
            E::PullRequestReviewComment => {
                Self::Review(parse(event, content)?, ReviewKind::Comment)
            }
            E::Repository => Self::Repository(parse(event, content)?),
            E::Release => Self::Release(parse(event, content)?),
            E::Wiki => Self::Wiki(parse(event, content)?),
            E::Package => Self::Package(parse(event, content)?),
        })
    }
}

/// Result of converting a payload for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion<T> {
    Payload(T),
    /// The provider has no representation for this event.
    Unsupported,
}

impl<T> Conversion<T> {
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Conversion<U> {
        match self {
            Self::Payload(value) => Conversion::Payload(f(value)),
            Self::Unsupported => Conversion::Unsupported,
        }
    }

    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Payload(value) => Some(value),
            Self::Unsupported => None,
        }
    }
}

/// Converts canonical payloads into a provider specific message.
///
/// Implementors write one method per conversion; [`convert`](Self::convert)
/// does the dispatch.
pub trait PayloadConvertor {
    type Output;

    fn create(&self, payload: &CreatePayload) -> Conversion<Self::Output>;
    fn delete(&self, payload: &DeletePayload) -> Conversion<Self::Output>;
    fn fork(&self, payload: &ForkPayload) -> Conversion<Self::Output>;
    fn issue(&self, payload: &IssuePayload) -> Conversion<Self::Output>;
    fn issue_comment(&self, payload: &IssueCommentPayload) -> Conversion<Self::Output>;
    fn push(&self, payload: &PushPayload) -> Conversion<Self::Output>;
    fn pull_request(&self, payload: &PullRequestPayload) -> Conversion<Self::Output>;
    fn review(&self, payload: &PullRequestPayload, kind: ReviewKind) -> Conversion<Self::Output>;
    fn repository(&self, payload: &RepositoryPayload) -> Conversion<Self::Output>;
    fn release(&self, payload: &ReleasePayload) -> Conversion<Self::Output>;
    fn wiki(&self, payload: &WikiPayload) -> Conversion<Self::Output>;
    fn package(&self, payload: &PackagePayload) -> Conversion<Self::Output>;

    fn convert(&self, payload: &EventPayload) -> Conversion<Self::Output> {
        match payload {
            EventPayload::Create(p) => self.create(p),
            EventPayload::Delete(p) => self.delete(p),
            EventPayload::Fork(p) => self.fork(p),
            EventPayload::Issue(p) => self.issue(p),
            EventPayload::IssueComment(p) => self.issue_comment(p),
            EventPayload::Push(p) => self.push(p),
            EventPayload::PullRequest(p) => self.pull_request(p),
            EventPayload::Review(p, kind) => self.review(p, *kind),
            EventPayload::Repository(p) => self.repository(p),
            EventPayload::Release(p) => self.release(p),
            EventPayload::Wiki(p) => self.wiki(p),
            EventPayload::Package(p) => self.package(p),
        }
    }
}
