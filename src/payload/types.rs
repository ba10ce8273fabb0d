//! Canonical event payload documents.
//!
//! These mirror the JSON an event source records in a typed hook task.
//! Every struct tolerates missing fields so older payloads keep decoding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub full_name: String,
    pub email: String,
    pub avatar_url: String,
    pub html_url: String,
}

impl User {
    /// Full name when set, login otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.login
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    pub owner: User,
    pub private: bool,
    pub default_branch: String,
}

/// Commit author or committer as recorded in git.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadUser {
    pub name: String,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadCommit {
    pub id: String,
    pub message: String,
    pub url: String,
    pub author: PayloadUser,
    pub committer: PayloadUser,
    pub timestamp: String,
}

impl PayloadCommit {
    /// First line of the commit message.
    #[must_use]
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    /// Seven character abbreviation of the commit id.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatePayload {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub ref_type: String,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletePayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub ref_type: String,
    pub pusher_type: String,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkPayload {
    pub forkee: Repository,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    pub compare_url: String,
    pub commits: Vec<PayloadCommit>,
    pub total_commits: usize,
    pub head_commit: Option<PayloadCommit>,
    pub repository: Repository,
    pub pusher: User,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub html_url: String,
    pub user: User,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuePayload {
    pub action: String,
    pub number: i64,
    pub issue: Issue,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: i64,
    pub html_url: String,
    pub body: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueCommentPayload {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
    pub repository: Repository,
    pub sender: User,
    pub is_pull: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub html_url: String,
    pub user: User,
    pub head_branch: String,
    pub base_branch: String,
    pub merged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestPayload {
    pub action: String,
    pub number: i64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub sender: User,
    pub review: Option<ReviewPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryPayload {
    pub action: String,
    pub repository: Repository,
    pub organization: Option<User>,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub id: i64,
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub html_url: String,
    pub draft: bool,
    pub prerelease: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasePayload {
    pub action: String,
    pub release: Release,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiPayload {
    pub action: String,
    pub repository: Repository,
    pub sender: User,
    pub page: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub html_url: String,
    pub owner: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagePayload {
    pub action: String,
    pub package: Package,
    pub sender: User,
}

/// A git reference such as `refs/heads/main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefName<'a>(pub &'a str);

impl<'a> RefName<'a> {
    const BRANCH_PREFIX: &'static str = "refs/heads/";
    const TAG_PREFIX: &'static str = "refs/tags/";

    /// Branch or tag name without the `refs/...` prefix.
    #[must_use]
    pub fn short_name(self) -> &'a str {
        self.0
            .strip_prefix(Self::BRANCH_PREFIX)
            .or_else(|| self.0.strip_prefix(Self::TAG_PREFIX))
            .unwrap_or(self.0)
    }

    /// `branch`, `tag`, or `ref` when the kind is not recognized.
    #[must_use]
    pub fn ref_type(self) -> &'static str {
        if self.0.starts_with(Self::BRANCH_PREFIX) {
            "branch"
        } else if self.0.starts_with(Self::TAG_PREFIX) {
            "tag"
        } else {
            "ref"
        }
    }
}
