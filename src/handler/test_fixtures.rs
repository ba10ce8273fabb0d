//! Shared payloads and records for handler tests.

use serde::Serialize;

use crate::model::{HookEventType, HookTask, NewHookTask};
use crate::payload::{
    Comment, CreatePayload, Issue, IssueCommentPayload, IssuePayload, PayloadCommit, PayloadUser,
    PushPayload, Repository, User,
};

pub const TASK_UUID: &str = "5d2a4f1e-9c1b-4b8e-8f6a-2c4d1e0b7a93";
pub const HEAD_COMMIT: &str = "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c";

pub fn user(login: &str) -> User {
    User {
        id: 1,
        login: login.into(),
        html_url: format!("https://forge.example/{login}"),
        ..User::default()
    }
}

pub fn repository() -> Repository {
    Repository {
        id: 7,
        name: "widgets".into(),
        full_name: "alice/widgets".into(),
        html_url: "https://forge.example/alice/widgets".into(),
        clone_url: "https://forge.example/alice/widgets.git".into(),
        owner: user("alice"),
        default_branch: "main".into(),
        ..Repository::default()
    }
}

fn commit(id: &str, message: &str) -> PayloadCommit {
    PayloadCommit {
        id: id.into(),
        message: message.into(),
        url: format!("https://forge.example/alice/widgets/commit/{id}"),
        author: PayloadUser {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            username: "alice".into(),
        },
        ..PayloadCommit::default()
    }
}

pub fn push_payload() -> PushPayload {
    let first = commit("2b7c3d1ab8e04c6f9a17d9e0f3c5b6a4e8d21f70", "Add parser\n\nDetails.");
    let head = commit(HEAD_COMMIT, "Fix & <tidy> build");
    PushPayload {
        ref_name: "refs/heads/main".into(),
        before: "2b7c3d1ab8e04c6f9a17d9e0f3c5b6a4e8d21f6f".into(),
        after: HEAD_COMMIT.into(),
        compare_url: "https://forge.example/alice/widgets/compare/2b7c3d1...0d1a26e".into(),
        commits: vec![first, head.clone()],
        total_commits: 2,
        head_commit: Some(head),
        repository: repository(),
        pusher: user("alice"),
        sender: user("alice"),
    }
}

pub fn create_tag_payload() -> CreatePayload {
    CreatePayload {
        sha: HEAD_COMMIT.into(),
        ref_name: "v1.0".into(),
        ref_type: "tag".into(),
        repository: repository(),
        sender: user("alice"),
    }
}

pub fn issue_payload(action: &str, body: &str) -> IssuePayload {
    IssuePayload {
        action: action.into(),
        number: 12,
        issue: Issue {
            id: 120,
            number: 12,
            title: "Crash on start".into(),
            body: body.into(),
            html_url: "https://forge.example/alice/widgets/issues/12".into(),
            user: user("bob"),
            state: "open".into(),
        },
        repository: repository(),
        sender: user("bob"),
    }
}

pub fn issue_comment_payload(body: &str) -> IssueCommentPayload {
    let issue = issue_payload("created", "").issue;
    IssueCommentPayload {
        action: "created".into(),
        comment: Comment {
            id: 3,
            html_url: format!("{}#issuecomment-3", issue.html_url),
            body: body.into(),
            user: user("bob"),
        },
        issue,
        repository: repository(),
        sender: user("bob"),
        is_pull: false,
    }
}

/// A stored typed task carrying `payload` for `event`.
pub fn task<T: Serialize>(event: HookEventType, payload: &T) -> HookTask {
    let content = serde_json::to_string(payload).unwrap();
    NewHookTask::new(1, event, content).into_task(41, TASK_UUID.into())
}

/// A stored legacy task carrying `content` verbatim.
pub fn legacy_task(event: HookEventType, content: &str) -> HookTask {
    NewHookTask::new(1, event, content)
        .legacy()
        .into_task(42, TASK_UUID.into())
}

pub fn body_json(request: &crate::transport::HttpRequest) -> serde_json::Value {
    serde_json::from_slice(request.body_bytes()).unwrap()
}

pub fn header<'a>(request: &'a crate::transport::HttpRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}
