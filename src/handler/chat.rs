//! Chat message rendering shared by the chat integrations.
//!
//! Each event is rendered into a one-line summary plus an optional
//! attachment. Links and escaping depend on the target markup, so the
//! convertor is generic over [`Markup`].

use std::marker::PhantomData;

use handlebars::{Handlebars, RenderError, no_escape};
use serde_json::{Value, json};

use crate::payload::{
    Conversion, CreatePayload, DeletePayload, ForkPayload, IssueCommentPayload, IssuePayload,
    PackagePayload, PayloadConvertor, PullRequestPayload, PushPayload, RefName, ReleasePayload,
    Repository, RepositoryPayload, ReviewKind, WikiPayload,
};

const CREATE: &str = "[{{repo}}] {{ref_type}} {{ref}} created by {{sender}}";
const DELETE: &str = "[{{repo}}] {{ref_type}} {{ref}} deleted by {{sender}}";
const FORK: &str = "{{forkee}} is forked to {{repo}}";
const PUSH: &str = "[{{repo}}:{{branch}}] {{commits}} pushed by {{pusher}}";
const PUSH_COMMIT: &str = "{{link}}: {{title}} - {{author}}";
const ISSUE: &str = "[{{repo}}] Issue {{action}}: {{issue}} by {{sender}}";
const ISSUE_COMMENT: &str = "[{{repo}}] New comment on {{kind}} {{target}} by {{sender}}";
const PULL_REQUEST: &str = "[{{repo}}] Pull request {{action}}: {{pull}} by {{sender}}";
const REVIEW: &str = "[{{repo}}] Pull request review {{kind}}: {{pull}} by {{sender}}";
const REPOSITORY: &str = "[{{repo}}] Repository {{action}} by {{sender}}";
const RELEASE: &str = "[{{repo}}] Release {{action}}: {{release}} by {{sender}}";
const WIKI: &str = "[{{repo}}] Wiki page {{page}} {{action}} by {{sender}}";
const PACKAGE: &str = "Package {{action}}: {{package}} by {{sender}}";

/// Link and escaping rules of a chat format.
pub trait Markup: Send + Sync {
    fn escape(text: &str) -> String;
    fn link(url: &str, text: &str) -> String;
}

/// Slack `mrkdwn`: `<url|text>` links, `&`, `<` and `>` escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlackMarkup;

impl Markup for SlackMarkup {
    fn escape(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    fn link(url: &str, text: &str) -> String {
        format!("<{url}|{}>", Self::escape(text))
    }
}

/// HTML with anchor links.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMarkup;

impl Markup for HtmlMarkup {
    fn escape(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }

    fn link(url: &str, text: &str) -> String {
        format!("<a href=\"{}\">{}</a>", Self::escape(url), Self::escape(text))
    }
}

/// Plain text with markdown-style links.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMarkup;

impl Markup for PlainMarkup {
    fn escape(text: &str) -> String {
        text.to_string()
    }

    fn link(url: &str, text: &str) -> String {
        format!("[{text}]({url})")
    }
}

/// Secondary block shown under the summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatAttachment {
    pub title: String,
    pub title_link: String,
    pub text: String,
}

/// A rendered chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub attachment: Option<ChatAttachment>,
}

impl ChatMessage {
    /// Summary and attachment text joined by `separator`.
    #[must_use]
    pub fn full_text(&self, separator: &str) -> String {
        match &self.attachment {
            Some(a) if !a.text.is_empty() => format!("{}{separator}{}", self.text, a.text),
            _ => self.text.clone(),
        }
    }
}

/// Renders every event kind into a [`ChatMessage`].
pub struct ChatConvertor<M> {
    templates: Handlebars<'static>,
    markup: PhantomData<M>,
}

impl<M: Markup> Default for ChatConvertor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Markup> ChatConvertor<M> {
    #[must_use]
    pub fn new() -> Self {
        let mut templates = Handlebars::new();
        // Values are escaped for the markup before rendering.
        templates.register_escape_fn(no_escape);
        Self {
            templates,
            markup: PhantomData,
        }
    }

    fn render(&self, template: &str, data: &Value) -> Result<String, RenderError> {
        self.templates.render_template(template, data)
    }

    fn message(
        &self,
        template: &str,
        data: &Value,
        attachment: Option<ChatAttachment>,
    ) -> Conversion<Result<ChatMessage, RenderError>> {
        Conversion::Payload(
            self.render(template, data)
                .map(|text| ChatMessage { text, attachment }),
        )
    }

    fn repo_link(repo: &Repository) -> String {
        M::link(&repo.html_url, &repo.full_name)
    }

    fn text_attachment(title: &str, link: &str, text: &str) -> Option<ChatAttachment> {
        (!text.is_empty()).then(|| ChatAttachment {
            title: M::escape(title),
            title_link: link.to_string(),
            text: M::escape(text),
        })
    }
}

fn action(action: &str) -> String {
    action.replace('_', " ")
}

impl<M: Markup> PayloadConvertor for ChatConvertor<M> {
    type Output = Result<ChatMessage, RenderError>;

    fn create(&self, p: &CreatePayload) -> Conversion<Self::Output> {
        let short = RefName(&p.ref_name).short_name();
        let ref_url = format!("{}/src/{}/{short}", p.repository.html_url, p.ref_type);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "ref_type": M::escape(&p.ref_type),
            "ref": M::link(&ref_url, short),
            "sender": M::escape(&p.sender.login),
        });
        self.message(CREATE, &data, None)
    }

    fn delete(&self, p: &DeletePayload) -> Conversion<Self::Output> {
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "ref_type": M::escape(&p.ref_type),
            "ref": M::escape(RefName(&p.ref_name).short_name()),
            "sender": M::escape(&p.sender.login),
        });
        self.message(DELETE, &data, None)
    }

    fn fork(&self, p: &ForkPayload) -> Conversion<Self::Output> {
        let data = json!({
            "forkee": Self::repo_link(&p.forkee),
            "repo": Self::repo_link(&p.repository),
        });
        self.message(FORK, &data, None)
    }

    fn issue(&self, p: &IssuePayload) -> Conversion<Self::Output> {
        let title = format!("#{} {}", p.issue.number, p.issue.title);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "action": action(&p.action),
            "issue": M::link(&p.issue.html_url, &title),
            "sender": M::escape(&p.sender.login),
        });
        let attachment = if p.action == "opened" {
            Self::text_attachment(&title, &p.issue.html_url, &p.issue.body)
        } else {
            None
        };
        self.message(ISSUE, &data, attachment)
    }

    fn issue_comment(&self, p: &IssueCommentPayload) -> Conversion<Self::Output> {
        let title = format!("#{} {}", p.issue.number, p.issue.title);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "kind": if p.is_pull { "pull request" } else { "issue" },
            "target": M::link(&p.comment.html_url, &title),
            "sender": M::escape(&p.sender.login),
        });
        let attachment = Self::text_attachment(&title, &p.comment.html_url, &p.comment.body);
        self.message(ISSUE_COMMENT, &data, attachment)
    }

    fn push(&self, p: &PushPayload) -> Conversion<Self::Output> {
        let branch = RefName(&p.ref_name).short_name();
        let branch_url = format!("{}/src/branch/{branch}", p.repository.html_url);
        let count = if p.total_commits == 0 {
            p.commits.len()
        } else {
            p.total_commits
        };
        let noun = if count == 1 { "commit" } else { "commits" };
        let commits_text = format!("{count} new {noun}");
        let commits = if p.compare_url.is_empty() {
            commits_text
        } else {
            M::link(&p.compare_url, &commits_text)
        };

        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "branch": M::link(&branch_url, branch),
            "commits": commits,
            "pusher": M::escape(&p.pusher.login),
        });

        let mut lines = Vec::with_capacity(p.commits.len());
        for c in &p.commits {
            let line = json!({
                "link": M::link(&c.url, c.short_id()),
                "title": M::escape(c.title()),
                "author": M::escape(&c.author.name),
            });
            match self.render(PUSH_COMMIT, &line) {
                Ok(text) => lines.push(text),
                Err(e) => return Conversion::Payload(Err(e)),
            }
        }
        let attachment = (!lines.is_empty()).then(|| ChatAttachment {
            text: lines.join("\n"),
            ..ChatAttachment::default()
        });
        self.message(PUSH, &data, attachment)
    }

    fn pull_request(&self, p: &PullRequestPayload) -> Conversion<Self::Output> {
        let title = format!("#{} {}", p.pull_request.number, p.pull_request.title);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "action": action(&p.action),
            "pull": M::link(&p.pull_request.html_url, &title),
            "sender": M::escape(&p.sender.login),
        });
        let attachment = if p.action == "opened" {
            Self::text_attachment(&title, &p.pull_request.html_url, &p.pull_request.body)
        } else {
            None
        };
        self.message(PULL_REQUEST, &data, attachment)
    }

    fn review(&self, p: &PullRequestPayload, kind: ReviewKind) -> Conversion<Self::Output> {
        let title = format!("#{} {}", p.pull_request.number, p.pull_request.title);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "kind": kind.as_str(),
            "pull": M::link(&p.pull_request.html_url, &title),
            "sender": M::escape(&p.sender.login),
        });
        let content = p.review.as_ref().map_or("", |r| r.content.as_str());
        let attachment = Self::text_attachment(&title, &p.pull_request.html_url, content);
        self.message(REVIEW, &data, attachment)
    }

    fn repository(&self, p: &RepositoryPayload) -> Conversion<Self::Output> {
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "action": action(&p.action),
            "sender": M::escape(&p.sender.login),
        });
        self.message(REPOSITORY, &data, None)
    }

    fn release(&self, p: &ReleasePayload) -> Conversion<Self::Output> {
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "action": action(&p.action),
            "release": M::link(&p.release.html_url, &p.release.tag_name),
            "sender": M::escape(&p.sender.login),
        });
        self.message(RELEASE, &data, None)
    }

    fn wiki(&self, p: &WikiPayload) -> Conversion<Self::Output> {
        let page_url = format!("{}/wiki/{}", p.repository.html_url, p.page);
        let data = json!({
            "repo": Self::repo_link(&p.repository),
            "page": M::link(&page_url, &p.page),
            "action": action(&p.action),
            "sender": M::escape(&p.sender.login),
        });
        let attachment = Self::text_attachment(&p.page, &page_url, &p.comment);
        self.message(WIKI, &data, attachment)
    }

    fn package(&self, p: &PackagePayload) -> Conversion<Self::Output> {
        let name = format!("{}:{}", p.package.name, p.package.version);
        let data = json!({
            "action": action(&p.action),
            "package": M::link(&p.package.html_url, &name),
            "sender": M::escape(&p.sender.login),
        });
        self.message(PACKAGE, &data, None)
    }
}
