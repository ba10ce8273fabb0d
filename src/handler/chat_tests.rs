//! Tests for chat message rendering.

use super::chat::{ChatConvertor, ChatMessage, HtmlMarkup, Markup, PlainMarkup, SlackMarkup};
use super::test_fixtures::{
    create_tag_payload, issue_comment_payload, issue_payload, push_payload, repository, user,
};
use crate::payload::{
    Conversion, PayloadConvertor, PullRequest, PullRequestPayload, ReviewKind, ReviewPayload,
    WikiPayload,
};

fn rendered(conversion: Conversion<Result<ChatMessage, handlebars::RenderError>>) -> ChatMessage {
    conversion.into_option().unwrap().unwrap()
}

mod markup {
    use super::*;

    #[test]
    fn slack_links_use_angle_brackets() {
        assert_eq!(
            SlackMarkup::link("https://x.example/a", "a <b>"),
            "<https://x.example/a|a &lt;b&gt;>"
        );
    }

    #[test]
    fn html_escapes_attribute_and_text() {
        assert_eq!(
            HtmlMarkup::link("https://x.example/?a=1&b=\"2\"", "R&D"),
            "<a href=\"https://x.example/?a=1&amp;b=&quot;2&quot;\">R&amp;D</a>"
        );
    }

    #[test]
    fn plain_keeps_text_unchanged() {
        assert_eq!(PlainMarkup::escape("a & <b>"), "a & <b>");
        assert_eq!(PlainMarkup::link("https://x", "t"), "[t](https://x)");
    }
}

mod push {
    use super::*;

    #[test]
    fn slack_summary_links_repo_branch_and_compare() {
        let message = rendered(ChatConvertor::<SlackMarkup>::new().push(&push_payload()));

        assert_eq!(
            message.text,
            "[<https://forge.example/alice/widgets|alice/widgets>:\
             <https://forge.example/alice/widgets/src/branch/main|main>] \
             <https://forge.example/alice/widgets/compare/2b7c3d1...0d1a26e|2 new commits> \
             pushed by alice"
        );
    }

    #[test]
    fn commit_lines_use_title_and_author() {
        let message = rendered(ChatConvertor::<SlackMarkup>::new().push(&push_payload()));
        let text = message.attachment.unwrap().text;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "<https://forge.example/alice/widgets/commit/2b7c3d1ab8e04c6f9a17d9e0f3c5b6a4e8d21f70|2b7c3d1>: Add parser - Alice"
        );
        assert!(lines[1].ends_with("|0d1a26e>: Fix &amp; &lt;tidy&gt; build - Alice"));
    }

    #[test]
    fn single_commit_is_singular() {
        let mut payload = push_payload();
        payload.commits.truncate(1);
        payload.total_commits = 1;
        payload.compare_url.clear();

        let message = rendered(ChatConvertor::<PlainMarkup>::new().push(&payload));

        assert!(message.text.contains("] 1 new commit pushed by alice"));
    }

    #[test]
    fn push_without_commits_has_no_attachment() {
        let mut payload = push_payload();
        payload.commits.clear();
        payload.total_commits = 0;

        let message = rendered(ChatConvertor::<PlainMarkup>::new().push(&payload));

        assert!(message.attachment.is_none());
        assert!(message.text.contains("0 new commits"));
    }
}

mod issues {
    use super::*;

    #[test]
    fn opened_issue_carries_its_body() {
        let message = rendered(
            ChatConvertor::<PlainMarkup>::new().issue(&issue_payload("opened", "It panics.")),
        );

        assert_eq!(
            message.text,
            "[[alice/widgets](https://forge.example/alice/widgets)] Issue opened: \
             [#12 Crash on start](https://forge.example/alice/widgets/issues/12) by bob"
        );
        let attachment = message.attachment.unwrap();
        assert_eq!(attachment.title, "#12 Crash on start");
        assert_eq!(attachment.text, "It panics.");
    }

    #[test]
    fn other_actions_have_no_attachment() {
        let message = rendered(
            ChatConvertor::<PlainMarkup>::new().issue(&issue_payload("label_updated", "body")),
        );

        assert!(message.text.contains("Issue label updated:"));
        assert!(message.attachment.is_none());
    }

    #[test]
    fn comment_links_to_the_comment() {
        let message = rendered(
            ChatConvertor::<PlainMarkup>::new().issue_comment(&issue_comment_payload("+1")),
        );

        assert!(message.text.contains("New comment on issue [#12 Crash on start]"));
        assert!(message.text.contains("issues/12#issuecomment-3"));
        assert_eq!(message.full_text("\n").lines().last(), Some("+1"));
    }
}

mod other_events {
    use super::*;

    #[test]
    fn created_tag_links_to_source() {
        let message = rendered(ChatConvertor::<PlainMarkup>::new().create(&create_tag_payload()));

        assert!(
            message
                .text
                .ends_with("tag [v1.0](https://forge.example/alice/widgets/src/tag/v1.0) created by alice")
        );
    }

    #[test]
    fn review_uses_kind_and_content() {
        let payload = PullRequestPayload {
            action: "reviewed".into(),
            number: 3,
            pull_request: PullRequest {
                number: 3,
                title: "Speed up".into(),
                html_url: "https://forge.example/alice/widgets/pulls/3".into(),
                ..PullRequest::default()
            },
            repository: repository(),
            sender: user("carol"),
            review: Some(ReviewPayload {
                kind: "pull_request_review_approved".into(),
                content: "LGTM".into(),
            }),
        };

        let message = rendered(
            ChatConvertor::<HtmlMarkup>::new().review(&payload, ReviewKind::Approved),
        );

        assert!(message.text.contains("Pull request review approved:"));
        assert_eq!(message.full_text("<br>").rsplit("<br>").next(), Some("LGTM"));
    }

    #[test]
    fn wiki_without_comment_has_no_attachment() {
        let payload = WikiPayload {
            action: "edited".into(),
            repository: repository(),
            sender: user("alice"),
            page: "Home".into(),
            comment: String::new(),
        };

        let message = rendered(ChatConvertor::<PlainMarkup>::new().wiki(&payload));

        assert!(message.text.contains("Wiki page [Home](https://forge.example/alice/widgets/wiki/Home) edited"));
        assert_eq!(message.full_text("\n"), message.text);
    }
}
