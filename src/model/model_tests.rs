//! Tests for the data model.

use super::*;

mod event_type {
    use super::*;

    #[test]
    fn issue_sub_kinds_collapse_to_issues() {
        for event in [
            HookEventType::Issues,
            HookEventType::IssueAssign,
            HookEventType::IssueLabel,
            HookEventType::IssueMilestone,
        ] {
            assert_eq!(event.event(), "issues", "{event}");
        }
    }

    #[test]
    fn pull_request_sub_kinds_collapse_to_pull_request() {
        for event in [
            HookEventType::PullRequest,
            HookEventType::PullRequestAssign,
            HookEventType::PullRequestLabel,
            HookEventType::PullRequestMilestone,
            HookEventType::PullRequestSync,
            HookEventType::PullRequestReviewRequest,
        ] {
            assert_eq!(event.event(), "pull_request", "{event}");
        }
    }

    #[test]
    fn comments_share_issue_comment() {
        assert_eq!(HookEventType::IssueComment.event(), "issue_comment");
        assert_eq!(HookEventType::PullRequestComment.event(), "issue_comment");
    }

    #[test]
    fn reviews_have_dedicated_names() {
        assert_eq!(
            HookEventType::PullRequestReviewApproved.event(),
            "pull_request_approved"
        );
        assert_eq!(
            HookEventType::PullRequestReviewRejected.event(),
            "pull_request_rejected"
        );
        assert_eq!(
            HookEventType::PullRequestReviewComment.event(),
            "pull_request_comment"
        );
    }

    #[test]
    fn plain_events_map_to_themselves() {
        for event in [
            HookEventType::Create,
            HookEventType::Delete,
            HookEventType::Fork,
            HookEventType::Push,
            HookEventType::Wiki,
            HookEventType::Repository,
            HookEventType::Release,
            HookEventType::Package,
        ] {
            assert_eq!(event.event(), event.as_str());
        }
    }

    #[test]
    fn parse_accepts_every_wire_name() {
        for event in HookEventType::ALL {
            assert_eq!(event.as_str().parse::<HookEventType>().unwrap(), event);
        }
    }

    #[test]
    fn parse_rejects_unknown_name() {
        let err = "star".parse::<HookEventType>().unwrap_err();
        assert!(err.to_string().contains("star"));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&HookEventType::PullRequestReviewApproved).unwrap();
        assert_eq!(json, "\"pull_request_review_approved\"");
    }
}

mod webhook {
    use super::*;

    #[test]
    fn hook_type_round_trips_through_from_str() {
        assert_eq!(
            "sourcehut_builds".parse::<HookType>().unwrap(),
            HookType::SourcehutBuilds
        );
        assert!("discord".parse::<HookType>().is_err());
    }

    #[test]
    fn unknown_content_type_deserializes_to_unknown() {
        let ct: ContentType = serde_json::from_str("\"xml\"").unwrap();
        assert_eq!(ct, ContentType::Unknown);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let hook: Webhook =
            serde_json::from_str(r#"{"id":3,"hook_type":"gitea","url":"http://x"}"#).unwrap();

        assert!(hook.is_active);
        assert_eq!(hook.content_type, ContentType::Json);
        assert_eq!(hook.last_status, HookStatus::None);
        assert!(hook.secret.is_empty());
    }
}

mod task {
    use super::*;

    #[test]
    fn new_task_is_typed_and_pending() {
        let task = NewHookTask::new(1, HookEventType::Push, "{}").into_task(7, "u".into());

        assert_eq!(task.payload_version, HookTask::TYPED_PAYLOAD);
        assert!(!task.is_legacy_payload());
        assert!(!task.is_delivered);
        assert!(task.delivered.is_none());
    }

    #[test]
    fn legacy_marks_version_one() {
        let new = NewHookTask::new(1, HookEventType::Push, "{}").legacy();
        assert_eq!(new.payload_version, 1);
    }

    #[test]
    fn unfinalized_means_claimed_without_timestamp() {
        let mut task = NewHookTask::new(1, HookEventType::Push, "{}").into_task(1, "u".into());
        assert!(!task.is_unfinalized());

        task.is_delivered = true;
        assert!(task.is_unfinalized());

        task.delivered = Some(1);
        assert!(!task.is_unfinalized());
    }

    #[test]
    fn copy_keeps_payload_fields() {
        let task = NewHookTask::new(4, HookEventType::Release, "body")
            .legacy()
            .into_task(9, "u".into());
        let copy = NewHookTask::from(&task);

        assert_eq!(copy.hook_id, 4);
        assert_eq!(copy.event_type, HookEventType::Release);
        assert_eq!(copy.payload_content, "body");
        assert_eq!(copy.payload_version, 1);
    }
}
