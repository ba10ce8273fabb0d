//! Tests for the run module.

use super::*;

use forge_hooks::config::{Cli, ValidatedConfig};
use forge_hooks::model::{HookType, Webhook};

const PUSH: &str = r#"{"ref":"refs/heads/main","after":"0d1a26e"}"#;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store_path(&self) -> PathBuf {
        self.dir.path().join("store.json")
    }

    fn config(&self, extra: &[&str]) -> ValidatedConfig {
        let store = self.store_path();
        let mut args = vec!["forge-hooks", "--store", store.to_str().unwrap()];
        args.extend(extra);
        ValidatedConfig::from_raw(&Cli::parse_from_iter(args), None).unwrap()
    }

    fn disabled(&self) -> ValidatedConfig {
        self.config(&["--disable-deliveries"])
    }

    fn payload(&self, content: &str) -> PathBuf {
        let path = self.dir.path().join("payload.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn webhook(&self, webhook: Webhook) -> i64 {
        let store = FileStore::open(self.store_path()).unwrap();
        store.insert_webhook(webhook).await.unwrap().id
    }

    async fn task(&self, id: i64) -> HookTask {
        let store = FileStore::open(self.store_path()).unwrap();
        store.get_task(id).await.unwrap()
    }
}

fn gitea() -> Webhook {
    Webhook::new(HookType::Gitea, "https://ci.example/hook")
}

fn submit(hook_id: i64, payload: PathBuf) -> Action {
    Action::Submit {
        hook_id,
        event: HookEventType::Push,
        payload,
        legacy: true,
    }
}

mod run_error {
    use super::*;

    #[test]
    fn delivery_failed_names_the_task() {
        let error = RunError::DeliveryFailed { task_id: 7 };
        assert_eq!(error.to_string(), "Delivery of task 7 failed");
    }

    #[test]
    fn store_error_displays_source() {
        let error = RunError::from(StoreError::WebhookNotFound(3));
        assert!(error.to_string().starts_with("Store error:"));
    }

    #[test]
    fn payload_read_names_the_file() {
        let error = RunError::PayloadRead {
            path: PathBuf::from("push.json"),
            source: std::io::Error::other("gone"),
        };
        assert_eq!(
            error.to_string(),
            "Failed to read payload file 'push.json': gone"
        );
    }
}

mod submit {
    use super::*;

    #[tokio::test]
    async fn submitted_task_is_recorded() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea()).await;

        execute(ws.disabled(), submit(hook_id, ws.payload(PUSH)))
            .await
            .unwrap();

        let task = ws.task(1).await;
        assert_eq!(task.hook_id, hook_id);
        assert_eq!(task.payload_content, PUSH);
        assert!(task.is_legacy_payload());
        assert!(task.is_delivered);
        assert!(!task.is_succeed);
        assert!(task.delivered.is_some());
        assert_eq!(task.request_info.unwrap().body, PUSH);
    }

    #[tokio::test]
    async fn inactive_webhook_is_not_called() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea().inactive()).await;

        execute(ws.config(&[]), submit(hook_id, ws.payload(PUSH)))
            .await
            .unwrap();

        let task = ws.task(1).await;
        assert!(task.is_delivered);
        assert!(task.response_info.is_none());
    }

    #[tokio::test]
    async fn unknown_webhook_writes_nothing() {
        let ws = Workspace::new();

        let err = execute(ws.disabled(), submit(9, ws.payload(PUSH)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Store(StoreError::WebhookNotFound(9))
        ));
        assert!(!ws.store_path().exists());
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea()).await;

        let err = execute(ws.disabled(), submit(hook_id, ws.payload("{not json")))
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::PayloadParse { .. }));
        let store = FileStore::open(ws.store_path()).unwrap();
        assert!(store.find_undelivered_task_ids(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_file_is_reported() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea()).await;
        let missing = ws.dir.path().join("absent.json");

        let err = execute(ws.disabled(), submit(hook_id, missing))
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::PayloadRead { .. }));
    }
}

mod replay {
    use super::*;

    #[tokio::test]
    async fn replay_records_a_new_task() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea()).await;
        execute(ws.disabled(), submit(hook_id, ws.payload(PUSH)))
            .await
            .unwrap();
        let original = ws.task(1).await;

        execute(
            ws.disabled(),
            Action::Replay {
                hook_id,
                uuid: original.uuid.clone(),
            },
        )
        .await
        .unwrap();

        let copy = ws.task(2).await;
        assert_ne!(copy.uuid, original.uuid);
        assert_eq!(copy.payload_content, original.payload_content);
        assert!(copy.is_delivered);
        assert_eq!(ws.task(1).await, original);
    }

    #[tokio::test]
    async fn unknown_uuid_is_an_error() {
        let ws = Workspace::new();
        let hook_id = ws.webhook(gitea()).await;

        let err = execute(
            ws.disabled(),
            Action::Replay {
                hook_id,
                uuid: "missing".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            RunError::Store(StoreError::TaskUuidNotFound { .. })
        ));
    }
}

mod reporting {
    use super::*;

    fn task() -> HookTask {
        NewHookTask::new(1, HookEventType::Push, PUSH).into_task(5, "u-5".into())
    }

    #[test]
    fn failed_delivery_is_an_error() {
        let err = report(&task(), DeliveryOutcome::Failed).unwrap_err();

        assert!(matches!(err, RunError::DeliveryFailed { task_id: 5 }));
    }

    #[test]
    fn other_outcomes_succeed() {
        for outcome in [
            DeliveryOutcome::Succeeded,
            DeliveryOutcome::AlreadyClaimed,
            DeliveryOutcome::Skipped(SkipReason::Inactive),
            DeliveryOutcome::Skipped(SkipReason::DeliveriesDisabled),
        ] {
            assert!(report(&task(), outcome).is_ok());
        }
    }
}
