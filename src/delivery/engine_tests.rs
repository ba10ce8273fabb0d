//! Tests for the engine lifecycle and the recovery scan.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::deliverer::Deliverer;
use super::engine::{Engine, EngineConfig, EngineError, populate_queue, replay_hook_task};
use super::queue::UniqueQueue;
use crate::crypto::AuthorizationCipher;
use crate::handler::HandlerRegistry;
use crate::model::{HookEventType, HookTask, HookType, NewHookTask, Webhook};
use crate::repo::mock::MockReader;
use crate::store::{HookStore, MemoryStore, StoreError};
use crate::transport::TransportConfig;
use crate::transport::mock::{MockClient, MockReply};

const PUSH: &str = r#"{"ref":"refs/heads/main"}"#;

fn config(workers: usize) -> EngineConfig {
    EngineConfig {
        workers,
        deliveries_disabled: false,
        shutdown_timeout: Duration::from_secs(5),
        rescan_interval: None,
        transport: TransportConfig {
            timeout: Duration::from_secs(5),
            skip_tls_verify: false,
            proxy_url: None,
            proxy_hosts: Vec::new(),
            allowed_host_list: "external".into(),
        },
        app_url: "https://forge.example/".into(),
        secret_key: "test-key".into(),
    }
}

fn deliverer(store: &Arc<MemoryStore>, client: &MockClient) -> Deliverer<MemoryStore, MockClient> {
    let registry = Arc::new(HandlerRegistry::new(
        Arc::new(MockReader::new()),
        "https://forge.example/",
    ));
    Deliverer::new(
        Arc::clone(store),
        client.clone(),
        registry,
        AuthorizationCipher::new("test-key"),
    )
}

async fn webhook(store: &MemoryStore) -> i64 {
    store
        .insert_webhook(Webhook::new(HookType::Gitea, "https://ci.example/hook"))
        .await
        .unwrap()
        .id
}

fn push(hook_id: i64) -> NewHookTask {
    NewHookTask::new(hook_id, HookEventType::Push, PUSH).legacy()
}

async fn seed(store: &MemoryStore, hook_id: i64, count: usize) -> Vec<HookTask> {
    let mut tasks = Vec::with_capacity(count);
    for _ in 0..count {
        tasks.push(store.create_task(push(hook_id)).await.unwrap());
    }
    tasks
}

/// Polls until `client` saw `count` requests.
async fn wait_for_requests(client: &MockClient, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.request_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("requests did not arrive in time");
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn pending_tasks_are_delivered_on_start() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new();
        let hook_id = webhook(&store).await;
        let tasks = seed(&store, hook_id, 3).await;

        let engine = Engine::start(deliverer(&store, &client), &config(2));
        engine.wait_idle().await;

        assert_eq!(client.request_count(), 3);
        for task in tasks {
            let recorded = store.get_task(task.id).await.unwrap();
            assert!(recorded.is_delivered);
            assert!(recorded.is_succeed);
            assert!(recorded.delivered.is_some());
        }
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn submitted_task_is_delivered() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new();
        let hook_id = webhook(&store).await;
        let engine = Engine::start(deliverer(&store, &client), &config(1));

        let task = engine.submit(push(hook_id)).await.unwrap();
        engine.wait_idle().await;

        assert!(store.get_task(task.id).await.unwrap().is_succeed);
        assert_eq!(client.request_count(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn replay_sends_a_fresh_copy() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new().with_status(500, "down");
        let hook_id = webhook(&store).await;
        let original = seed(&store, hook_id, 1).await.remove(0);
        let engine = Engine::start(deliverer(&store, &client), &config(1));
        engine.wait_idle().await;
        let failed = store.get_task(original.id).await.unwrap();

        let copy = engine.replay(hook_id, &original.uuid).await.unwrap();
        engine.wait_idle().await;

        assert_ne!(copy.id, original.id);
        assert_ne!(copy.uuid, original.uuid);
        assert_eq!(client.request_count(), 2);
        assert!(store.get_task(copy.id).await.unwrap().is_succeed);
        assert_eq!(store.get_task(original.id).await.unwrap(), failed);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn claimed_but_unfinished_tasks_stay_put() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new();
        let hook_id = webhook(&store).await;
        let stuck = seed(&store, hook_id, 1).await.remove(0);
        store.mark_task_delivered(stuck.id).await.unwrap();

        let engine = Engine::start(deliverer(&store, &client), &config(1));
        engine.wait_idle().await;

        assert_eq!(client.request_count(), 0);
        assert!(store.get_task(stuck.id).await.unwrap().is_unfinalized());
        engine.shutdown().await;
    }
}

mod concurrency {
    use super::*;

    fn hanging(count: usize) -> MockClient {
        (0..count).fold(MockClient::new(), |client, _| {
            client.with_reply(MockReply::Hang)
        })
    }

    #[tokio::test]
    async fn worker_count_bounds_in_flight_requests() {
        let store = Arc::new(MemoryStore::new());
        let client = hanging(4);
        let hook_id = webhook(&store).await;
        let engine = Engine::start(deliverer(&store, &client), &config(2));

        for _ in 0..4 {
            engine.submit(push(hook_id)).await.unwrap();
        }
        wait_for_requests(&client, 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.request_count(), 2);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_records_cancelled_requests() {
        let store = Arc::new(MemoryStore::new());
        let client = hanging(3);
        let hook_id = webhook(&store).await;
        let engine = Engine::start(deliverer(&store, &client), &config(2));
        let tasks = [
            engine.submit(push(hook_id)).await.unwrap(),
            engine.submit(push(hook_id)).await.unwrap(),
            engine.submit(push(hook_id)).await.unwrap(),
        ];
        wait_for_requests(&client, 2).await;

        engine.shutdown().await;

        let mut cancelled = 0;
        let mut pending = 0;
        for task in &tasks {
            let recorded = store.get_task(task.id).await.unwrap();
            if recorded.is_delivered {
                assert_eq!(
                    recorded.response_info.unwrap().body,
                    "Delivery: Request cancelled"
                );
                assert!(recorded.delivered.is_some());
                cancelled += 1;
            } else {
                pending += 1;
            }
        }
        assert_eq!((cancelled, pending), (2, 1));
        assert_eq!(store.find_undelivered_task_ids(0).await.unwrap().len(), 1);
    }
}

mod recovery {
    use super::*;

    #[tokio::test]
    async fn scan_walks_every_page() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;
        let tasks = seed(&store, hook_id, 250).await;
        let claimed: Vec<i64> = tasks.iter().step_by(10).map(|t| t.id).collect();
        for id in &claimed {
            store.mark_task_delivered(*id).await.unwrap();
        }
        let queue = UniqueQueue::new();

        let queued = populate_queue(&store, &queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(queued, 225);
        assert_eq!(queue.len(), 225);
        assert!(claimed.iter().all(|id| !queue.contains(*id)));
        assert!(queue.contains(tasks[249].id));
    }

    #[tokio::test]
    async fn already_queued_ids_are_not_counted() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;
        let tasks = seed(&store, hook_id, 3).await;
        let queue = UniqueQueue::new();
        queue.push(tasks[1].id).unwrap();

        let queued = populate_queue(&store, &queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(queued, 2);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_scan_queues_nothing() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;
        seed(&store, hook_id, 3).await;
        let queue = UniqueQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(populate_queue(&store, &queue, &cancel).await.unwrap(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn closed_queue_ends_the_scan() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;
        seed(&store, hook_id, 3).await;
        let queue = UniqueQueue::new();
        queue.close();

        let queued = populate_queue(&store, &queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(queued, 0);
    }

    #[tokio::test]
    async fn replay_copies_event_and_payload() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;
        let original = seed(&store, hook_id, 1).await.remove(0);

        let copy = replay_hook_task(&store, hook_id, &original.uuid)
            .await
            .unwrap();

        assert_eq!(copy.event_type, original.event_type);
        assert_eq!(copy.payload_content, original.payload_content);
        assert_eq!(copy.payload_version, original.payload_version);
        assert!(!copy.is_delivered);
        assert_eq!(store.find_undelivered_task_ids(0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn replay_of_unknown_uuid_fails() {
        let store = MemoryStore::new();
        let hook_id = webhook(&store).await;

        let err = replay_hook_task(&store, hook_id, "missing")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::TaskUuidNotFound { .. }));
    }
}

mod rescan {
    use super::*;

    #[tokio::test]
    async fn task_written_after_start_is_delivered() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new();
        let hook_id = webhook(&store).await;
        let mut config = config(1);
        config.rescan_interval = Some(Duration::from_millis(20));
        let engine = Engine::start(deliverer(&store, &client), &config);
        engine.wait_idle().await;

        // Written around the engine, as another process sharing the store would.
        let late = store.create_task(push(hook_id)).await.unwrap();
        wait_for_requests(&client, 1).await;
        engine.wait_idle().await;

        assert!(store.get_task(late.id).await.unwrap().is_succeed);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn startup_scan_only_without_interval() {
        let store = Arc::new(MemoryStore::new());
        let client = MockClient::new();
        let hook_id = webhook(&store).await;
        let engine = Engine::start(deliverer(&store, &client), &config(1));
        engine.wait_idle().await;

        let late = store.create_task(push(hook_id)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(client.request_count(), 0);
        assert!(!store.get_task(late.id).await.unwrap().is_delivered);
        engine.shutdown().await;
    }
}

mod init {
    use super::*;

    fn reader() -> Arc<MockReader> {
        Arc::new(MockReader::new())
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let store = Arc::new(MemoryStore::new());

        let Err(err) = Engine::init(&config(0), store, reader()) else {
            panic!("engine started without workers");
        };

        assert!(matches!(err, EngineError::NoWorkers));
    }

    #[tokio::test]
    async fn invalid_allow_list_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut config = config(1);
        config.transport.allowed_host_list = "external,{ci".into();

        let Err(err) = Engine::init(&config, store, reader()) else {
            panic!("engine started with a broken allow-list");
        };

        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn starts_and_stops_with_empty_store() {
        let store = Arc::new(MemoryStore::new());

        let Ok(engine) = Engine::init(&config(2), store, reader()) else {
            panic!("engine did not start");
        };
        engine.wait_idle().await;

        assert!(engine.queue().is_empty());
        engine.shutdown().await;
    }
}
