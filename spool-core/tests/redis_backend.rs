//! Runs against a live Redis. Set `REDIS_URL` and pass `--ignored`.

#![cfg(feature = "redis")]

mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use spool_core::{
    BufferStore, EnqueueSettings, FlushBatch, FlushHandler, FlushKey,
    FlushOutcome, FlushQueue, FlushWorker, IngestError, IngestionEnqueuer,
    QueueSettings, RedisBufferStore, RedisFlushQueue, Result, ScheduleOutcome,
    derive_buffer_key,
};
use spool_model::ProjectId;
use support::event;

struct RedisHarness {
    url: String,
    namespace: String,
    store: RedisBufferStore,
    queue: RedisFlushQueue,
}

impl RedisHarness {
    async fn connect(label: &str, settings: QueueSettings) -> Option<Self> {
        let Some(url) = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
        else {
            eprintln!("skipping: REDIS_URL not set");
            return None;
        };

        // One namespace per run keeps parallel tests and reruns apart.
        let namespace = format!(
            "spool-test-{label}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let store = RedisBufferStore::connect(&url)
            .await
            .expect("buffer store connects");
        let queue = RedisFlushQueue::connect(&url, namespace.clone())
            .await
            .expect("flush queue connects")
            .with_settings(settings);

        Some(Self {
            url,
            namespace,
            store,
            queue,
        })
    }

    fn flush_key(&self, entity: &str) -> FlushKey {
        format!("{}:trace:{entity}:1", self.namespace)
            .parse()
            .expect("valid flush key")
    }

    fn project(&self) -> ProjectId {
        ProjectId::new(self.namespace.clone())
    }

    async fn cleanup(self) {
        let client = redis::Client::open(self.url.as_str()).expect("client");
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .expect("cleanup connection");
        let keys: Vec<String> = conn
            .keys(format!("*{}*", self.namespace))
            .await
            .expect("list test keys");
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.expect("delete test keys");
        }
    }
}

#[tokio::test]
#[ignore]
async fn redis_duplicate_schedule_leaves_attempts_alone() {
    let Some(h) =
        RedisHarness::connect("dedupe", QueueSettings::default()).await
    else {
        return;
    };
    let k = h.flush_key("t-1");

    assert_eq!(
        h.queue.schedule_flush(&k).await.unwrap(),
        ScheduleOutcome::Scheduled
    );
    assert_eq!(
        h.queue.schedule_flush(&k).await.unwrap(),
        ScheduleOutcome::AlreadyPending
    );
    assert_eq!(h.queue.pending().await.unwrap(), 1);

    let job = h.queue.claim().await.unwrap().expect("claimed");
    assert_eq!(job.flush_key, k);
    assert_eq!(job.attempts, 1);
    assert_eq!(
        h.queue.schedule_flush(&k).await.unwrap(),
        ScheduleOutcome::AlreadyPending
    );
    assert_eq!(h.queue.pending().await.unwrap(), 0);

    h.queue.release(&k).await.unwrap();
    assert_eq!(h.queue.pending().await.unwrap(), 1);
    let retry = h.queue.claim().await.unwrap().expect("claimed again");
    assert_eq!(retry.attempts, 2);

    h.queue.complete(&k).await.unwrap();
    assert!(h.queue.claim().await.unwrap().is_none());
    assert_eq!(h.queue.pending().await.unwrap(), 0);

    assert_eq!(
        h.queue.schedule_flush(&k).await.unwrap(),
        ScheduleOutcome::Scheduled
    );
    assert_eq!(h.queue.claim().await.unwrap().unwrap().attempts, 1);

    h.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn redis_claims_follow_schedule_order() {
    let Some(h) = RedisHarness::connect("order", QueueSettings::default()).await
    else {
        return;
    };
    let first = h.flush_key("a");
    let second = h.flush_key("b");
    h.queue.schedule_flush(&first).await.unwrap();
    h.queue.schedule_flush(&second).await.unwrap();

    assert_eq!(h.queue.claim().await.unwrap().unwrap().flush_key, first);
    assert_eq!(h.queue.claim().await.unwrap().unwrap().flush_key, second);

    h.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn redis_completing_a_rescheduled_job_requeues_it_fresh() {
    let Some(h) =
        RedisHarness::connect("requeue", QueueSettings::default()).await
    else {
        return;
    };
    let k = h.flush_key("t-1");
    h.queue.schedule_flush(&k).await.unwrap();
    h.queue.claim().await.unwrap().expect("claimed");
    h.queue.schedule_flush(&k).await.unwrap();

    h.queue.complete(&k).await.unwrap();
    assert_eq!(h.queue.pending().await.unwrap(), 1);
    assert_eq!(h.queue.claim().await.unwrap().unwrap().attempts, 1);

    h.queue.complete(&k).await.unwrap();
    assert_eq!(h.queue.pending().await.unwrap(), 0);
    assert!(h.queue.claim().await.unwrap().is_none());

    h.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn redis_stalled_job_is_reclaimed() {
    let settings = QueueSettings {
        visibility_timeout: Duration::from_secs(1),
        job_ttl: Duration::from_secs(60),
    };
    let Some(h) = RedisHarness::connect("stalled", settings).await else {
        return;
    };
    let k = h.flush_key("t-1");
    h.queue.schedule_flush(&k).await.unwrap();
    h.queue.claim().await.unwrap().expect("claimed by a worker that dies");
    assert!(h.queue.claim().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let retry = h.queue.claim().await.unwrap().expect("reclaimed");
    assert_eq!(retry.flush_key, k);
    assert_eq!(retry.attempts, 2);

    h.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn redis_job_hash_expires() {
    let settings = QueueSettings {
        visibility_timeout: Duration::from_secs(30),
        job_ttl: Duration::from_secs(45),
    };
    let Some(h) = RedisHarness::connect("job-ttl", settings).await else {
        return;
    };
    let k = h.flush_key("t-1");
    h.queue.schedule_flush(&k).await.unwrap();

    let client = redis::Client::open(h.url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let ttl: i64 = conn
        .pttl(format!("{}:job:{k}", h.namespace))
        .await
        .unwrap();
    assert!(ttl > 0 && ttl <= 45_000, "unexpected job ttl {ttl}");

    h.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn redis_buffer_read_keeps_order_and_trim_keeps_later_appends() {
    let Some(h) = RedisHarness::connect("buffer", QueueSettings::default()).await
    else {
        return;
    };
    let buffer_key = derive_buffer_key(&h.flush_key("t-1"));

    h.store.append(&buffer_key, "one".into()).await.unwrap();
    h.store.append(&buffer_key, "two".into()).await.unwrap();
    h.store
        .set_expiry(&buffer_key, Duration::from_secs(60))
        .await
        .unwrap();

    let seen = h.store.read(&buffer_key).await.unwrap();
    assert_eq!(seen, vec!["one", "two"]);
    h.store.append(&buffer_key, "three".into()).await.unwrap();

    h.store.trim_front(&buffer_key, seen.len()).await.unwrap();
    assert_eq!(h.store.read(&buffer_key).await.unwrap(), vec!["three"]);

    h.store.trim_front(&buffer_key, 1).await.unwrap();
    assert_eq!(h.store.len(&buffer_key).await.unwrap(), 0);
    assert!(h.store.read(&buffer_key).await.unwrap().is_empty());

    h.cleanup().await;
}

#[derive(Default)]
struct FlakyHandler {
    fail: AtomicBool,
    flushed: tokio::sync::Mutex<Vec<FlushBatch>>,
}

#[async_trait]
impl FlushHandler for FlakyHandler {
    async fn handle(&self, batch: FlushBatch) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestError::Handler("downstream offline".into()));
        }
        self.flushed.lock().await.push(batch);
        Ok(())
    }
}

#[tokio::test]
#[ignore]
async fn redis_enqueue_and_flush_round_trip_survives_handler_failure() {
    let Some(h) =
        RedisHarness::connect("round-trip", QueueSettings::default()).await
    else {
        return;
    };
    let store = Arc::new(h.store.clone());
    let queue = Arc::new(h.queue.clone());
    let enqueuer = IngestionEnqueuer::new(EnqueueSettings::default())
        .with_store(store.clone())
        .with_queue(queue.clone());
    let worker = FlushWorker::new(store, queue);

    let create = event("trace-create", Some("trace-a"));
    let update = event("trace-create", Some("trace-a"));
    let summary = enqueuer
        .enqueue_batch(&h.project(), vec![create.clone(), update.clone()])
        .await
        .unwrap();
    assert_eq!(summary.flush_keys.len(), 1);
    assert_eq!(h.queue.pending().await.unwrap(), 1);

    let handler = FlakyHandler::default();
    handler.fail.store(true, Ordering::SeqCst);
    let outcome = worker.run_once(&handler).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Released { .. }));

    handler.fail.store(false, Ordering::SeqCst);
    let outcome = worker.run_once(&handler).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Flushed { events: 2, .. }));

    let flushed = handler.flushed.lock().await;
    assert_eq!(flushed[0].attempts, 2);
    assert_eq!(flushed[0].parts.project_id, h.project());
    assert_eq!(flushed[0].events[0].event, create);
    assert_eq!(flushed[0].events[1].event, update);
    drop(flushed);

    let buffer_key = derive_buffer_key(&summary.flush_keys[0]);
    assert_eq!(h.store.len(&buffer_key).await.unwrap(), 0);
    assert_eq!(h.queue.pending().await.unwrap(), 0);

    h.cleanup().await;
}
