//! Redis store integration tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mediaq_models::{Job, JobResult, JobState, OperationKind, StorageMode, StoredArtifact};
use mediaq_queue::{JobStore, QueueConfig, RedisJobStore, Recovery};

const LEASE: Duration = Duration::from_secs(30);

/// Config on a throwaway queue name so tests do not see each other's jobs.
fn test_config() -> QueueConfig {
    dotenvy::dotenv().ok();
    QueueConfig {
        queue_name: format!("test-{}", uuid::Uuid::new_v4()),
        ..QueueConfig::from_env()
    }
}

async fn store_with(config: QueueConfig) -> RedisJobStore {
    let store = RedisJobStore::new(config).expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");
    store
}

async fn store() -> RedisJobStore {
    store_with(test_config()).await
}

fn job(max_attempts: u32) -> Job {
    Job::new(
        OperationKind::AudioExtract,
        "/tmp/in.mp4",
        serde_json::json!({"channels": 2}),
        max_attempts,
    )
}

fn success() -> JobResult {
    JobResult::single(
        StorageMode::Stateless,
        StoredArtifact::Local(PathBuf::from("/tmp/out.mp3")),
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_claim_complete() {
    let store = store().await;
    let id = store.enqueue(job(3)).await.expect("Failed to enqueue");

    let claimed = store
        .claim("w1", Duration::from_secs(1), LEASE)
        .await
        .expect("Failed to claim")
        .expect("No job claimed");
    assert_eq!(claimed.job.id, id);
    assert_eq!(claimed.job.state, JobState::Active);
    assert_eq!(claimed.job.attempts, 1);

    assert!(store
        .report_progress(&claimed.lease, serde_json::json!(50))
        .await
        .unwrap());
    assert!(store.report_terminal(&claimed.lease, success()).await.unwrap());
    assert!(!store.report_terminal(&claimed.lease, success()).await.unwrap());

    let snapshot = store.fetch(&id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.result, Some(success()));
    assert!(snapshot.finished_at.is_some());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_concurrent_claims_are_exclusive() {
    let store = Arc::new(store().await);
    store.enqueue(job(3)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .claim(&format!("w{i}"), Duration::from_millis(300), LEASE)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retry_goes_through_delayed_set() {
    let store = store().await;
    let id = store.enqueue(job(3)).await.unwrap();
    let claimed = store.claim("w1", Duration::from_secs(1), LEASE).await.unwrap().unwrap();

    assert!(store
        .retry_later(&claimed.lease, Duration::from_millis(100), "transient")
        .await
        .unwrap());
    assert_eq!(store.fetch(&id).await.unwrap().state, JobState::Queued);
    assert_eq!(store.promote_due().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.promote_due().await.unwrap(), 1);

    let again = store.claim("w2", Duration::from_secs(1), LEASE).await.unwrap().unwrap();
    assert_eq!(again.job.id, id);
    assert_eq!(again.job.attempts, 2);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_lease_is_recovered() {
    let store = store().await;
    let id = store.enqueue(job(1)).await.unwrap();
    store
        .claim("crashed", Duration::from_secs(1), Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let recovered = store.recover_stalled(StorageMode::Stateless).await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].recovery, Recovery::Failed);

    let snapshot = store.fetch(&id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failed);
    assert!(snapshot.result.unwrap().error.unwrap().contains("stalled"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unknown_job_is_not_found() {
    let store = store().await;
    let err = store.fetch(&mediaq_models::JobId::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_delivery_read_but_never_claimed_is_redelivered() {
    let config = QueueConfig {
        pending_idle: Duration::from_millis(50),
        ..test_config()
    };
    let prefix = config.key_prefix();
    let client = redis::Client::open(config.redis_url.as_str()).unwrap();
    let store = store_with(config).await;
    let id = store.enqueue(job(3)).await.unwrap();

    // A worker that read the message and died before its CLAIM script ran
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: redis::Value = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(format!("{prefix}:workers"))
        .arg("crashed")
        .arg("COUNT")
        .arg(1)
        .arg("STREAMS")
        .arg(format!("{prefix}:ready"))
        .arg(">")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert!(store.claim("w1", Duration::ZERO, LEASE).await.unwrap().is_none());
    assert_eq!(store.fetch(&id).await.unwrap().state, JobState::Queued);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let recovered = store.recover_stalled(StorageMode::Stateless).await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].job.id, id);
    assert_eq!(recovered[0].recovery, Recovery::Requeued);

    let claimed = store.claim("w2", Duration::from_secs(1), LEASE).await.unwrap().unwrap();
    assert_eq!(claimed.job.id, id);
    assert_eq!(claimed.job.attempts, 1);

    // The held delivery is left alone by later sweeps
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.recover_stalled(StorageMode::Stateless).await.unwrap().is_empty());
    assert!(store.report_terminal(&claimed.lease, success()).await.unwrap());
}
