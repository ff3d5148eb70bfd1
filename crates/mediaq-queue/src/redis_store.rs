//! Redis-backed job store.
//!
//! Layout under `mediaq:{queue}`:
//! - `:job:{id}`  hash holding the job record, lease token and stream message id
//! - `:ready`     stream read through the `:workers` consumer group
//! - `:delayed`   sorted set of backed-off job ids, scored by due time (ms)
//! - `:active`    sorted set of held job ids, scored by lease deadline (ms)
//!
//! A stream delivery is only a hint; the claim itself is the CLAIM script's
//! compare-and-swap on the hash `state` field, so a duplicate or stale
//! message can never activate a job twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamPendingCountReply, StreamReadReply};
use redis::{AsyncCommands, Script};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mediaq_models::{Job, JobId, JobResult, JobState, OperationKind, StorageMode};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{stalled_error, ClaimedJob, JobStore, Lease, RecoveredJob, Recovery};

/// Upper bound on jobs moved per maintenance pass.
const MAINTENANCE_BATCH: isize = 100;

macro_rules! held_fn {
    () => {
        r#"
local function held(key, token)
  return redis.call('HGET', key, 'state') == 'active'
    and redis.call('HGET', key, 'token') == token
end
"#
    };
}

/// KEYS: job, active. ARGV: token, worker, msg_id, now, deadline_ms, job_id.
const CLAIM: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'queued' then
  return false
end
local attempts = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
redis.call('HSET', KEYS[1], 'state', 'active', 'token', ARGV[1], 'worker', ARGV[2],
  'msg_id', ARGV[3], 'updated_at', ARGV[4], 'lease_deadline', ARGV[5])
redis.call('HDEL', KEYS[1], 'progress')
redis.call('ZADD', KEYS[2], ARGV[5], ARGV[6])
return attempts
"#;

/// KEYS: job, active. ARGV: token, deadline_ms, job_id.
const HEARTBEAT: &str = concat!(
    held_fn!(),
    r#"
if not held(KEYS[1], ARGV[1]) then return 0 end
redis.call('HSET', KEYS[1], 'lease_deadline', ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
return 1
"#
);

/// KEYS: job. ARGV: token, progress_json, now.
const PROGRESS: &str = concat!(
    held_fn!(),
    r#"
if not held(KEYS[1], ARGV[1]) then return 0 end
redis.call('HSET', KEYS[1], 'progress', ARGV[2], 'updated_at', ARGV[3])
return 1
"#
);

/// KEYS: job, active, stream, delayed. ARGV: token, error, now, due_ms, group, job_id.
const RETRY: &str = concat!(
    held_fn!(),
    r#"
if not held(KEYS[1], ARGV[1]) then return 0 end
local msg = redis.call('HGET', KEYS[1], 'msg_id')
redis.call('HSET', KEYS[1], 'state', 'queued', 'failed_reason', ARGV[2], 'updated_at', ARGV[3])
redis.call('HDEL', KEYS[1], 'token', 'worker', 'msg_id', 'lease_deadline', 'progress')
redis.call('ZREM', KEYS[2], ARGV[6])
if msg then
  redis.call('XACK', KEYS[3], ARGV[5], msg)
  redis.call('XDEL', KEYS[3], msg)
end
redis.call('ZADD', KEYS[4], ARGV[4], ARGV[6])
return 1
"#
);

/// KEYS: job, active, stream.
/// ARGV: token, state, result_json, failed_reason, now, retention_secs, group, job_id.
const TERMINAL: &str = concat!(
    held_fn!(),
    r#"
if not held(KEYS[1], ARGV[1]) then return 0 end
local msg = redis.call('HGET', KEYS[1], 'msg_id')
redis.call('HSET', KEYS[1], 'state', ARGV[2], 'result', ARGV[3],
  'finished_at', ARGV[5], 'updated_at', ARGV[5])
if ARGV[4] ~= '' then
  redis.call('HSET', KEYS[1], 'failed_reason', ARGV[4])
end
redis.call('HDEL', KEYS[1], 'token', 'worker', 'msg_id', 'lease_deadline')
redis.call('ZREM', KEYS[2], ARGV[8])
if msg then
  redis.call('XACK', KEYS[3], ARGV[7], msg)
  redis.call('XDEL', KEYS[3], msg)
end
redis.call('EXPIRE', KEYS[1], ARGV[6])
return 1
"#
);

/// KEYS: job, active, stream.
/// ARGV: now_ms, now, error, failure_json, retention_secs, group, job_id.
const RECOVER: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
  redis.call('ZREM', KEYS[2], ARGV[7])
  return false
end
local deadline = tonumber(redis.call('HGET', KEYS[1], 'lease_deadline'))
if deadline and deadline > tonumber(ARGV[1]) then
  return false
end
local msg = redis.call('HGET', KEYS[1], 'msg_id')
if msg then
  redis.call('XACK', KEYS[3], ARGV[6], msg)
  redis.call('XDEL', KEYS[3], msg)
end
redis.call('ZREM', KEYS[2], ARGV[7])
redis.call('HDEL', KEYS[1], 'token', 'worker', 'msg_id', 'lease_deadline', 'progress')
local attempts = tonumber(redis.call('HGET', KEYS[1], 'attempts')) or 0
local max = tonumber(redis.call('HGET', KEYS[1], 'max_attempts')) or 1
if attempts < max then
  redis.call('HSET', KEYS[1], 'state', 'queued', 'failed_reason', ARGV[3], 'updated_at', ARGV[2])
  redis.call('XADD', KEYS[3], '*', 'job_id', ARGV[7])
  return 'requeued'
end
redis.call('HSET', KEYS[1], 'state', 'failed', 'failed_reason', ARGV[3], 'result', ARGV[4],
  'finished_at', ARGV[2], 'updated_at', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[5])
return 'failed'
"#;

/// Settle a delivery left unacknowledged by a claim that never completed.
///
/// KEYS: stream. ARGV: msg_id, group, job_key_prefix.
const RESCUE: &str = r#"
local entries = redis.call('XRANGE', KEYS[1], ARGV[1], ARGV[1])
local job_id = nil
if entries[1] then
  local fields = entries[1][2]
  for i = 1, #fields, 2 do
    if fields[i] == 'job_id' then job_id = fields[i + 1] end
  end
end
local state = nil
if job_id then
  local key = ARGV[3] .. job_id
  state = redis.call('HGET', key, 'state')
  if state == 'active' and redis.call('HGET', key, 'msg_id') == ARGV[1] then
    return false
  end
end
redis.call('XACK', KEYS[1], ARGV[2], ARGV[1])
redis.call('XDEL', KEYS[1], ARGV[1])
if state == 'queued' then
  redis.call('XADD', KEYS[1], '*', 'job_id', job_id)
  return job_id
end
return false
"#;

/// KEYS: delayed, stream. ARGV: now_ms, limit, job_key_prefix.
const PROMOTE: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local promoted = 0
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  if redis.call('HGET', ARGV[3] .. id, 'state') == 'queued' then
    redis.call('XADD', KEYS[2], '*', 'job_id', id)
    promoted = promoted + 1
  end
end
return promoted
"#;

/// KEYS: job. ARGV: now.
const MARK_DOWNLOADED: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
redis.call('HSETNX', KEYS[1], 'downloaded_at', ARGV[1])
return 1
"#;

struct Scripts {
    claim: Script,
    heartbeat: Script,
    progress: Script,
    retry: Script,
    terminal: Script,
    recover: Script,
    rescue: Script,
    promote: Script,
    mark_downloaded: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            claim: Script::new(CLAIM),
            heartbeat: Script::new(HEARTBEAT),
            progress: Script::new(PROGRESS),
            retry: Script::new(RETRY),
            terminal: Script::new(TERMINAL),
            recover: Script::new(RECOVER),
            rescue: Script::new(RESCUE),
            promote: Script::new(PROMOTE),
            mark_downloaded: Script::new(MARK_DOWNLOADED),
        }
    }
}

/// Job store on Redis hashes, a stream and two sorted sets.
pub struct RedisJobStore {
    client: redis::Client,
    config: QueueConfig,
    scripts: Scripts,
    closed: AtomicBool,
}

impl RedisJobStore {
    /// Create a new store. No connection is made until [`init`](Self::init).
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            scripts: Scripts::load(),
            closed: AtomicBool::new(false),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group (ignored if it already exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key())
            .arg(self.group())
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.group()),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.group());
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.config.key_prefix())
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_key_prefix(), id)
    }

    fn stream_key(&self) -> String {
        format!("{}:ready", self.config.key_prefix())
    }

    fn group(&self) -> String {
        format!("{}:workers", self.config.key_prefix())
    }

    fn delayed_key(&self) -> String {
        format!("{}:delayed", self.config.key_prefix())
    }

    fn active_key(&self) -> String {
        format!("{}:active", self.config.key_prefix())
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, message_id: &str) -> QueueResult<()> {
        redis::pipe()
            .cmd("XACK")
            .arg(self.stream_key())
            .arg(self.group())
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(self.stream_key())
            .arg(message_id)
            .ignore()
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    async fn read_one(
        &self,
        conn: &mut MultiplexedConnection,
        consumer: &str,
        block: Option<Duration>,
    ) -> QueueResult<Option<(String, Option<String>)>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(self.group())
            .arg(consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(self.stream_key()).arg(">");

        let reply: Option<StreamReadReply> = cmd.query_async(conn).await?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        Ok(entry.map(|e| {
            let job_id = e.get::<String>("job_id");
            (e.id, job_id)
        }))
    }

    async fn fetch_with(&self, conn: &mut MultiplexedConnection, id: &JobId) -> QueueResult<Job> {
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Err(QueueError::not_found(id.as_str()));
        }
        decode_job(id, &fields)
    }

    /// Re-deliver jobs whose stream message was read but never claimed.
    ///
    /// `XREADGROUP` moves a message to the consumer's pending list before the
    /// CLAIM script runs. If the worker dies or the script call fails in
    /// between, the job hash stays `queued` with no live message. Deliveries
    /// idle for longer than `pending_idle` are settled here: still-queued jobs
    /// get a fresh message, stale ones are dropped, held ones are left alone.
    async fn rescue_pending(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> QueueResult<Vec<JobId>> {
        let mut rescued = Vec::new();
        let mut start = "-".to_string();

        // Deliveries of long-running held jobs are also idle; page past them
        loop {
            let pending: StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(self.stream_key())
                .arg(self.group())
                .arg("IDLE")
                .arg(self.config.pending_idle.as_millis() as u64)
                .arg(&start)
                .arg("+")
                .arg(MAINTENANCE_BATCH)
                .query_async(conn)
                .await?;

            let page_len = pending.ids.len();
            for entry in &pending.ids {
                let job_id: Option<String> = self
                    .scripts
                    .rescue
                    .key(self.stream_key())
                    .arg(&entry.id)
                    .arg(self.group())
                    .arg(self.job_key_prefix())
                    .invoke_async(conn)
                    .await?;

                match job_id {
                    Some(job_id) => {
                        info!(
                            "Re-delivered job {} abandoned by consumer {}",
                            job_id, entry.consumer
                        );
                        rescued.push(JobId::from(job_id));
                    }
                    None => debug!("Idle delivery {} needs no re-delivery", entry.id),
                }
            }

            match pending.ids.last() {
                Some(last) if page_len as isize == MAINTENANCE_BATCH => {
                    start = format!("({}", last.id);
                }
                _ => break,
            }
        }
        Ok(rescued)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let mut conn = self.conn().await?;
        let fields = encode_job(&job)?;

        let message_id: String = redis::pipe()
            .atomic()
            .hset_multiple(self.job_key(&job.id), fields.as_slice())
            .ignore()
            .cmd("XADD")
            .arg(self.stream_key())
            .arg("*")
            .arg("job_id")
            .arg(job.id.as_str())
            .query_async::<(String,)>(&mut conn)
            .await
            .map(|(id,)| id)?;

        info!("Enqueued job {} with message ID {}", job.id, message_id);
        Ok(job.id)
    }

    async fn claim(
        &self,
        worker_id: &str,
        wait: Duration,
        lease_for: Duration,
    ) -> QueueResult<Option<ClaimedJob>> {
        let deadline = Instant::now() + wait;
        let mut conn = self.conn().await?;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let block = (!remaining.is_zero()).then_some(remaining);

            let Some((message_id, job_id)) = self.read_one(&mut conn, worker_id, block).await?
            else {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                continue;
            };

            let Some(job_id) = job_id.map(JobId::from) else {
                warn!("Dropping malformed stream entry {}", message_id);
                self.ack(&mut conn, &message_id).await?;
                continue;
            };

            let lease_deadline = now_ms() + lease_for.as_millis() as i64;
            let token = Lease::new_token();

            let attempts: Option<u32> = self
                .scripts
                .claim
                .key(self.job_key(&job_id))
                .key(self.active_key())
                .arg(&token)
                .arg(worker_id)
                .arg(&message_id)
                .arg(timestamp(Utc::now()))
                .arg(lease_deadline)
                .arg(job_id.as_str())
                .invoke_async(&mut conn)
                .await?;

            let Some(attempts) = attempts else {
                // Evicted, already active elsewhere, or a duplicate delivery
                debug!("Skipping stale delivery {} for job {}", message_id, job_id);
                self.ack(&mut conn, &message_id).await?;
                continue;
            };

            let job = self.fetch_with(&mut conn, &job_id).await?;
            debug!("Worker {} claimed job {} (attempt {})", worker_id, job_id, attempts);

            return Ok(Some(ClaimedJob {
                job,
                lease: Lease {
                    job_id,
                    token,
                    attempt: attempts,
                },
            }));
        }
    }

    async fn heartbeat(&self, lease: &Lease, lease_for: Duration) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let extended: i32 = self
            .scripts
            .heartbeat
            .key(self.job_key(&lease.job_id))
            .key(self.active_key())
            .arg(&lease.token)
            .arg(now_ms() + lease_for.as_millis() as i64)
            .arg(lease.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn report_progress(
        &self,
        lease: &Lease,
        progress: serde_json::Value,
    ) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let updated: i32 = self
            .scripts
            .progress
            .key(self.job_key(&lease.job_id))
            .arg(&lease.token)
            .arg(serde_json::to_string(&progress)?)
            .arg(timestamp(Utc::now()))
            .invoke_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn retry_later(&self, lease: &Lease, delay: Duration, error: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let moved: i32 = self
            .scripts
            .retry
            .key(self.job_key(&lease.job_id))
            .key(self.active_key())
            .key(self.stream_key())
            .key(self.delayed_key())
            .arg(&lease.token)
            .arg(error)
            .arg(timestamp(Utc::now()))
            .arg(now_ms() + delay.as_millis() as i64)
            .arg(self.group())
            .arg(lease.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    async fn report_terminal(&self, lease: &Lease, result: JobResult) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let state = if result.success {
            JobState::Completed
        } else {
            JobState::Failed
        };
        let failed_reason = if result.success {
            String::new()
        } else {
            result.error.clone().unwrap_or_default()
        };
        let retention = self.config.retention_for(result.success).as_secs().max(1);

        let finished: i32 = self
            .scripts
            .terminal
            .key(self.job_key(&lease.job_id))
            .key(self.active_key())
            .key(self.stream_key())
            .arg(&lease.token)
            .arg(state.as_str())
            .arg(serde_json::to_string(&result)?)
            .arg(failed_reason)
            .arg(timestamp(Utc::now()))
            .arg(retention)
            .arg(self.group())
            .arg(lease.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(finished == 1)
    }

    async fn fetch(&self, id: &JobId) -> QueueResult<Job> {
        let mut conn = self.conn().await?;
        self.fetch_with(&mut conn, id).await
    }

    async fn recover_stalled(&self, mode: StorageMode) -> QueueResult<Vec<RecoveredJob>> {
        let mut conn = self.conn().await?;
        let now = now_ms();
        let candidates: Vec<String> = conn
            .zrangebyscore_limit(self.active_key(), "-inf", now, 0, MAINTENANCE_BATCH)
            .await?;

        let mut recovered = Vec::new();
        for raw_id in candidates {
            let id = JobId::from(raw_id);
            let attempts = match self.fetch_with(&mut conn, &id).await {
                Ok(job) => job.attempts,
                Err(QueueError::JobNotFound(_)) => {
                    conn.zrem::<_, _, ()>(self.active_key(), id.as_str()).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let error = stalled_error(attempts);

            let outcome: Option<String> = self
                .scripts
                .recover
                .key(self.job_key(&id))
                .key(self.active_key())
                .key(self.stream_key())
                .arg(now)
                .arg(timestamp(Utc::now()))
                .arg(&error)
                .arg(serde_json::to_string(&JobResult::failure(mode, error.clone()))?)
                .arg(self.config.failed_retention.as_secs().max(1))
                .arg(self.group())
                .arg(id.as_str())
                .invoke_async(&mut conn)
                .await?;

            let recovery = match outcome.as_deref() {
                Some("requeued") => {
                    info!("Requeued stalled job {}", id);
                    Recovery::Requeued
                }
                Some("failed") => {
                    warn!("Failed stalled job {} after {} attempts", id, attempts);
                    Recovery::Failed
                }
                _ => continue,
            };

            let job = self.fetch_with(&mut conn, &id).await?;
            recovered.push(RecoveredJob { job, recovery });
        }

        for id in self.rescue_pending(&mut conn).await? {
            match self.fetch_with(&mut conn, &id).await {
                Ok(job) => recovered.push(RecoveredJob {
                    job,
                    recovery: Recovery::Requeued,
                }),
                Err(QueueError::JobNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let promoted: usize = self
            .scripts
            .promote
            .key(self.delayed_key())
            .key(self.stream_key())
            .arg(now_ms())
            .arg(MAINTENANCE_BATCH)
            .arg(self.job_key_prefix())
            .invoke_async(&mut conn)
            .await?;
        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    async fn mark_downloaded(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let found: i32 = self
            .scripts
            .mark_downloaded
            .key(self.job_key(id))
            .arg(timestamp(Utc::now()))
            .invoke_async(&mut conn)
            .await?;
        if found == 0 {
            return Err(QueueError::not_found(id.as_str()));
        }
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_job(job: &Job) -> QueueResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        ("id", job.id.to_string()),
        ("operation", job.operation.as_str().to_string()),
        ("input_path", job.input_path.to_string_lossy().to_string()),
        ("options", serde_json::to_string(&job.options)?),
        ("attempts", job.attempts.to_string()),
        ("max_attempts", job.max_attempts.to_string()),
        ("state", job.state.as_str().to_string()),
        ("created_at", timestamp(job.created_at)),
        ("updated_at", timestamp(job.updated_at)),
    ];
    if let Some(progress) = &job.progress {
        fields.push(("progress", serde_json::to_string(progress)?));
    }
    if let Some(result) = &job.result {
        fields.push(("result", serde_json::to_string(result)?));
    }
    if let Some(reason) = &job.failed_reason {
        fields.push(("failed_reason", reason.clone()));
    }
    Ok(fields)
}

fn decode_job(id: &JobId, fields: &HashMap<String, String>) -> QueueResult<Job> {
    let corrupt = |msg: String| QueueError::corrupt(id.as_str(), msg);
    let required = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| corrupt(format!("missing field {name}")))
    };
    let parse_ts = |name: &str, raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad {name}: {e}")))
    };
    let optional_ts = |name: &str| {
        fields
            .get(name)
            .map(|raw| parse_ts(name, raw))
            .transpose()
    };

    let operation: OperationKind = required("operation")?
        .parse()
        .map_err(|e: mediaq_models::UnknownOperation| corrupt(e.to_string()))?;
    let state: JobState = required("state")?.parse().map_err(corrupt)?;
    let attempts = required("attempts")?
        .parse()
        .map_err(|_| corrupt("bad attempts".to_string()))?;
    let max_attempts = required("max_attempts")?
        .parse()
        .map_err(|_| corrupt("bad max_attempts".to_string()))?;

    Ok(Job {
        id: id.clone(),
        operation,
        input_path: required("input_path")?.into(),
        options: serde_json::from_str(required("options")?)?,
        attempts,
        max_attempts,
        state,
        progress: fields
            .get("progress")
            .map(|raw| serde_json::from_str(raw))
            .transpose()?,
        result: fields
            .get("result")
            .map(|raw| serde_json::from_str(raw))
            .transpose()?,
        failed_reason: fields.get("failed_reason").cloned(),
        created_at: parse_ts("created_at", required("created_at")?)?,
        updated_at: parse_ts("updated_at", required("updated_at")?)?,
        finished_at: optional_ts("finished_at")?,
        downloaded_at: optional_ts("downloaded_at")?,
    })
}
