//! Redis job store.
//!
//! Each job is a JSON string under `{prefix}job:{id}`. Updates read the
//! record, apply the transition locally, and write it back with a Lua
//! compare-and-set so a concurrent writer forces a retry instead of a
//! lost update. The write that makes a job terminal also sets its TTL.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};

use cadhub_core::error::AppError;
use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;
use cadhub_entity::job::{Job, Transition};

use super::client::{RedisClient, map_err};
use crate::keys;
use crate::traits::JobStore;

/// KEYS[1] = job key, ARGV[1] = expected payload, ARGV[2] = new payload,
/// ARGV[3] = TTL in seconds (0 keeps the record without expiry).
const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    local ttl = tonumber(ARGV[3])
    if ttl > 0 then
        redis.call('SET', KEYS[1], ARGV[2], 'EX', ttl)
    else
        redis.call('SET', KEYS[1], ARGV[2])
    end
    return 1
end
return 0
"#;

const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Redis-backed job store.
#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: RedisClient,
    retention: Duration,
}

impl RedisJobStore {
    /// Create a store on an existing client; finished jobs expire after `retention`.
    pub fn new(client: RedisClient, retention: Duration) -> Self {
        Self { client, retention }
    }

    async fn read_raw(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = conn.get(key).await.map_err(map_err)?;
        Ok(raw)
    }
}

/// TTL to write along with `job`: the retention once it is terminal, else none.
pub(crate) fn expiry_seconds(job: &Job, retention: Duration) -> u64 {
    if job.state.is_terminal() {
        retention.as_secs().max(1)
    } else {
        0
    }
}

/// Map the `SET NX` reply to the create contract.
pub(crate) fn check_created(created: bool, id: JobId) -> AppResult<()> {
    if created {
        Ok(())
    } else {
        Err(AppError::conflict(format!("Job {id} already exists")))
    }
}

/// Read-apply-swap loop behind [`JobStore::update`].
///
/// `read` returns the current payload; `swap(expected, next, ttl)` returns
/// whether the stored payload still equaled `expected` and was replaced.
/// Illegal transitions fail before any write.
pub(crate) async fn update_with_retries<R, RF, S, SF>(
    id: JobId,
    transition: &Transition,
    retention: Duration,
    mut read: R,
    mut swap: S,
) -> AppResult<Job>
where
    R: FnMut() -> RF,
    RF: Future<Output = AppResult<Option<String>>>,
    S: FnMut(String, String, u64) -> SF,
    SF: Future<Output = AppResult<bool>>,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let current = read()
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        let mut job: Job = serde_json::from_str(&current)?;
        job.apply(transition.clone())?;
        let next = serde_json::to_string(&job)?;
        let ttl = expiry_seconds(&job, retention);

        if swap(current, next, ttl).await? {
            debug!(job_id = %id, transition = transition.name(), state = %job.state, "Job updated");
            return Ok(job);
        }
        debug!(job_id = %id, attempt, "Concurrent job update detected, retrying");
    }

    warn!(job_id = %id, "Job update kept losing the compare-and-set race");
    Err(AppError::broker(format!(
        "Job {id} could not be updated after {MAX_UPDATE_ATTEMPTS} attempts"
    )))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        let key = self.client.prefixed_key(&keys::job(job.id));
        let payload = serde_json::to_string(job)?;
        let mut conn = self.client.conn_mut();
        let created: bool = conn.set_nx(&key, payload).await.map_err(map_err)?;
        check_created(created, job.id)
    }

    async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
        let key = self.client.prefixed_key(&keys::job(id));
        match self.read_raw(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: JobId, transition: Transition) -> AppResult<Job> {
        let key = self.client.prefixed_key(&keys::job(id));
        let script = Script::new(COMPARE_AND_SET);

        update_with_retries(
            id,
            &transition,
            self.retention,
            || self.read_raw(&key),
            |current, next, ttl| {
                let mut conn = self.client.conn_mut();
                let mut invocation = script.key(&key);
                invocation.arg(current).arg(next).arg(ttl);
                async move {
                    let swapped: i32 = invocation
                        .invoke_async(&mut conn)
                        .await
                        .map_err(map_err)?;
                    Ok(swapped == 1)
                }
            },
        )
        .await
    }

    async fn delete(&self, id: JobId) -> AppResult<bool> {
        let key = self.client.prefixed_key(&keys::job(id));
        let mut conn = self.client.conn_mut();
        let removed: u64 = conn.del(&key).await.map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}
