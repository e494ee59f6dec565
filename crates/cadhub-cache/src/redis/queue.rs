//! Redis job queue.
//!
//! Ids are pushed onto a pending list and moved atomically onto a
//! processing list when claimed (`LMOVE`). Acknowledging removes the id
//! from the processing list, so anything left there after a crash is
//! still visible for inspection.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::Instant;
use tracing::{debug, warn};

use cadhub_core::result::AppResult;
use cadhub_core::types::id::JobId;

use super::client::{RedisClient, map_err};
use crate::keys;
use crate::traits::{Delivery, JobQueue};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Redis-backed job queue shared across processes.
#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    client: RedisClient,
    dequeue_timeout: Duration,
}

impl RedisJobQueue {
    /// Create a queue on an existing client.
    pub fn new(client: RedisClient, dequeue_timeout: Duration) -> Self {
        Self {
            client,
            dequeue_timeout,
        }
    }

    async fn claim(&self) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        let claimed: Option<String> = redis::cmd("LMOVE")
            .arg(self.client.prefixed_key(keys::PENDING_QUEUE))
            .arg(self.client.prefixed_key(keys::PROCESSING_QUEUE))
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(claimed)
    }
}

/// Turn a claimed list entry into a delivery; the entry itself is the receipt.
///
/// Entries that are not job ids are handed back for removal.
pub(crate) fn decode_claim(raw: String) -> Result<Delivery, String> {
    match raw.parse::<JobId>() {
        Ok(job_id) => Ok(Delivery {
            job_id,
            receipt: raw,
        }),
        Err(_) => Err(raw),
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, id: JobId) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = conn
            .lpush(self.client.prefixed_key(keys::PENDING_QUEUE), id.to_string())
            .await
            .map_err(map_err)?;
        debug!(job_id = %id, "Job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> AppResult<Option<Delivery>> {
        let deadline = Instant::now() + self.dequeue_timeout;

        loop {
            if let Some(raw) = self.claim().await? {
                match decode_claim(raw) {
                    Ok(delivery) => return Ok(Some(delivery)),
                    Err(raw) => {
                        warn!(payload = %raw, "Dropping malformed queue entry");
                        let mut conn = self.client.conn_mut();
                        let _: () = conn
                            .lrem(self.client.prefixed_key(keys::PROCESSING_QUEUE), 1, &raw)
                            .await
                            .map_err(map_err)?;
                        continue;
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = conn
            .lrem(
                self.client.prefixed_key(keys::PROCESSING_QUEUE),
                1,
                &delivery.receipt,
            )
            .await
            .map_err(map_err)?;
        debug!(job_id = %delivery.job_id, "Job acknowledged");
        Ok(())
    }

    async fn pending(&self) -> AppResult<u64> {
        let mut conn = self.client.conn_mut();
        let len: u64 = conn
            .llen(self.client.prefixed_key(keys::PENDING_QUEUE))
            .await
            .map_err(map_err)?;
        Ok(len)
    }
}
