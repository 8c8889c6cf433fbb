//! Redis Streams-backed job queue.
//!
//! - **Stream key**: `agentflow:jobs` by default; one entry per message, with
//!   `job_id` and `payload` (JSON `JobDescriptor`) fields.
//! - **Consumer group**: shared by all workers; each worker process is a named
//!   consumer inside it.
//! - **Visibility timeout**: entries read but not acknowledged stay in the
//!   group's pending list. `XAUTOCLAIM` with `min-idle = visibility_timeout`
//!   hands them to the next receiver once they have been idle long enough.
//! - **Delete**: `XACK` + `XDEL` in one transaction. The receipt is the entry
//!   id, so it stays valid across redeliveries of the same entry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Value;
use tracing::{instrument, warn};

use super::{JobQueue, QueueError, Receipt, ReceivedMessage};
use crate::jobs::JobDescriptor;

pub const DEFAULT_STREAM_KEY: &str = "agentflow:jobs";
pub const DEFAULT_GROUP: &str = "agentflow-workers";

#[derive(Clone)]
pub struct RedisStreamsQueue {
    conn: ConnectionManager,
    /// Separate connection for `XREADGROUP ... BLOCK` so a long poll does not
    /// stall other commands.
    blocking: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
}

impl core::fmt::Debug for RedisStreamsQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStreamsQueue")
            .field("stream_key", &self.stream_key)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: redis::RedisError) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

fn command(name: &str, e: redis::RedisError) -> QueueError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        QueueError::Unavailable(format!("{name}: {e}"))
    } else {
        QueueError::Command(format!("{name} failed: {e}"))
    }
}

impl RedisStreamsQueue {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(
        redis_url: &str,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client.clone()).await.map_err(unavailable)?;
        let blocking = ConnectionManager::new(client).await.map_err(unavailable)?;

        let queue = Self {
            conn,
            blocking,
            stream_key: stream_key.into(),
            group: group.into(),
            consumer: consumer.into(),
        };
        queue.ensure_consumer_group().await?;
        Ok(queue)
    }

    /// `XGROUP CREATE ... MKSTREAM`, tolerating an existing group.
    pub async fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(command("XGROUP CREATE", e)),
        }
    }

    async fn claim_stale(&self, max: usize, min_idle: Duration) -> Result<Vec<StreamEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| command("XAUTOCLAIM", e))?;

        // [next-cursor, [entries...], (deleted ids)]
        Ok(match reply {
            Value::Bulk(parts) => parts.into_iter().nth(1).map(parse_entries).unwrap_or_default(),
            _ => Vec::new(),
        })
    }

    async fn read_new(&self, max: usize, wait: Duration) -> Result<Vec<StreamEntry>, QueueError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(max);
        if !wait.is_zero() {
            cmd.arg("BLOCK").arg(wait.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(">");

        let mut conn = self.blocking.clone();
        let reply: Value = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| command("XREADGROUP", e))?;

        // Nil on timeout, else [[stream, [entries...]]]
        let Value::Bulk(streams) = reply else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for stream in streams {
            if let Value::Bulk(mut pair) = stream {
                if pair.len() == 2 {
                    out.extend(parse_entries(pair.swap_remove(1)));
                }
            }
        }
        Ok(out)
    }

    async fn ack_and_delete(&self, id: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let (acked, _deleted): (u64, u64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(id)
            .cmd("XDEL")
            .arg(&self.stream_key)
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(|e| command("XACK/XDEL", e))?;
        Ok(acked)
    }

    /// Decode entries; undecodable ones are acknowledged and dropped so they
    /// do not cycle through the pending list forever.
    async fn decode(&self, entries: Vec<StreamEntry>) -> Vec<ReceivedMessage> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let decoded = entry
                .fields
                .get("payload")
                .ok_or_else(|| "missing payload field".to_string())
                .and_then(|p| serde_json::from_str::<JobDescriptor>(p).map_err(|e| e.to_string()));
            match decoded {
                Ok(descriptor) => out.push(ReceivedMessage {
                    descriptor,
                    receipt: Receipt::new(entry.id),
                }),
                Err(reason) => {
                    warn!(entry_id = %entry.id, %reason, "dropping undecodable queue entry");
                    if let Err(e) = self.ack_and_delete(&entry.id).await {
                        warn!(entry_id = %entry.id, error = %e, "failed to drop undecodable entry");
                    }
                }
            }
        }
        out
    }
}

#[async_trait]
impl JobQueue for RedisStreamsQueue {
    #[instrument(
        skip(self, descriptor),
        fields(stream_key = %self.stream_key, job_id = %descriptor.job_id, retry_count = descriptor.retry_count),
        err
    )]
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(descriptor).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("job_id")
            .arg(descriptor.job_id.to_string())
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| command("XADD", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(stream_key = %self.stream_key, consumer = %self.consumer), err)]
    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let mut entries = self.claim_stale(max_messages, visibility_timeout).await?;
        if entries.is_empty() {
            entries = self.read_new(max_messages, wait_time).await?;
        }
        Ok(self.decode(entries).await)
    }

    #[instrument(skip(self), fields(stream_key = %self.stream_key), err)]
    async fn delete(&self, receipt: &Receipt) -> Result<(), QueueError> {
        match self.ack_and_delete(receipt.as_str()).await? {
            0 => Err(QueueError::InvalidReceipt(receipt.clone())),
            _ => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn approximate_depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("XLEN")
            .arg(&self.stream_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command("XLEN", e))
    }
}

#[derive(Debug)]
struct StreamEntry {
    id: String,
    fields: HashMap<String, String>,
}

/// Entry list format: `[[id, [field, value, ...]], ...]`. Nil entries
/// (deleted while pending) are skipped.
fn parse_entries(value: Value) -> Vec<StreamEntry> {
    let Value::Bulk(entries) = value else {
        return Vec::new();
    };
    entries.into_iter().filter_map(parse_entry).collect()
}

fn parse_entry(entry: Value) -> Option<StreamEntry> {
    let Value::Bulk(mut parts) = entry else {
        return None;
    };
    if parts.len() < 2 {
        return None;
    }
    let raw_fields = parts.swap_remove(1);
    let id = match &parts[0] {
        Value::Data(data) => String::from_utf8_lossy(data).to_string(),
        Value::Status(s) => s.clone(),
        _ => return None,
    };

    let Value::Bulk(raw_fields) = raw_fields else {
        return None;
    };
    let mut fields = HashMap::new();
    for chunk in raw_fields.chunks(2) {
        if let [Value::Data(key), Value::Data(value)] = chunk {
            fields.insert(
                String::from_utf8_lossy(key).to_string(),
                String::from_utf8_lossy(value).to_string(),
            );
        }
    }
    Some(StreamEntry { id, fields })
}
