//! Redis-backed dispatch queue (list + sorted set).
//!
//! ## Architecture
//!
//! - **Ready list**: `docket:dispatch:ready`, LPUSH on enqueue, RPOP on dequeue (FIFO)
//! - **Delayed set**: `docket:dispatch:delayed`, a sorted set scored by the unix
//!   time (ms) at which the entry becomes ready
//! - **Promotion**: every `dequeue` first moves due entries from the delayed set
//!   to the ready list with one Lua script, so two consumers never promote the
//!   same entry twice
//!
//! ## Delivery Semantics
//!
//! RPOP removes the entry before the worker runs, so a crash between pop and
//! processing loses that delivery. Duplicate deliveries of the same job id are
//! still possible (re-dispatch, retries) and are absorbed by the job store's
//! compare-and-set gate.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use uuid::Uuid;

use docket_queue::{DispatchMessage, DispatchQueue, QueueError};

const DEFAULT_KEY_PREFIX: &str = "docket:dispatch";

/// How long an idle `dequeue` sleeps between polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Max entries promoted per poll.
const PROMOTE_BATCH: usize = 100;

/// Moves due members of KEYS[1] (zset) to KEYS[2] (list). ARGV: now_ms, batch.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, member in ipairs(due) do
  if redis.call('ZREM', KEYS[1], member) == 1 then
    redis.call('LPUSH', KEYS[2], member)
  end
end
return #due
"#;

/// Wire format: the delivery id keeps identical messages distinct in the sorted set.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    delivery_id: Uuid,
    message: DispatchMessage,
}

#[derive(Clone)]
pub struct RedisDispatchQueue {
    client: redis::Client,
    conn: Arc<OnceCell<MultiplexedConnection>>,
    promote: Arc<redis::Script>,
    ready_key: String,
    delayed_key: String,
    poll_interval: Duration,
}

impl core::fmt::Debug for RedisDispatchQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisDispatchQueue")
            .field("ready_key", &self.ready_key)
            .field("delayed_key", &self.delayed_key)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RedisDispatchQueue {
    /// Create a queue for `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// The connection is opened lazily on first use.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
            promote: Arc::new(redis::Script::new(PROMOTE_SCRIPT)),
            ready_key: format!("{DEFAULT_KEY_PREFIX}:ready"),
            delayed_key: format!("{DEFAULT_KEY_PREFIX}:delayed"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Use a different key prefix (isolates queues sharing one Redis).
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.ready_key = format!("{prefix}:ready");
        self.delayed_key = format!("{prefix}:delayed");
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| QueueError::Transport(format!("connect failed: {e}")))
            })
            .await?;
        Ok(conn.clone())
    }

    fn encode(message: DispatchMessage) -> Result<String, QueueError> {
        serde_json::to_string(&Envelope {
            delivery_id: Uuid::now_v7(),
            message,
        })
        .map_err(|e| QueueError::Codec(e.to_string()))
    }

    fn decode(payload: &str) -> Result<DispatchMessage, QueueError> {
        serde_json::from_str::<Envelope>(payload)
            .map(|envelope| envelope.message)
            .map_err(|e| QueueError::Codec(format!("{e}; payload: {payload}")))
    }

    /// Move due delayed entries to the ready list. Returns how many were due.
    async fn promote_due(&self, conn: &mut MultiplexedConnection) -> Result<usize, QueueError> {
        self.promote
            .key(&self.delayed_key)
            .key(&self.ready_key)
            .arg(now_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(conn)
            .await
            .map_err(|e| QueueError::Transport(format!("promote failed: {e}")))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait::async_trait]
impl DispatchQueue for RedisDispatchQueue {
    #[instrument(skip(self), fields(job_id = %message.job_id(), attempt = message.attempt()), err)]
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), QueueError> {
        let payload = Self::encode(message)?;
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.ready_key)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Transport(format!("LPUSH failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %message.job_id(), attempt = message.attempt()), err)]
    async fn enqueue_after(&self, message: DispatchMessage, delay: Duration) -> Result<(), QueueError> {
        if delay.is_zero() {
            return self.enqueue(message).await;
        }

        let payload = Self::encode(message)?;
        let ready_at = now_millis().saturating_add(delay.as_millis() as u64);
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.delayed_key)
            .arg(ready_at)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Transport(format!("ZADD failed: {e}")))?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<DispatchMessage, QueueError> {
        let mut conn = self.connection().await?;
        loop {
            let promoted = self.promote_due(&mut conn).await?;
            if promoted > 0 {
                debug!(promoted, "delayed dispatch messages promoted");
            }

            let popped: Option<String> = redis::cmd("RPOP")
                .arg(&self.ready_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| QueueError::Transport(format!("RPOP failed: {e}")))?;

            match popped {
                Some(payload) => return Self::decode(&payload),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}
