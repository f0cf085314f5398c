use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A reserved message. It stays in the queue's processing list until acked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: String,
    pub payload: String,
}

fn processing_key(queue: &str) -> String {
    format!("{}:processing", queue)
}

/// At-least-once message channel between the backend and the worker pool.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message to `queue`.
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), QueueError>;

    /// Move the oldest message of `queue` into its processing list and return it.
    async fn reserve(&self, queue: &str) -> Result<Option<Delivery>, QueueError>;

    /// Drop a reserved message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Push every unacknowledged message of `queue` back for redelivery.
    async fn recover(&self, queue: &str) -> Result<u64, QueueError>;

    /// Number of messages waiting in `queue`.
    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    /// Check broker connectivity (for health checks).
    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-list backed queue. `LPUSH` to publish, `RPOPLPUSH` into
/// `<queue>:processing` to reserve, `LREM` to ack.
pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        let conn = ConnectionManager::new(client).await.map_err(QueueError::Redis)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn reserve(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .rpoplpush(queue, processing_key(queue))
            .await
            .map_err(QueueError::Redis)?;

        Ok(payload.map(|payload| Delivery {
            queue: queue.to_string(),
            payload,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(processing_key(&delivery.queue), 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let processing = processing_key(queue);
        let mut moved = 0;
        loop {
            let payload: Option<String> = conn
                .rpoplpush(&processing, queue)
                .await
                .map_err(QueueError::Redis)?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn.llen(queue).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Default)]
struct Lists {
    ready: HashMap<String, VecDeque<String>>,
    processing: HashMap<String, Vec<String>>,
}

/// Process-local queue with the same reserve/ack semantics as `RedisQueue`.
#[derive(Default)]
pub struct InMemoryQueue {
    lists: Mutex<Lists>,
    unavailable: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage: every call fails with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages reserved but not yet acknowledged.
    pub fn in_flight(&self, queue: &str) -> usize {
        self.lock().processing.get(queue).map_or(0, Vec::len)
    }

    /// Remove and return everything waiting in `queue`.
    pub fn drain(&self, queue: &str) -> Vec<String> {
        self.lock()
            .ready
            .remove(queue)
            .map(Vec::from)
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(QueueError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        self.check()?;
        self.lock()
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        Ok(())
    }

    async fn reserve(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        self.check()?;
        let mut lists = self.lock();
        let Some(payload) = lists.ready.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        lists
            .processing
            .entry(queue.to_string())
            .or_default()
            .push(payload.clone());
        Ok(Some(Delivery {
            queue: queue.to_string(),
            payload,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.check()?;
        let mut lists = self.lock();
        if let Some(list) = lists.processing.get_mut(&delivery.queue) {
            if let Some(pos) = list.iter().position(|p| *p == delivery.payload) {
                list.remove(pos);
            }
        }
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        self.check()?;
        let mut lists = self.lock();
        let pending = lists.processing.remove(queue).unwrap_or_default();
        let moved = pending.len() as u64;
        let ready = lists.ready.entry(queue.to_string()).or_default();
        for payload in pending.into_iter().rev() {
            ready.push_front(payload);
        }
        Ok(moved)
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        self.check()?;
        Ok(self.lock().ready.get(queue).map_or(0, VecDeque::len) as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.check()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue broker unavailable")]
    Unavailable,
}

impl QueueError {
    /// Lost or refused broker connection, as opposed to a bad command.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            QueueError::Redis(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error()
            }
            QueueError::Unavailable => true,
        }
    }
}
