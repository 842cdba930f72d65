//! Outbound notification jobs.
//!
//! The dispatcher is an injected capability with an explicit unavailable
//! state: `enqueue` returns `None` when the job could not be queued and
//! callers treat that as non-fatal, always. A request or webhook must never
//! fail because the mail queue is down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmation,
    OrderUpdate,
}

/// A notification job to be rendered and delivered by the mail worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub template_data: serde_json::Value,
}

/// Handle for an enqueued job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub queue: String,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Enqueues a job; `None` means the dispatcher was unavailable and the
    /// job was dropped. Never an error for the caller.
    async fn enqueue(&self, job: NotificationJob) -> Option<JobHandle>;
}

/// Envelope pushed onto the Redis list, matching what the mail worker pops.
#[derive(Debug, Serialize, Deserialize)]
struct JobEnvelope {
    id: Uuid,
    #[serde(flatten)]
    job: NotificationJob,
    enqueued_at: DateTime<Utc>,
    attempts: u32,
}

/// Redis-list-backed dispatcher; the mail worker consumes with BRPOP.
#[derive(Clone)]
pub struct RedisNotificationQueue {
    redis: Arc<redis::Client>,
    queue: String,
}

impl RedisNotificationQueue {
    pub fn new(redis: Arc<redis::Client>, queue: String) -> Self {
        Self { redis, queue }
    }
}

#[async_trait]
impl NotificationDispatcher for RedisNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> Option<JobHandle> {
        let envelope = JobEnvelope {
            id: Uuid::new_v4(),
            job,
            enqueued_at: Utc::now(),
            attempts: 0,
        };

        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "notification job serialization failed; dropping");
                return None;
            }
        };

        let mut conn = match self.redis.get_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "notification queue unavailable; dropping job");
                return None;
            }
        };

        let pushed: Result<i64, redis::RedisError> = conn.lpush(&self.queue, payload).await;
        match pushed {
            Ok(_) => {
                debug!(job_id = %envelope.id, queue = %self.queue, "notification enqueued");
                Some(JobHandle {
                    id: envelope.id,
                    queue: self.queue.clone(),
                })
            }
            Err(e) => {
                warn!(error = %e, "notification enqueue failed; dropping job");
                None
            }
        }
    }
}

/// Dispatcher for deployments without a mail queue; every job is dropped.
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn enqueue(&self, job: NotificationJob) -> Option<JobHandle> {
        debug!(subject = %job.subject, "notifications disabled; dropping job");
        None
    }
}
