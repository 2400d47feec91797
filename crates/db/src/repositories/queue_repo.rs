//! Repository for the durable queue tables.
//!
//! A message is delivered by leasing it: `leased_until` moves into the future
//! and other consumers skip it until the lease expires. Consumers that crash
//! never ack, so the lease lapses and the message is delivered again.

use std::time::Duration;

use sqlx::PgPool;
use swarmsim_core::types::MessageId;
use uuid::Uuid;

use crate::models::queue::{DeadLetter, QueueMessage};

/// Column list for `queue_messages` queries.
const COLUMNS: &str = "id, topic, payload, enqueued_at, delivery_count, leased_until";

pub struct QueueRepo;

impl QueueRepo {
    /// Append a message to `topic`. Returns the new message id.
    pub async fn publish(pool: &PgPool, topic: &str, payload: &[u8]) -> Result<MessageId, sqlx::Error> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO queue_messages (id, topic, payload) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(topic)
            .bind(payload)
            .execute(pool)
            .await?;
        Ok(id)
    }

    /// Atomically lease the oldest deliverable message on `topic`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent consumers never
    /// lease the same message.
    pub async fn lease_next(
        pool: &PgPool,
        topic: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_messages \
             SET leased_until = NOW() + make_interval(secs => $2), \
                 delivery_count = delivery_count + 1 \
             WHERE id = ( \
                 SELECT id FROM queue_messages \
                 WHERE topic = $1 \
                   AND (leased_until IS NULL OR leased_until < NOW()) \
                 ORDER BY enqueued_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueMessage>(&query)
            .bind(topic)
            .bind(lease.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// Push the lease of a delivered message forward.
    pub async fn extend_lease(pool: &PgPool, id: MessageId, lease: Duration) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_messages \
             SET leased_until = NOW() + make_interval(secs => $2) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(lease.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an acknowledged message.
    pub async fn delete(pool: &PgPool, id: MessageId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a message to `queue_dead_letters` with `reason`, in one statement.
    pub async fn dead_letter(pool: &PgPool, id: MessageId, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "WITH moved AS ( \
                 DELETE FROM queue_messages WHERE id = $1 \
                 RETURNING id, topic, payload, enqueued_at, delivery_count \
             ) \
             INSERT INTO queue_dead_letters \
                 (id, topic, payload, enqueued_at, delivery_count, reason) \
             SELECT id, topic, payload, enqueued_at, delivery_count, $2 FROM moved",
        )
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Messages on `topic` that are neither acked nor dead-lettered.
    pub async fn depth(pool: &PgPool, topic: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE topic = $1")
            .bind(topic)
            .fetch_one(pool)
            .await
    }

    /// Dead letters for `topic`, newest first.
    pub async fn dead_letters(pool: &PgPool, topic: &str, limit: i64) -> Result<Vec<DeadLetter>, sqlx::Error> {
        sqlx::query_as::<_, DeadLetter>(
            "SELECT id, topic, payload, enqueued_at, delivery_count, reason, rejected_at \
             FROM queue_dead_letters \
             WHERE topic = $1 \
             ORDER BY rejected_at DESC \
             LIMIT $2",
        )
        .bind(topic)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
