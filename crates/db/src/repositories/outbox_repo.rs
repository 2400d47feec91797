//! Repository for the `simulation_outbox` table.
//!
//! Rows are inserted by [`SimulationRepo::create_with_outbox`](super::SimulationRepo::create_with_outbox)
//! and drained by the outbox relay.

use sqlx::PgPool;

use crate::models::outbox::OutboxEntry;

pub struct OutboxRepo;

impl OutboxRepo {
    /// Oldest unpublished rows first.
    pub async fn pending(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEntry>, sqlx::Error> {
        sqlx::query_as::<_, OutboxEntry>(
            "SELECT id, simulation_id, topic, payload, created_at \
             FROM simulation_outbox \
             ORDER BY id ASC \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Remove a row after its message has been published.
    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM simulation_outbox WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
