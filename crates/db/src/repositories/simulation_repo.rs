//! Repository for the `simulations` table.
//!
//! Every status write is guarded by the lifecycle table in
//! [`SimulationStatus::can_transition_to`]: the `WHERE` clause only matches
//! rows whose current status may legally move to the target, so a terminal
//! record is never overwritten and status never regresses.

use sqlx::PgPool;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::SimulationId;
use uuid::Uuid;

use crate::models::simulation::{ClaimOutcome, Simulation, SimulationListQuery, SimulationPage};

/// Column list for `simulations` queries.
const COLUMNS: &str = "\
    id, name, behavior, runs, agent_count, \
    seed, speed, cohesion, separation, alignment, noise, steps, \
    status, result, error_message, claim_token, \
    created_at, updated_at";

/// Status strings a record may currently hold to move into `target`.
fn allowed_sources(target: SimulationStatus) -> Vec<String> {
    SimulationStatus::ALL
        .into_iter()
        .filter(|from| from.can_transition_to(target))
        .map(|from| from.as_str().to_string())
        .collect()
}

/// Escape `LIKE` wildcards in user input.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Provides persistence operations for simulation records.
pub struct SimulationRepo;

impl SimulationRepo {
    /// Insert a `queued` record and its outbox row in one transaction.
    ///
    /// Either both rows exist afterwards or neither does, so a submitted
    /// simulation can never be left without a message to publish.
    pub async fn create_with_outbox(
        pool: &PgPool,
        id: SimulationId,
        params: &SimulationParams,
        topic: &str,
        payload: &[u8],
    ) -> Result<Simulation, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO simulations \
                 (id, name, behavior, runs, agent_count, \
                  seed, speed, cohesion, separation, alignment, noise, steps, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        let simulation = sqlx::query_as::<_, Simulation>(&query)
            .bind(id)
            .bind(&params.name)
            .bind(&params.behavior)
            .bind(params.runs)
            .bind(params.agent_count)
            .bind(params.seed)
            .bind(params.speed)
            .bind(params.cohesion)
            .bind(params.separation)
            .bind(params.alignment)
            .bind(params.noise)
            .bind(params.steps)
            .bind(SimulationStatus::Queued.as_str())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO simulation_outbox (simulation_id, topic, payload) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(topic)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(simulation)
    }

    /// Find a simulation by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: SimulationId,
    ) -> Result<Option<Simulation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM simulations WHERE id = $1");
        sqlx::query_as::<_, Simulation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a record into `running` for the delivery identified by `token`.
    ///
    /// Succeeds when the record is `queued`, or already `running` under the
    /// same token (the same message redelivered after a crash). Any other
    /// state is reported without modifying the row.
    pub async fn claim(
        pool: &PgPool,
        id: SimulationId,
        token: Uuid,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let claimed = sqlx::query(
            "UPDATE simulations \
             SET status = $3, claim_token = $2, updated_at = NOW() \
             WHERE id = $1 \
               AND (status = $4 OR (status = $3 AND claim_token = $2))",
        )
        .bind(id)
        .bind(token)
        .bind(SimulationStatus::Running.as_str())
        .bind(SimulationStatus::Queued.as_str())
        .execute(pool)
        .await?;

        if claimed.rows_affected() > 0 {
            return Ok(ClaimOutcome::Claimed);
        }

        // Diagnose why the guard did not match. The row may change between
        // the two statements; the answer is only used to pick a log line and
        // a message disposition.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM simulations WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        let outcome = match current.as_deref().map(str::parse::<SimulationStatus>) {
            None => ClaimOutcome::Missing,
            Some(Ok(status)) if status.is_terminal() => ClaimOutcome::AlreadyTerminal(status),
            Some(_) => ClaimOutcome::HeldByOther,
        };
        Ok(outcome)
    }

    /// Set the status, recording `error_message` when moving to `failed`.
    ///
    /// Returns `false` if no row matched: unknown id, or the move is not a
    /// legal transition from the current status.
    pub async fn update_status(
        pool: &PgPool,
        id: SimulationId,
        status: SimulationStatus,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE simulations \
             SET status = $2, \
                 error_message = COALESCE($3, error_message), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(allowed_sources(status))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the status and the result document in one statement.
    ///
    /// Returns `false` if no row matched (see [`Self::update_status`]).
    pub async fn update_status_and_result(
        pool: &PgPool,
        id: SimulationId,
        status: SimulationStatus,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE simulations \
             SET status = $2, result = $3, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(result)
        .bind(allowed_sources(status))
        .execute(pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// List simulations with optional filters, sorting and pagination.
    pub async fn list(
        pool: &PgPool,
        params: &SimulationListQuery,
    ) -> Result<SimulationPage, sqlx::Error> {
        let limit = params.limit();
        let offset = params.offset();
        let search = params.search().map(like_pattern);
        let status = params.status.map(SimulationStatus::as_str);
        let behavior = params.behavior_filter();

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if search.is_some() {
            conditions.push(format!("LOWER(name) LIKE ${bind_idx}"));
            bind_idx += 1;
        }
        if status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if behavior.is_some() {
            conditions.push(format!("behavior = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM simulations {where_clause}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(pattern) = &search {
            count = count.bind(pattern);
        }
        if let Some(status) = status {
            count = count.bind(status);
        }
        if let Some(behavior) = behavior {
            count = count.bind(behavior);
        }
        let total = count.fetch_one(pool).await?;

        let sort = params.sort.unwrap_or_default();
        let order = params.order.unwrap_or_default();
        let data_query = format!(
            "SELECT {COLUMNS} FROM simulations \
             {where_clause} \
             ORDER BY {} {}, id {} \
             LIMIT ${bind_idx} OFFSET ${}",
            sort.column(),
            order.keyword(),
            order.keyword(),
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Simulation>(&data_query);
        if let Some(pattern) = &search {
            q = q.bind(pattern);
        }
        if let Some(status) = status {
            q = q.bind(status);
        }
        if let Some(behavior) = behavior {
            q = q.bind(behavior);
        }
        let items = q.bind(limit).bind(offset).fetch_all(pool).await?;

        Ok(SimulationPage {
            items,
            page: params.page(),
            limit,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_reachable_from_queued_and_running() {
        assert_eq!(allowed_sources(SimulationStatus::Running), vec!["queued", "running"]);
    }

    #[test]
    fn terminal_targets_require_running() {
        assert_eq!(allowed_sources(SimulationStatus::Done), vec!["running"]);
        assert_eq!(allowed_sources(SimulationStatus::Failed), vec!["running"]);
        assert!(allowed_sources(SimulationStatus::Queued).is_empty());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Flock"), "%flock%");
        assert_eq!(like_pattern("50%_a"), "%50\\%\\_a%");
    }
}
