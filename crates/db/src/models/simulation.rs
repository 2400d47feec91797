//! Simulation record models and query DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::{SimulationId, Timestamp};
use uuid::Uuid;

/// A row from the `simulations` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub id: SimulationId,
    pub name: String,
    pub behavior: String,
    pub runs: i32,
    pub agent_count: i32,
    pub seed: Option<i64>,
    pub speed: Option<f64>,
    pub cohesion: Option<f64>,
    pub separation: Option<f64>,
    pub alignment: Option<f64>,
    pub noise: Option<f64>,
    pub steps: Option<i32>,
    #[sqlx(try_from = "String")]
    pub status: SimulationStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Queue message id that moved the record into `running`.
    #[serde(skip_serializing)]
    pub claim_token: Option<Uuid>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Simulation {
    /// Build a fresh `queued` record. Used by stores that do not assign
    /// columns in SQL.
    pub fn queued(id: SimulationId, params: &SimulationParams, now: Timestamp) -> Self {
        Self {
            id,
            name: params.name.clone(),
            behavior: params.behavior.clone(),
            runs: params.runs,
            agent_count: params.agent_count,
            seed: params.seed,
            speed: params.speed,
            cohesion: params.cohesion,
            separation: params.separation,
            alignment: params.alignment,
            noise: params.noise,
            steps: params.steps,
            status: SimulationStatus::Queued,
            result: None,
            error_message: None,
            claim_token: None,
            created_at: now,
            updated_at: now,
        }
    }

}

/// Result of trying to move a record into `running` for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The record is now `running` under the caller's token.
    Claimed,
    /// The record already reached `done` or `failed`.
    AlreadyTerminal(SimulationStatus),
    /// The record is `running` under a different token.
    HeldByOther,
    /// No record with that id.
    Missing,
}

/// Sortable columns for `GET /api/v1/simulations`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Status,
}

impl SimulationSort {
    pub fn column(self) -> &'static str {
        match self {
            SimulationSort::CreatedAt => "created_at",
            SimulationSort::UpdatedAt => "updated_at",
            SimulationSort::Name => "name",
            SimulationSort::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Default page size for simulation listing.
pub const DEFAULT_LIMIT: i64 = 10;

/// Maximum page size for simulation listing.
pub const MAX_LIMIT: i64 = 100;

/// Query parameters for `GET /api/v1/simulations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationListQuery {
    /// Case-insensitive substring match on `name`.
    pub q: Option<String>,
    pub status: Option<SimulationStatus>,
    pub behavior: Option<String>,
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Page size. Defaults to 10, capped at 100.
    pub limit: Option<i64>,
    pub sort: Option<SimulationSort>,
    pub order: Option<SortOrder>,
}

impl SimulationListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Rows skipped before this page. Saturates for absurd page numbers,
    /// which then simply return no rows.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// The search term, ignoring empty strings sent by form inputs.
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// The behavior filter, ignoring empty strings sent by form inputs.
    pub fn behavior_filter(&self) -> Option<&str> {
        self.behavior.as_deref().filter(|b| !b.is_empty())
    }
}

/// One page of simulations plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationPage {
    pub items: Vec<Simulation>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
