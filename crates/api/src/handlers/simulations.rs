//! Handlers for the `/simulations` resource.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use swarmsim_core::error::CoreError;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::SimulationId;
use swarmsim_db::models::simulation::{SimulationListQuery, SimulationPage};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/simulations
///
/// Validate and record a new simulation. Returns 201 with the `queued`
/// record; a worker picks it up asynchronously.
pub async fn create_simulation(
    State(state): State<AppState>,
    payload: Result<Json<SimulationParams>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(params) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let simulation = state.submitter.submit(params).await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: simulation })))
}

/// GET /api/v1/simulations
///
/// Filter by `q` (name substring), `status`, `behavior`; paginate with
/// `page` and `limit`; order with `sort` and `order`.
pub async fn list_simulations(
    State(state): State<AppState>,
    query: Result<Query<SimulationListQuery>, QueryRejection>,
) -> AppResult<Json<SimulationPage>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let page = state.store.list(&query).await?;
    Ok(Json(page))
}

/// GET /api/v1/simulations/{id}
pub async fn get_simulation(
    State(state): State<AppState>,
    id: Result<Path<SimulationId>, PathRejection>,
) -> AppResult<impl IntoResponse> {
    let Path(id) = id.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let simulation = state
        .store
        .find(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Simulation",
            id: id.to_string(),
        }))?;

    Ok(Json(DataResponse { data: simulation }))
}
