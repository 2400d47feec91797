pub mod health;
pub mod simulations;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /simulations          list, submit
/// /simulations/{id}     get
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/simulations", simulations::router())
}
