//! State routes (e.g., /api/v1/states/*)

use axum::{routing::get, Router};

use crate::api::controller::state::scaler_state_controller::ScalerStateController;
use crate::app_state::AppState;

pub fn state_routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(ScalerStateController::get_summary))
        .route("/deployments", get(ScalerStateController::list_deployments))
        .route("/deployments/{name}", get(ScalerStateController::get_deployment))
        .route("/counts", get(ScalerStateController::get_counts))
}
