use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::dto::ApiResponse;
use crate::api::util::json::to_json;
use crate::app_state::AppState;
use crate::core::client::kube_resources::Deployment;
use crate::core::state::runtime::counts::count_snapshot::CountSnapshot;
use crate::errors::AppError;

pub struct ScalerStateController;

impl ScalerStateController {
    pub async fn get_summary(
        State(state): State<AppState>,
    ) -> Result<Json<ApiResponse<Value>>, AppError> {
        let counts = state.count_aggregator.counts().await;

        to_json(Ok::<_, Infallible>(json!({
            "deployments": state.workload_cache.len(),
            "last_synced_at": state.workload_cache.last_synced_at(),
            "target": state.count_aggregator.target().to_string(),
            "hosts": counts.counts.len(),
            "pending_requests": counts.total(),
            "backends_ok": counts.backends_ok,
            "backends_failed": counts.backends_failed,
            "last_polled_at": counts.polled_at,
        })))
    }

    pub async fn list_deployments(
        State(state): State<AppState>,
    ) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
        to_json(Ok::<_, Infallible>(state.workload_cache.names()))
    }

    pub async fn get_deployment(
        State(state): State<AppState>,
        Path(name): Path<String>,
    ) -> Result<Json<ApiResponse<Deployment>>, AppError> {
        to_json(state.workload_cache.get(&name))
    }

    pub async fn get_counts(
        State(state): State<AppState>,
    ) -> Result<Json<ApiResponse<CountSnapshot>>, AppError> {
        let snapshot = state.count_aggregator.counts().await;
        to_json(Ok::<_, Infallible>((*snapshot).clone()))
    }
}
