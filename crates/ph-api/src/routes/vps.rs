use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use ph_core::Caller;

use crate::dto::{CreateVpsRequest, CreatedResponse, RotatedResponse, StatusResponse, VpsResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateVpsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let Json(req) = payload?;
    let created = state
        .orchestrator
        .create_instance(&caller, req.into())
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<VpsResponse>>, ApiError> {
    let instances = state.orchestrator.list_instances(&caller).await?;
    Ok(Json(instances.into_iter().map(VpsResponse::from).collect()))
}

pub async fn get_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vps_id): Path<String>,
) -> Result<Json<VpsResponse>, ApiError> {
    let vps = state.orchestrator.get_instance(&caller, &vps_id).await?;
    Ok(Json(vps.into()))
}

pub async fn start_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vps_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let ack = state.orchestrator.start_instance(&caller, &vps_id).await?;
    Ok(Json(ack.into()))
}

pub async fn stop_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vps_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let ack = state.orchestrator.stop_instance(&caller, &vps_id).await?;
    Ok(Json(ack.into()))
}

pub async fn delete_vps(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vps_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let ack = state.orchestrator.delete_instance(&caller, &vps_id).await?;
    Ok(Json(ack.into()))
}

pub async fn regenerate_credentials(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vps_id): Path<String>,
) -> Result<Json<RotatedResponse>, ApiError> {
    let rotated = state
        .orchestrator
        .regenerate_credentials(&caller, &vps_id)
        .await?;
    Ok(Json(rotated.into()))
}
