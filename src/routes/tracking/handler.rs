use axum::{
    Extension,
    extract::{Json, State},
};

use crate::{
    AppState,
    error::AppError,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{DeselectResponse, SelectFriendRequest, SessionInfo, TrackingStatus};

#[axum::debug_handler]
pub async fn select_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SelectFriendRequest>,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    let target_id = req.target_id.trim();
    if target_id.is_empty() {
        return Err(AppError::Validation("目标用户ID不能为空".to_string()));
    }

    // 自己选自己交给引擎拒绝；目标用户必须存在
    if target_id != claims.sub && state.store.find_user_points(target_id).await?.is_none() {
        return Err(AppError::NotFound("用户不存在".to_string()));
    }

    let session = state.tracker.add_tracking(&claims.sub, target_id).await?;
    let ttl = state.tracker.config().tracking_ttl();

    Ok(success_to_api_response(SessionInfo::new(session, ttl)))
}

#[axum::debug_handler]
pub async fn deselect_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<ApiResponse<DeselectResponse>> {
    let removed = state.tracker.remove_tracking(&claims.sub).await;

    success_to_api_response(DeselectResponse {
        removed: removed.is_some(),
    })
}

#[axum::debug_handler]
pub async fn tracking_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<TrackingStatus>>, AppError> {
    let view = state.tracker.get_session(&claims.sub).await?;
    let remaining = state.tracker.session_time_remaining(&claims.sub).await?;
    let session_points = state.tracker.session_points(&claims.sub).await?;

    Ok(success_to_api_response(TrackingStatus {
        role: view.role,
        partner_id: view.partner().to_string(),
        started_at: view.session.started_at,
        remaining_secs: remaining.num_seconds(),
        session_points,
    }))
}
