use axum::{
    Extension,
    extract::{Json, State},
};

use crate::{
    AppState,
    error::AppError,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{LocationInfo, UploadLocationRequest};

#[axum::debug_handler]
pub async fn upload_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UploadLocationRequest>,
) -> Result<Json<ApiResponse<LocationInfo>>, AppError> {
    let entry = state
        .tracker
        .update_location(&claims.sub, req.latitude, req.longitude)
        .await?;

    Ok(success_to_api_response(LocationInfo::from(entry)))
}

#[axum::debug_handler]
pub async fn remove_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<ApiResponse<serde_json::Value>> {
    state.tracker.remove_location(&claims.sub).await;

    success_to_api_response(serde_json::json!({
        "success": true
    }))
}

// 只返回未过期的位置
#[axum::debug_handler]
pub async fn my_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<LocationInfo>>, AppError> {
    let entry = state.tracker.fresh_location(&claims.sub).await?;

    Ok(success_to_api_response(LocationInfo::from(entry)))
}
