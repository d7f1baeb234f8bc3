use axum::{
    Extension,
    extract::{Json, Query, State},
};

use crate::{
    AppState,
    error::AppError,
    store::LeaderboardEntry,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{LeaderboardQuery, RankResponse};

#[axum::debug_handler]
pub async fn top_users(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, AppError> {
    let users = state.store.top_users(query.limit()).await?;

    Ok(success_to_api_response(users))
}

#[axum::debug_handler]
pub async fn my_rank(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RankResponse>>, AppError> {
    let rank = state
        .store
        .user_rank(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".to_string()))?;

    Ok(success_to_api_response(RankResponse {
        user_id: claims.sub,
        rank,
    }))
}
