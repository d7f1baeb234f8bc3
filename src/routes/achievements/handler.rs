use axum::{
    Extension,
    extract::{Json, Path, State},
};

use crate::{
    AppState,
    error::AppError,
    tracker::{MILESTONES, Milestone},
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::AchievementList;

// 所有可解锁的成就
pub async fn catalog() -> Json<ApiResponse<Vec<Milestone>>> {
    success_to_api_response(MILESTONES.to_vec())
}

#[axum::debug_handler]
pub async fn my_achievements(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<AchievementList>>, AppError> {
    let achievements = state.store.list_achievements(&claims.sub).await?;

    Ok(success_to_api_response(AchievementList::new(
        claims.sub,
        achievements,
    )))
}

// 用户不存在时返回空列表
#[axum::debug_handler]
pub async fn user_achievements(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<AchievementList>>, AppError> {
    let user_id = claims.resolve_user_id(user_id);
    let achievements = state.store.list_achievements(&user_id).await?;

    Ok(success_to_api_response(AchievementList::new(
        user_id,
        achievements,
    )))
}
