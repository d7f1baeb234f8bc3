use axum::{
    Extension,
    extract::{Json, Path, State},
};

use crate::{
    AppState,
    error::AppError,
    store::UserProfile,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::FriendList;

// 图鉴条目：公开资料和好友数
#[axum::debug_handler]
pub async fn get_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let user_id = claims.resolve_user_id(user_id);
    let profile = state
        .store
        .find_profile(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".to_string()))?;

    Ok(success_to_api_response(profile))
}

#[axum::debug_handler]
pub async fn get_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<FriendList>>, AppError> {
    let user_id = claims.resolve_user_id(user_id);
    if state.store.find_profile(&user_id).await?.is_none() {
        return Err(AppError::NotFound("用户不存在".to_string()));
    }

    let friends = state.store.list_friends(&user_id).await?;

    Ok(success_to_api_response(FriendList { user_id, friends }))
}
