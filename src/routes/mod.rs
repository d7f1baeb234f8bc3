pub mod achievements;
pub mod friendex;
pub mod leaderboard;
pub mod location;
pub mod tracking;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::auth_middleware};

/// 构建 API 路由，所有路由都需要认证，挂载在 `api_base_uri` 下
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // 位置路由
        .route("/location/upload", post(location::upload_location))
        .route("/location/remove", post(location::remove_location))
        .route("/location/me", get(location::my_location))
        // 追踪路由
        .route("/tracking/select", post(tracking::select_friend))
        .route("/tracking/deselect", post(tracking::deselect_friend))
        .route("/tracking/status", get(tracking::tracking_status))
        // 排行榜路由
        .route("/leaderboard/top", get(leaderboard::top_users))
        .route("/leaderboard/rank", get(leaderboard::my_rank))
        // 图鉴路由，user_id 为 "me" 时表示当前用户
        .route("/friendex/{user_id}", get(friendex::get_entry))
        .route("/friendex/{user_id}/friends", get(friendex::get_friends))
        // 成就路由
        .route("/achievements", get(achievements::my_achievements))
        .route("/achievements/catalog", get(achievements::catalog))
        .route("/achievements/{user_id}", get(achievements::user_achievements))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest(&state.config.api_base_uri, protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{Config, TrackerConfig},
        store::{MemoryUserStore, UserStore},
        tracker::Tracker,
        utils::{Claims, error_codes},
    };

    const SECRET: &str = "test-secret";

    async fn test_app() -> (Router, Arc<MemoryUserStore>) {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/friendex".into()),
            "REDIS_URL" => Some("redis://localhost".into()),
            "JWT_SECRET" => Some(SECRET.into()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(MemoryUserStore::new());
        store.insert_user("alice", "Alice", 12).await;
        store.insert_user("bob", "Bob", 30).await;
        store.insert_user("carol", "Carol", 5).await;

        let tracker = Arc::new(Tracker::new(TrackerConfig::default(), store.clone()));
        let state = AppState {
            config,
            store: store.clone(),
            tracker,
        };
        (router(state), store)
    }

    fn token_for(user_id: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + 3600,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn requests_without_token_are_rejected() {
        let (app, _) = test_app().await;
        let (status, body) = call(&app, "GET", "/api/location/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::AUTH_FAILED);

        let request = Request::builder()
            .uri("/api/location/me")
            .header("authorization", "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_and_read_back_location() {
        let (app, _) = test_app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/location/upload",
            Some("alice"),
            Some(json!({ "latitude": -33.8688, "longitude": 151.2093 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);

        let (status, body) = call(&app, "GET", "/api/location/me", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["latitude"], -33.8688);

        let (status, _) = call(&app, "POST", "/api/location/remove", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, "GET", "/api/location/me", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], error_codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_location_is_a_validation_error() {
        let (app, _) = test_app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/location/upload",
            Some("alice"),
            Some(json!({ "latitude": 95.0, "longitude": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn select_friend_flow() {
        let (app, store) = test_app().await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/tracking/select",
            Some("alice"),
            Some(json!({ "target_id": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/tracking/select",
            Some("alice"),
            Some(json!({ "target_id": "nobody" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            "POST",
            "/api/tracking/select",
            Some("alice"),
            Some(json!({ "target_id": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["target"], "bob");
        assert_eq!(store.selected_friend("alice").await.as_deref(), Some("bob"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/tracking/select",
            Some("carol"),
            Some(json!({ "target_id": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], error_codes::CONFLICT);

        let (status, body) = call(&app, "GET", "/api/tracking/status", Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["role"], "tracked");
        assert_eq!(body["resp_data"]["partner_id"], "alice");
        assert_eq!(body["resp_data"]["session_points"], 0.0);

        let (status, body) = call(&app, "POST", "/api/tracking/deselect", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["removed"], true);
        assert_eq!(store.selected_friend("alice").await, None);

        let (status, body) = call(&app, "POST", "/api/tracking/deselect", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["removed"], false);

        let (status, _) = call(&app, "GET", "/api/tracking/status", Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn leaderboard_and_rank() {
        let (app, _) = test_app().await;

        let (status, body) = call(&app, "GET", "/api/leaderboard/top?size=2", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["resp_data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Bob", "Alice"]);

        let (status, body) = call(&app, "GET", "/api/leaderboard/rank", Some("carol"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["rank"], 3);

        let (status, _) = call(&app, "GET", "/api/leaderboard/rank", Some("ghost"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_target_is_a_validation_error() {
        let (app, _) = test_app().await;
        for target in ["", "   "] {
            let (status, body) = call(
                &app,
                "POST",
                "/api/tracking/select",
                Some("alice"),
                Some(json!({ "target_id": target })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
        }
    }

    #[tokio::test]
    async fn friendex_entry_and_friend_list() {
        let (app, store) = test_app().await;
        store
            .add_friend("alice", "bob", chrono::Utc::now())
            .await
            .unwrap();

        let (status, body) = call(&app, "GET", "/api/friendex/me", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["name"], "Alice");
        assert_eq!(body["resp_data"]["friend_count"], 1);

        let (status, body) = call(&app, "GET", "/api/friendex/alice/friends", Some("carol"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["friends"][0]["user_id"], "bob");
        assert_eq!(body["resp_data"]["friends"][0]["points"], 30);

        let (status, _) = call(&app, "GET", "/api/friendex/ghost", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/api/friendex/ghost/friends", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn achievements_listing_and_catalog() {
        let (app, store) = test_app().await;
        let milestone = crate::tracker::MILESTONES[0];
        store
            .unlock_achievement("bob", &milestone.unlock(chrono::Utc::now()))
            .await
            .unwrap();

        let (status, body) = call(&app, "GET", "/api/achievements", Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["achievements"][0]["title"], milestone.title);
        assert_eq!(body["resp_data"]["total_reward"], milestone.reward);

        let (status, body) = call(&app, "GET", "/api/achievements/bob", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["user_id"], "bob");

        let (status, body) = call(&app, "GET", "/api/achievements/ghost", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["achievements"], json!([]));

        let (status, body) = call(&app, "GET", "/api/achievements/catalog", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"].as_array().unwrap().len(), 4);
        assert_eq!(body["resp_data"][1]["min_friends"], 5);
    }
}
