use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::{SessionRole, TrackingSession};

#[derive(Debug, Deserialize)]
pub struct SelectFriendRequest {
    pub target_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub initiator: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(session: TrackingSession, ttl: chrono::Duration) -> Self {
        Self {
            expires_at: session.expires_at(ttl),
            initiator: session.initiator,
            target: session.target,
            started_at: session.started_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeselectResponse {
    pub removed: bool,
}

/// 状态页展示用
#[derive(Debug, Serialize)]
pub struct TrackingStatus {
    pub role: SessionRole,
    pub partner_id: String,
    pub started_at: DateTime<Utc>,
    pub remaining_secs: i64,
    pub session_points: f64,
}
