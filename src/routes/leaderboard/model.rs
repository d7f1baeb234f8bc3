use serde::{Deserialize, Serialize};

pub const DEFAULT_LEADERBOARD_SIZE: i64 = 10;
pub const MAX_LEADERBOARD_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub size: Option<i64>,
}

impl LeaderboardQuery {
    pub fn limit(&self) -> i64 {
        self.size
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
            .clamp(1, MAX_LEADERBOARD_SIZE)
    }
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub user_id: String,
    pub rank: i64,
}
