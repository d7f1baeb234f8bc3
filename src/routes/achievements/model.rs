use serde::Serialize;

use crate::store::Achievement;

#[derive(Debug, Serialize)]
pub struct AchievementList {
    pub user_id: String,
    pub achievements: Vec<Achievement>,
    /// 成就奖励合计
    pub total_reward: i64,
}

impl AchievementList {
    pub fn new(user_id: String, achievements: Vec<Achievement>) -> Self {
        Self {
            total_reward: achievements.iter().map(|a| a.reward).sum(),
            user_id,
            achievements,
        }
    }
}
