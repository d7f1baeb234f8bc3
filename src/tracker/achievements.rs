use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Achievement, StoreResult, UserStore, with_timeout};

/// 好友数里程碑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub title: &'static str,
    pub description: &'static str,
    pub reward: i64,
    pub min_friends: i64,
}

impl Milestone {
    pub fn unlock(&self, at: DateTime<Utc>) -> Achievement {
        Achievement {
            title: self.title.to_string(),
            description: self.description.to_string(),
            reward: self.reward,
            unlocked_at: at,
        }
    }
}

pub const MILESTONES: [Milestone; 4] = [
    Milestone {
        title: "Not a loner I see",
        description: "You aren't a loner anymore!",
        reward: 10,
        min_friends: 1,
    },
    Milestone {
        title: "Got a lil something going ;)",
        description: "You've made 5 friends, I see you go",
        reward: 25,
        min_friends: 5,
    },
    Milestone {
        title: "Almost a soccer squad",
        description: "Just say you're making your own team",
        reward: 35,
        min_friends: 10,
    },
    Milestone {
        title: "Ok Mr Popular",
        description: "Really collecting people now aren't we",
        reward: 10,
        min_friends: 20,
    },
];

/// 按当前好友数解锁所有达到的里程碑，返回本次新解锁的成就。
///
/// 已解锁的成就由存储层去重，重复调用不会重复发放奖励。
pub async fn unlock_milestones(
    store: &dyn UserStore,
    user_id: &str,
    now: DateTime<Utc>,
    timeout: Duration,
) -> StoreResult<Vec<Achievement>> {
    let friends = with_timeout(timeout, store.friend_count(user_id)).await?;

    let mut unlocked = Vec::new();
    for milestone in MILESTONES.iter().filter(|m| friends >= m.min_friends) {
        let achievement = milestone.unlock(now);
        if with_timeout(timeout, store.unlock_achievement(user_id, &achievement)).await? {
            unlocked.push(achievement);
        }
    }

    Ok(unlocked)
}
