use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    Achievement, FriendEntry, LeaderboardEntry, SelectedFriend, StoreError, StoreResult,
    UserProfile, UserStore,
};

#[derive(Debug, Clone)]
struct MemoryUser {
    name: String,
    points: i64,
    selected_friend: Option<(String, DateTime<Utc>)>,
    friends: Vec<(String, DateTime<Utc>)>,
    achievements: Vec<Achievement>,
}

/// 进程内存储，用于测试和本地调试；可以模拟写入失败和写入延迟
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, MemoryUser>>,
    fail_writes: AtomicBool,
    write_delay: RwLock<Option<Duration>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: &str, name: &str, points: i64) {
        self.users.write().await.insert(
            user_id.to_string(),
            MemoryUser {
                name: name.to_string(),
                points,
                selected_friend: None,
                friends: Vec::new(),
                achievements: Vec::new(),
            },
        );
    }

    pub async fn points(&self, user_id: &str) -> Option<i64> {
        self.users.read().await.get(user_id).map(|u| u.points)
    }

    pub async fn selected_friend(&self, user_id: &str) -> Option<String> {
        self.users
            .read()
            .await
            .get(user_id)
            .and_then(|u| u.selected_friend.as_ref())
            .map(|(friend, _)| friend.clone())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.write().await = delay;
    }

    async fn before_write(&self) -> StoreResult<()> {
        let delay = *self.write_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user_points(&self, user_id: &str) -> StoreResult<Option<i64>> {
        Ok(self.points(user_id).await)
    }

    async fn set_user_points(&self, user_id: &str, points: i64) -> StoreResult<()> {
        self.before_write().await?;
        match self.users.write().await.get_mut(user_id) {
            Some(user) => {
                user.points = points;
                Ok(())
            }
            None => Err(sqlx::Error::RowNotFound.into()),
        }
    }

    async fn set_selected_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        selected_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.before_write().await?;
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.selected_friend = Some((friend_id.to_string(), selected_at));
        }
        Ok(())
    }

    async fn clear_selected_friend(&self, user_id: &str) -> StoreResult<()> {
        self.before_write().await?;
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.selected_friend = None;
        }
        Ok(())
    }

    async fn list_selected_friends(&self) -> StoreResult<Vec<SelectedFriend>> {
        let mut pointers: Vec<SelectedFriend> = self
            .users
            .read()
            .await
            .iter()
            .filter_map(|(user_id, user)| {
                user.selected_friend
                    .as_ref()
                    .map(|(friend_id, selected_at)| SelectedFriend {
                        user_id: user_id.clone(),
                        friend_id: friend_id.clone(),
                        selected_at: *selected_at,
                    })
            })
            .collect();
        pointers.sort_by(|a, b| a.selected_at.cmp(&b.selected_at));
        Ok(pointers)
    }

    async fn top_users(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut users: Vec<LeaderboardEntry> = self
            .users
            .read()
            .await
            .iter()
            .map(|(user_id, user)| LeaderboardEntry {
                user_id: user_id.clone(),
                name: user.name.clone(),
                points: user.points,
            })
            .collect();
        users.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn user_rank(&self, user_id: &str) -> StoreResult<Option<i64>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).map(|me| {
            users.values().filter(|other| other.points > me.points).count() as i64 + 1
        }))
    }

    async fn find_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .users
            .read()
            .await
            .get(user_id)
            .map(|user| UserProfile {
                user_id: user_id.to_string(),
                name: user.name.clone(),
                points: user.points,
                friend_count: user.friends.len() as i64,
            }))
    }

    async fn add_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        added_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.before_write().await?;
        let mut users = self.users.write().await;
        // 与外键约束一致：双方都必须存在
        if !users.contains_key(friend_id) {
            return Err(sqlx::Error::RowNotFound.into());
        }
        let user = users.get_mut(user_id).ok_or(sqlx::Error::RowNotFound)?;
        if user.friends.iter().any(|(id, _)| id == friend_id) {
            return Ok(false);
        }
        user.friends.push((friend_id.to_string(), added_at));
        Ok(true)
    }

    async fn list_friends(&self, user_id: &str) -> StoreResult<Vec<FriendEntry>> {
        let users = self.users.read().await;
        let Some(user) = users.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut friends: Vec<FriendEntry> = user
            .friends
            .iter()
            .filter_map(|(friend_id, added_at)| {
                users.get(friend_id).map(|friend| FriendEntry {
                    user_id: friend_id.clone(),
                    name: friend.name.clone(),
                    points: friend.points,
                    added_at: *added_at,
                })
            })
            .collect();
        friends.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(friends)
    }

    async fn friend_count(&self, user_id: &str) -> StoreResult<i64> {
        Ok(self
            .users
            .read()
            .await
            .get(user_id)
            .map_or(0, |user| user.friends.len() as i64))
    }

    async fn list_achievements(&self, user_id: &str) -> StoreResult<Vec<Achievement>> {
        Ok(self
            .users
            .read()
            .await
            .get(user_id)
            .map(|user| user.achievements.clone())
            .unwrap_or_default())
    }

    async fn unlock_achievement(
        &self,
        user_id: &str,
        achievement: &Achievement,
    ) -> StoreResult<bool> {
        self.before_write().await?;
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or(sqlx::Error::RowNotFound)?;
        if user.achievements.iter().any(|a| a.title == achievement.title) {
            return Ok(false);
        }
        user.achievements.push(achievement.clone());
        user.points += achievement.reward;
        Ok(true)
    }
}
