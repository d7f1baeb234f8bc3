// 用户存储模块
// 追踪引擎只通过 UserStore 读写积分、“已选好友”指针、好友图鉴和成就

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 持久化在用户记录上的“已选好友”指针
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFriend {
    pub user_id: String,
    pub friend_id: String,
    pub selected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub points: i64,
}

/// 公开的用户资料（图鉴条目）
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub points: i64,
    pub friend_count: i64,
}

/// 图鉴中的一位好友
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FriendEntry {
    pub user_id: String,
    pub name: String,
    pub points: i64,
    pub added_at: DateTime<Utc>,
}

/// 已解锁的成就，reward 在解锁时计入积分
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Achievement {
    pub title: String,
    pub description: String,
    pub reward: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// 给存储调用加上超时，超时按写入失败处理
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout)?
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// 用户不存在时返回 None
    async fn find_user_points(&self, user_id: &str) -> StoreResult<Option<i64>>;

    async fn set_user_points(&self, user_id: &str, points: i64) -> StoreResult<()>;

    async fn set_selected_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        selected_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn clear_selected_friend(&self, user_id: &str) -> StoreResult<()>;

    /// 所有已选好友指针，按选择时间从早到晚排序
    async fn list_selected_friends(&self) -> StoreResult<Vec<SelectedFriend>>;

    /// 积分从高到低，同分按名字排序
    async fn top_users(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>>;

    /// 排名 = 积分严格高于该用户的人数 + 1
    async fn user_rank(&self, user_id: &str) -> StoreResult<Option<i64>>;

    async fn find_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;

    /// 单向加入图鉴，已存在时返回 false
    async fn add_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        added_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// 按加入时间从早到晚
    async fn list_friends(&self, user_id: &str) -> StoreResult<Vec<FriendEntry>>;

    async fn friend_count(&self, user_id: &str) -> StoreResult<i64>;

    /// 按解锁时间从早到晚
    async fn list_achievements(&self, user_id: &str) -> StoreResult<Vec<Achievement>>;

    /// 记录成就并把奖励加到积分上，两者原子完成。已解锁过时返回 false，积分不变。
    async fn unlock_achievement(
        &self,
        user_id: &str,
        achievement: &Achievement,
    ) -> StoreResult<bool>;
}
