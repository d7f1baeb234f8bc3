use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    Achievement, FriendEntry, LeaderboardEntry, SelectedFriend, StoreResult, UserProfile, UserStore,
};

/// 基于 Postgres users 表的存储实现
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user_points(&self, user_id: &str) -> StoreResult<Option<i64>> {
        let points = sqlx::query_scalar::<_, i64>("SELECT points FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(points)
    }

    async fn set_user_points(&self, user_id: &str, points: i64) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET points = $1 WHERE user_id = $2")
            .bind(points)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        Ok(())
    }

    async fn set_selected_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        selected_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET selected_friend = $1, selected_at = $2
            WHERE user_id = $3
            "#,
        )
        .bind(friend_id)
        .bind(selected_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_selected_friend(&self, user_id: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET selected_friend = NULL, selected_at = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_selected_friends(&self) -> StoreResult<Vec<SelectedFriend>> {
        // 缺少选择时间的指针按 epoch 处理，重建时会被当作过期清理
        let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            r#"
            SELECT
                user_id,
                selected_friend,
                COALESCE(selected_at, to_timestamp(0)) AS selected_at
            FROM users
            WHERE selected_friend IS NOT NULL
            ORDER BY selected_at ASC NULLS FIRST
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, friend_id, selected_at)| SelectedFriend {
                user_id,
                friend_id,
                selected_at,
            })
            .collect())
    }

    async fn top_users(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        let users = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT user_id, name, points
            FROM users
            ORDER BY points DESC, name ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn user_rank(&self, user_id: &str) -> StoreResult<Option<i64>> {
        let rank = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT (SELECT COUNT(*) FROM users o WHERE o.points > u.points) + 1
            FROM users u
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rank)
    }

    async fn find_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT
                u.user_id,
                u.name,
                u.points,
                (SELECT COUNT(*) FROM friendships f WHERE f.user_id = u.user_id) AS friend_count
            FROM users u
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn add_friend(
        &self,
        user_id: &str,
        friend_id: &str,
        added_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO friendships (user_id, friend_id, added_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, friend_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(friend_id)
        .bind(added_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_friends(&self, user_id: &str) -> StoreResult<Vec<FriendEntry>> {
        let friends = sqlx::query_as::<_, FriendEntry>(
            r#"
            SELECT u.user_id, u.name, u.points, f.added_at
            FROM friendships f
            JOIN users u ON u.user_id = f.friend_id
            WHERE f.user_id = $1
            ORDER BY f.added_at ASC, u.user_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(friends)
    }

    async fn friend_count(&self, user_id: &str) -> StoreResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM friendships WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn list_achievements(&self, user_id: &str) -> StoreResult<Vec<Achievement>> {
        let achievements = sqlx::query_as::<_, Achievement>(
            r#"
            SELECT title, description, reward, unlocked_at
            FROM achievements
            WHERE user_id = $1
            ORDER BY unlocked_at ASC, title ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(achievements)
    }

    async fn unlock_achievement(
        &self,
        user_id: &str,
        achievement: &Achievement,
    ) -> StoreResult<bool> {
        // 开启事务
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO achievements (user_id, title, description, reward, unlocked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, title) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&achievement.title)
        .bind(&achievement.description)
        .bind(achievement.reward)
        .bind(achievement.unlocked_at)
        .execute(&mut *tx)
        .await?;

        // 已经解锁过，事务随 tx 丢弃回滚
        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        let updated = sqlx::query("UPDATE users SET points = points + $1 WHERE user_id = $2")
            .bind(achievement.reward)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        tx.commit().await?;

        Ok(true)
    }
}
