// 追踪引擎
// 在内存中维护用户位置和追踪会话，由 tick 循环定期清理过期数据、判定距离并发放积分
// 双方第一次相遇时互相加入图鉴，并按好友数解锁成就

mod achievements;
mod error;
mod geo;
mod location;
mod scoring;
mod session;
pub mod ticker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::config::TrackerConfig;
use crate::store::{UserStore, with_timeout};

pub use achievements::{MILESTONES, Milestone};
pub use error::{TrackerError, TrackerResult};
pub use geo::{GeofenceZone, haversine_km, is_valid_coordinate};
pub use location::{LocationEntry, LocationTable};
pub use session::{SessionRole, SessionTable, TrackingSession};

/// 用户视角下的会话
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: TrackingSession,
    pub role: SessionRole,
}

impl SessionView {
    /// 会话中的另一方
    pub fn partner(&self) -> &str {
        match self.role {
            SessionRole::Tracker => &self.session.target,
            SessionRole::Tracked => &self.session.initiator,
        }
    }
}

/// 单次 tick 的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub expired_locations: usize,
    pub expired_sessions: usize,
    /// 双方都有新鲜位置的会话数
    pub evaluated_sessions: usize,
    /// 距离在阈值内的会话数
    pub close_sessions: usize,
    pub awards: usize,
    pub failed_awards: usize,
    pub new_friendships: usize,
    pub achievements_unlocked: usize,
}

/// 追踪引擎。进程启动时创建一次，通过 `Arc` 在路由和 tick 任务之间共享。
///
/// 位置表和会话表各自一把锁，只在单次读写期间持有，不会跨存储 I/O，也不会同时持有两把。
///
/// 同一用户的“已选好友”指针写入由该用户的指针锁串行化：会话表的修改和对应的存储写入
/// 在同一把指针锁内完成，存储中的指针始终反映最后一次选择或取消。
pub struct Tracker {
    config: TrackerConfig,
    store: Arc<dyn UserStore>,
    locations: RwLock<LocationTable>,
    sessions: RwLock<SessionTable>,
    // 清除“已选好友”失败的用户，下个 tick 重试
    pending_clears: Mutex<HashSet<String>>,
    pointer_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Tracker {
    pub fn new(config: TrackerConfig, store: Arc<dyn UserStore>) -> Self {
        Self {
            config,
            store,
            locations: RwLock::new(LocationTable::default()),
            sessions: RwLock::new(SessionTable::default()),
            pending_clears: Mutex::new(HashSet::new()),
            pointer_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub async fn update_location(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> TrackerResult<LocationEntry> {
        self.update_location_at(user_id, latitude, longitude, Utc::now())
            .await
    }

    async fn update_location_at(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> TrackerResult<LocationEntry> {
        if user_id.is_empty() {
            return Err(TrackerError::Validation("user id must not be empty".into()));
        }
        if !is_valid_coordinate(latitude, longitude) {
            return Err(TrackerError::Validation(format!(
                "invalid coordinate ({}, {})",
                latitude, longitude
            )));
        }

        self.locations
            .write()
            .await
            .upsert(user_id, latitude, longitude, now);

        Ok(LocationEntry {
            latitude,
            longitude,
            observed_at: now,
        })
    }

    /// 删除位置，不存在时不报错
    pub async fn remove_location(&self, user_id: &str) {
        if self.locations.write().await.remove(user_id) {
            tracing::debug!(user_id, "Location removed");
        }
    }

    /// 返回原始位置，不检查是否过期
    pub async fn get_location(&self, user_id: &str) -> TrackerResult<LocationEntry> {
        self.locations
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("no location for user {}", user_id)))
    }

    /// 只返回未过期的位置
    pub async fn fresh_location(&self, user_id: &str) -> TrackerResult<LocationEntry> {
        let now = Utc::now();
        self.locations
            .read()
            .await
            .get_fresh(user_id, now, self.config.location_ttl())
            .cloned()
            .ok_or_else(|| {
                TrackerError::NotFound(format!("no fresh location for user {}", user_id))
            })
    }

    pub async fn add_tracking(&self, initiator: &str, target: &str) -> TrackerResult<TrackingSession> {
        self.add_tracking_at(initiator, target, Utc::now()).await
    }

    async fn add_tracking_at(
        &self,
        initiator: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> TrackerResult<TrackingSession> {
        let _pointer = self.pointer_lock(initiator).await;

        let session = {
            let mut sessions = self.sessions.write().await;
            if let Some(replaced) = sessions.insert(initiator, target, now)? {
                tracing::debug!(
                    initiator,
                    previous_target = %replaced.target,
                    "Replacing tracking session"
                );
            }
            sessions
                .get(initiator)
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(format!("no session for {}", initiator)))?
        };

        // 新的选择覆盖尚未完成的清除
        self.pending_clears.lock().await.remove(initiator);

        if let Err(e) = with_timeout(
            self.config.store_timeout(),
            self.store.set_selected_friend(initiator, target, now),
        )
        .await
        {
            tracing::warn!(initiator, target, "Failed to persist selected friend: {}", e);
        }

        tracing::info!(initiator, target, "Tracking session started");
        Ok(session)
    }

    /// 结束发起者的会话并清除持久化的“已选好友”，不存在时不报错
    pub async fn remove_tracking(&self, initiator: &str) -> Option<TrackingSession> {
        let _pointer = self.pointer_lock(initiator).await;

        let removed = self.sessions.write().await.remove(initiator);
        if let Some(session) = &removed {
            tracing::info!(initiator, target = %session.target, "Tracking session removed");
        }
        self.clear_pointer(initiator).await;
        removed
    }

    pub async fn get_session(&self, user_id: &str) -> TrackerResult<SessionView> {
        self.sessions
            .read()
            .await
            .find(user_id)
            .map(|(session, role)| SessionView {
                session: session.clone(),
                role,
            })
            .ok_or_else(|| TrackerError::NotFound(format!("no session for user {}", user_id)))
    }

    /// 会话剩余时间
    pub async fn session_time_remaining(&self, user_id: &str) -> TrackerResult<Duration> {
        let view = self.get_session(user_id).await?;
        Ok(view
            .session
            .remaining(Utc::now(), self.config.tracking_ttl()))
    }

    /// 本次会话中该用户累计获得的积分
    pub async fn session_points(&self, user_id: &str) -> TrackerResult<f64> {
        let view = self.get_session(user_id).await?;
        Ok(view.session.points_for(view.role))
    }

    /// 启动时根据持久化的“已选好友”指针重建会话，返回重建数量
    pub async fn rehydrate(&self) -> TrackerResult<usize> {
        self.rehydrate_at(Utc::now()).await
    }

    async fn rehydrate_at(&self, now: DateTime<Utc>) -> TrackerResult<usize> {
        let pointers =
            with_timeout(self.config.store_timeout(), self.store.list_selected_friends()).await?;
        let ttl = self.config.tracking_ttl();

        let mut restored = 0;
        let mut rejected = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for pointer in pointers {
                if now - pointer.selected_at > ttl {
                    rejected.push(pointer.user_id);
                    continue;
                }
                match sessions.insert(&pointer.user_id, &pointer.friend_id, pointer.selected_at) {
                    Ok(_) => restored += 1,
                    Err(e) => {
                        tracing::warn!(
                            user_id = %pointer.user_id,
                            friend_id = %pointer.friend_id,
                            "Dropping persisted selection: {}",
                            e
                        );
                        rejected.push(pointer.user_id);
                    }
                }
            }
        }

        for user_id in rejected {
            self.clear_selected_friend(&user_id).await;
        }

        tracing::info!(restored, "Tracking sessions rehydrated");
        Ok(restored)
    }

    /// 执行一次 tick：清理过期位置 → 清理过期会话 → 判定距离并发放积分
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            expired_locations: self.sweep_locations(now).await,
            expired_sessions: self.sweep_sessions(now).await,
            ..TickReport::default()
        };
        self.evaluate_sessions(now, &mut report).await;
        report
    }

    async fn sweep_locations(&self, now: DateTime<Utc>) -> usize {
        self.locations
            .write()
            .await
            .sweep_expired(now, self.config.location_ttl())
    }

    async fn sweep_sessions(&self, now: DateTime<Utc>) -> usize {
        let retry: Vec<String> = self.pending_clears.lock().await.drain().collect();
        for user_id in retry {
            self.clear_selected_friend(&user_id).await;
        }

        // 没有任务持有或等待的指针锁可以丢弃
        self.pointer_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        // 不管存储是否写成功，内存中的会话都会被移除
        let expired = self
            .sessions
            .write()
            .await
            .sweep_expired(now, self.config.tracking_ttl());

        for session in &expired {
            tracing::info!(
                initiator = %session.initiator,
                target = %session.target,
                initiator_points = session.initiator_points,
                target_points = session.target_points,
                "Tracking session expired"
            );
            self.clear_selected_friend(&session.initiator).await;
        }

        expired.len()
    }

    async fn evaluate_sessions(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let sessions = self.sessions.read().await.snapshot();
        let ttl = self.config.location_ttl();

        let mut close = Vec::new();
        {
            let locations = self.locations.read().await;
            for session in sessions {
                let (Some(a), Some(b)) = (
                    locations.get_fresh(&session.initiator, now, ttl),
                    locations.get_fresh(&session.target, now, ttl),
                ) else {
                    continue;
                };
                report.evaluated_sessions += 1;

                let distance = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
                if distance <= self.config.max_distance_km {
                    let initiator_reward = scoring::reward_for(&self.config, a);
                    let target_reward = scoring::reward_for(&self.config, b);
                    close.push((session, initiator_reward, target_reward));
                }
            }
        }
        report.close_sessions = close.len();

        for (session, initiator_reward, target_reward) in close {
            let parties = [
                (&session.initiator, SessionRole::Tracker, initiator_reward),
                (&session.target, SessionRole::Tracked, target_reward),
            ];
            for (user_id, role, amount) in parties {
                match scoring::award_points(
                    self.store.as_ref(),
                    user_id,
                    amount,
                    self.config.store_timeout(),
                )
                .await
                {
                    Ok(Some(total)) => {
                        self.sessions.write().await.credit(
                            &session.initiator,
                            session.started_at,
                            role,
                            amount,
                        );
                        report.awards += 1;
                        tracing::debug!(user_id = %user_id, amount, total, "Points awarded");
                    }
                    Ok(None) => {
                        report.failed_awards += 1;
                        tracing::warn!(user_id = %user_id, "Skipping award for unknown user");
                    }
                    Err(e) => {
                        report.failed_awards += 1;
                        tracing::error!(user_id = %user_id, "Failed to award points: {}", e);
                    }
                }
            }

            if !session.met {
                self.record_meeting(&session, now, report).await;
            }
        }
    }

    /// 双方互相加入图鉴并检查成就，全部成功后标记会话，失败时下个 tick 重试
    async fn record_meeting(
        &self,
        session: &TrackingSession,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let timeout = self.config.store_timeout();
        let parties = [
            (&session.initiator, &session.target),
            (&session.target, &session.initiator),
        ];

        for (user_id, friend_id) in parties {
            match with_timeout(timeout, self.store.add_friend(user_id, friend_id, now)).await {
                Ok(true) => {
                    report.new_friendships += 1;
                    tracing::info!(user_id = %user_id, friend_id = %friend_id, "Friend added");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(user_id = %user_id, friend_id = %friend_id, "Failed to add friend: {}", e);
                    return;
                }
            }
        }

        for (user_id, _) in parties {
            match achievements::unlock_milestones(self.store.as_ref(), user_id, now, timeout).await
            {
                Ok(unlocked) => {
                    for achievement in &unlocked {
                        tracing::info!(
                            user_id = %user_id,
                            title = %achievement.title,
                            reward = achievement.reward,
                            "Achievement unlocked"
                        );
                    }
                    report.achievements_unlocked += unlocked.len();
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "Failed to unlock achievements: {}", e);
                    return;
                }
            }
        }

        self.sessions
            .write()
            .await
            .mark_met(&session.initiator, session.started_at);
    }

    /// 获取用户的指针锁，锁内的指针写入按获取顺序执行
    async fn pointer_lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .pointer_locks
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// 清除持久化的“已选好友”，失败时加入重试队列
    async fn clear_selected_friend(&self, user_id: &str) {
        let _pointer = self.pointer_lock(user_id).await;
        self.clear_pointer(user_id).await;
    }

    // 调用方必须持有该用户的指针锁
    async fn clear_pointer(&self, user_id: &str) {
        // 用户已经重新选择了好友，指针有效
        if self.sessions.read().await.get(user_id).is_some() {
            return;
        }

        if let Err(e) = with_timeout(
            self.config.store_timeout(),
            self.store.clear_selected_friend(user_id),
        )
        .await
        {
            tracing::warn!(user_id, "Failed to clear selected friend, will retry: {}", e);
            self.pending_clears
                .lock()
                .await
                .insert(user_id.to_string());
        }
    }
}
