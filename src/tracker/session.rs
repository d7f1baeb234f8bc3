use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error::{TrackerError, TrackerResult};

/// 用户在会话中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// 发起追踪的一方
    Tracker,
    /// 被追踪的一方
    Tracked,
}

/// 追踪会话：initiator 选中了 target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSession {
    pub initiator: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    /// 本次会话中双方累计获得的积分（仅内存）
    pub initiator_points: f64,
    pub target_points: f64,
    /// 双方已互相加入图鉴
    pub met: bool,
}

impl TrackingSession {
    fn new(initiator: &str, target: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            initiator: initiator.to_string(),
            target: target.to_string(),
            started_at,
            initiator_points: 0.0,
            target_points: 0.0,
            met: false,
        }
    }

    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.started_at + ttl
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.started_at > ttl
    }

    /// 剩余时间，已过期时为零
    pub fn remaining(&self, now: DateTime<Utc>, ttl: Duration) -> Duration {
        (self.expires_at(ttl) - now).max(Duration::zero())
    }

    pub fn points_for(&self, role: SessionRole) -> f64 {
        match role {
            SessionRole::Tracker => self.initiator_points,
            SessionRole::Tracked => self.target_points,
        }
    }
}

/// 会话表：每个发起者最多一个会话，每个目标最多被一个人追踪
#[derive(Debug, Default)]
pub struct SessionTable {
    by_initiator: HashMap<String, TrackingSession>,
    // target -> initiator
    by_target: HashMap<String, String>,
}

impl SessionTable {
    /// 建立会话并替换发起者已有的会话，返回被替换的旧会话
    pub fn insert(
        &mut self,
        initiator: &str,
        target: &str,
        started_at: DateTime<Utc>,
    ) -> TrackerResult<Option<TrackingSession>> {
        if initiator.is_empty() || target.is_empty() {
            return Err(TrackerError::Validation("user id must not be empty".into()));
        }
        if initiator == target {
            return Err(TrackerError::Validation("cannot track yourself".into()));
        }
        if let Some(current) = self.by_target.get(target) {
            if current != initiator {
                return Err(TrackerError::Conflict(format!(
                    "user {} is already being tracked",
                    target
                )));
            }
        }

        let replaced = self.remove(initiator);
        self.by_target
            .insert(target.to_string(), initiator.to_string());
        self.by_initiator.insert(
            initiator.to_string(),
            TrackingSession::new(initiator, target, started_at),
        );

        Ok(replaced)
    }

    pub fn remove(&mut self, initiator: &str) -> Option<TrackingSession> {
        let session = self.by_initiator.remove(initiator)?;
        self.by_target.remove(&session.target);
        Some(session)
    }

    pub fn get(&self, initiator: &str) -> Option<&TrackingSession> {
        self.by_initiator.get(initiator)
    }

    /// 查找用户参与的会话，同时是发起者和目标时优先返回发起的会话
    pub fn find(&self, user_id: &str) -> Option<(&TrackingSession, SessionRole)> {
        if let Some(session) = self.by_initiator.get(user_id) {
            return Some((session, SessionRole::Tracker));
        }
        self.by_target
            .get(user_id)
            .and_then(|initiator| self.by_initiator.get(initiator))
            .map(|session| (session, SessionRole::Tracked))
    }

    /// 移除所有过期会话并返回它们
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<TrackingSession> {
        let expired: Vec<String> = self
            .by_initiator
            .values()
            .filter(|session| session.is_expired(now, ttl))
            .map(|session| session.initiator.clone())
            .collect();

        expired
            .iter()
            .filter_map(|initiator| self.remove(initiator))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<TrackingSession> {
        self.by_initiator.values().cloned().collect()
    }

    /// 给会话中的一方累加积分；会话已被替换或移除时返回 false
    pub fn credit(
        &mut self,
        initiator: &str,
        started_at: DateTime<Utc>,
        role: SessionRole,
        amount: f64,
    ) -> bool {
        match self.by_initiator.get_mut(initiator) {
            Some(session) if session.started_at == started_at => {
                match role {
                    SessionRole::Tracker => session.initiator_points += amount,
                    SessionRole::Tracked => session.target_points += amount,
                }
                true
            }
            _ => false,
        }
    }

    /// 标记双方已相遇；会话已被替换或移除时返回 false
    pub fn mark_met(&mut self, initiator: &str, started_at: DateTime<Utc>) -> bool {
        match self.by_initiator.get_mut(initiator) {
            Some(session) if session.started_at == started_at => {
                session.met = true;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_initiator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_initiator.is_empty()
    }
}
