use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// 用户最近一次上报的位置，只保留最新一条
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl LocationEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.observed_at <= ttl
    }
}

/// 位置表，读取时不会自动清理过期条目，过期条目由定时清扫移除
#[derive(Debug, Default)]
pub struct LocationTable {
    entries: HashMap<String, LocationEntry>,
}

impl LocationTable {
    pub fn upsert(&mut self, user_id: &str, latitude: f64, longitude: f64, now: DateTime<Utc>) {
        self.entries.insert(
            user_id.to_string(),
            LocationEntry {
                latitude,
                longitude,
                observed_at: now,
            },
        );
    }

    /// 删除位置，返回是否存在过
    pub fn remove(&mut self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    pub fn get(&self, user_id: &str) -> Option<&LocationEntry> {
        self.entries.get(user_id)
    }

    /// 只返回未过期的位置
    pub fn get_fresh(&self, user_id: &str, now: DateTime<Utc>, ttl: Duration) -> Option<&LocationEntry> {
        self.entries
            .get(user_id)
            .filter(|entry| entry.is_fresh(now, ttl))
    }

    /// 移除所有过期位置，返回移除数量
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now, ttl));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Duration {
        Duration::seconds(30)
    }

    #[test]
    fn upsert_overwrites_previous_entry() {
        let now = Utc::now();
        let mut table = LocationTable::default();
        table.upsert("alice", 1.0, 2.0, now);
        table.upsert("alice", 3.0, 4.0, now + Duration::seconds(1));

        let entry = table.get("alice").unwrap();
        assert_eq!(entry.latitude, 3.0);
        assert_eq!(entry.longitude, 4.0);
        assert_eq!(entry.observed_at, now + Duration::seconds(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = LocationTable::default();
        table.upsert("alice", 1.0, 2.0, Utc::now());
        assert!(table.remove("alice"));
        assert!(!table.remove("alice"));
        assert!(table.is_empty());
    }

    #[test]
    fn get_does_not_purge_but_get_fresh_filters() {
        let now = Utc::now();
        let mut table = LocationTable::default();
        table.upsert("alice", 1.0, 2.0, now - Duration::seconds(31));

        assert!(table.get("alice").is_some());
        assert!(table.get_fresh("alice", now, ttl()).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_at_exact_ttl_is_still_fresh() {
        let now = Utc::now();
        let mut table = LocationTable::default();
        table.upsert("alice", 1.0, 2.0, now - ttl());
        assert!(table.get_fresh("alice", now, ttl()).is_some());
        assert_eq!(table.sweep_expired(now, ttl()), 0);
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let now = Utc::now();
        let mut table = LocationTable::default();
        table.upsert("stale", 1.0, 2.0, now - Duration::seconds(60));
        table.upsert("fresh", 1.0, 2.0, now - Duration::seconds(5));

        assert_eq!(table.sweep_expired(now, ttl()), 1);
        assert!(table.get("stale").is_none());
        assert!(table.get("fresh").is_some());
    }
}
