use std::time::Duration;

use crate::config::TrackerConfig;
use crate::store::{StoreResult, UserStore, with_timeout};

use super::geo::zone_multiplier;
use super::location::LocationEntry;

/// 单次 tick 的奖励 = 基础奖励 × 围栏倍率
pub fn reward_for(config: &TrackerConfig, location: &LocationEntry) -> f64 {
    config.base_reward
        * zone_multiplier(
            &config.geofences,
            location.latitude,
            location.longitude,
            config.geofence_multiplier,
        )
}

/// 读取积分、加上奖励、写回。用户不存在时返回 None。
///
/// 没有事务保护：tick 循环是积分唯一的写入方，串行执行。
pub async fn award_points(
    store: &dyn UserStore,
    user_id: &str,
    amount: f64,
    timeout: Duration,
) -> StoreResult<Option<i64>> {
    let Some(current) = with_timeout(timeout, store.find_user_points(user_id)).await? else {
        return Ok(None);
    };

    // 存储层积分为整数
    let total = current + amount.round() as i64;
    with_timeout(timeout, store.set_user_points(user_id, total)).await?;

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::{MemoryUserStore, StoreError};
    use crate::tracker::GeofenceZone;

    fn entry(latitude: f64, longitude: f64) -> LocationEntry {
        LocationEntry {
            latitude,
            longitude,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn reward_doubles_inside_geofence() {
        let config = TrackerConfig {
            geofences: vec![GeofenceZone {
                latitude: 10.0,
                longitude: 10.0,
                radius_meters: 100.0,
            }],
            ..TrackerConfig::default()
        };
        assert_eq!(reward_for(&config, &entry(10.0, 10.0)), 2.0);
        assert_eq!(reward_for(&config, &entry(11.0, 10.0)), 1.0);
    }

    #[tokio::test]
    async fn award_adds_to_existing_points() {
        let store = MemoryUserStore::new();
        store.insert_user("alice", "Alice", 7).await;

        let total = award_points(&store, "alice", 2.0, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(total, Some(9));
        assert_eq!(store.points("alice").await, Some(9));
    }

    #[tokio::test]
    async fn award_rounds_fractional_amounts() {
        let store = MemoryUserStore::new();
        store.insert_user("alice", "Alice", 0).await;

        award_points(&store, "alice", 1.5, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.points("alice").await, Some(2));
    }

    #[tokio::test]
    async fn award_for_unknown_user_is_skipped() {
        let store = MemoryUserStore::new();
        let total = award_points(&store, "ghost", 1.0, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(total, None);
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = MemoryUserStore::new();
        store.insert_user("alice", "Alice", 0).await;
        store.set_write_delay(Some(Duration::from_millis(200))).await;

        let err = award_points(&store, "alice", 1.0, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
        assert_eq!(store.points("alice").await, Some(0));
    }
}
