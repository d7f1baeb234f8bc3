use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Tracker;

/// 在后台启动 tick 循环，取消 `shutdown` 后循环退出
pub fn spawn(tracker: Arc<Tracker>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(tracker, shutdown))
}

pub async fn run(tracker: Arc<Tracker>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(tracker.config().tick_interval());
    // 上一次 tick 未完成时推迟下一次，不会并发执行
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = tracker.config().tick_interval_secs,
        "Tracker tick loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let report = tracker.tick().await;
                if report.expired_sessions > 0
                    || report.awards > 0
                    || report.failed_awards > 0
                    || report.achievements_unlocked > 0
                {
                    tracing::info!(?report, "Tick finished");
                } else {
                    tracing::debug!(?report, "Tick finished");
                }
            }
        }
    }

    tracing::info!("Tracker tick loop stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::TrackerConfig;
    use crate::store::MemoryUserStore;
    use crate::tracker::MILESTONES;

    #[tokio::test(start_paused = true)]
    async fn loop_awards_every_interval_and_stops_on_cancel() {
        let store = Arc::new(MemoryUserStore::new());
        store.insert_user("alice", "Alice", 0).await;
        store.insert_user("bob", "Bob", 0).await;

        let tracker = Arc::new(Tracker::new(TrackerConfig::default(), store.clone()));
        tracker.add_tracking("alice", "bob").await.unwrap();
        tracker.update_location("alice", 10.0, 10.0).await.unwrap();
        tracker.update_location("bob", 10.0, 10.0).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn(tracker.clone(), shutdown.clone());

        // 第一次 tick 立即执行，之后每 5 秒一次：0s、5s、10s；第一次相遇另有成就奖励
        let expected = 3 + MILESTONES[0].reward;
        tokio::time::sleep(Duration::from_secs(11)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(store.points("alice").await, Some(expected));
        assert_eq!(store.points("bob").await, Some(expected));

        // 停止后不再计分
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(store.points("alice").await, Some(expected));
    }
}
