use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// One compactor tick. Returns true if the WAL was rewritten.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted wal after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("wal compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("theatre_sched_test_compactor_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn below_threshold_is_left_alone() {
        let engine = Engine::new(test_wal_path("below.wal")).unwrap();
        engine.create_theatre(1, "OT-1".into(), 4).await.unwrap();

        assert!(!compact_if_needed(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn compacts_past_threshold_and_keeps_state() {
        let path = test_wal_path("past.wal");
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_theatre(1, "OT-1".into(), 4).await.unwrap();
        let window = TimeWindow::parse("2024-06-01", "09:00", "10:00").unwrap();
        for id in 0..5 {
            engine
                .schedule_surgery(NewBooking {
                    surgery_id: id,
                    theatre_id: 1,
                    window,
                    status: BookingStatus::Scheduled,
                    surgery_type: None,
                    surgeon_id: None,
                    patient_id: None,
                })
                .await
                .unwrap();
            engine.remove_surgery(id).await.unwrap();
        }
        let before = std::fs::metadata(&path).unwrap().len();

        assert!(compact_if_needed(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert!(std::fs::metadata(&path).unwrap().len() < before);

        let replayed = Engine::new(path).unwrap();
        assert_eq!(replayed.list_theatres().await.len(), 1);
        assert!(replayed.list_surgeries().await.is_empty());
    }
}
