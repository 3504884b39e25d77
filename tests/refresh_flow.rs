use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use breathwise::{
    ChangeReason, CurrentEnvironmentData, DominantDriver, EnvironmentUpdate, FeedClient, FeedKey,
    FeedKind, FixedLocation, KeyValueStore, MemoryStore, RefreshConfig, RefreshOrchestrator,
    RefreshReason, RefreshScheduler, SqliteStore,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingFeeds {
    calls: Mutex<Vec<FeedKey>>,
    failing: Option<FeedKind>,
    delay: Duration,
}

impl RecordingFeeds {
    fn failing(kind: FeedKind) -> Self {
        Self {
            failing: Some(kind),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn count(&self, kind: FeedKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.kind == kind)
            .count()
    }
}

#[async_trait]
impl FeedClient for RecordingFeeds {
    async fn invalidate_and_refetch(&self, key: &FeedKey) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(*key);
        if self.failing == Some(key.kind) {
            bail!("{} unavailable", key.kind.as_str());
        }
        Ok(())
    }
}

struct Harness {
    feeds: Arc<RecordingFeeds>,
    current: Arc<Mutex<Option<CurrentEnvironmentData>>>,
    orchestrator: Arc<RefreshOrchestrator>,
}

impl Harness {
    fn set_current(&self, data: Option<CurrentEnvironmentData>) {
        *self.current.lock().unwrap() = data;
    }
}

fn test_config() -> RefreshConfig {
    RefreshConfig {
        settle_delay: Duration::ZERO,
        ..Default::default()
    }
}

async fn harness_with(storage: Arc<dyn KeyValueStore>, feeds: RecordingFeeds) -> Harness {
    let feeds = Arc::new(feeds);
    let current = Arc::new(Mutex::new(None));
    let accessor_source = current.clone();

    let orchestrator = RefreshOrchestrator::load(
        storage,
        &test_config(),
        feeds.clone(),
        Arc::new(FixedLocation::new(40.71, -74.0)),
        Arc::new(move || accessor_source.lock().unwrap().clone()),
    )
    .await
    .unwrap();

    Harness {
        feeds,
        current,
        orchestrator: Arc::new(orchestrator),
    }
}

async fn harness(feeds: RecordingFeeds) -> Harness {
    harness_with(Arc::new(MemoryStore::new()), feeds).await
}

fn reading(score: f64) -> CurrentEnvironmentData {
    CurrentEnvironmentData {
        score,
        aqi: 40.0,
        pollen_index: 1.0,
        dominant_allergen: None,
        dominant_driver: DominantDriver::Pollution,
        temperature: 18.0,
        humidity: 40.0,
    }
}

/// Stored reading with score 4 and an advisory generated five minutes ago.
async fn seed_baseline(harness: &Harness) {
    let snapshots = harness.orchestrator.snapshots();
    snapshots
        .capture_snapshot(&EnvironmentUpdate::from(&reading(4.0)))
        .await
        .unwrap();
    snapshots
        .mark_advisor_refreshed_at(Utc::now() - chrono::Duration::minutes(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn score_jump_on_foreground_regenerates_advisory() {
    let h = harness(RecordingFeeds::default()).await;
    seed_baseline(&h).await;
    h.set_current(Some(reading(7.0)));

    let before = Utc::now();
    let result = h
        .orchestrator
        .execute_refresh(RefreshReason::AppForeground)
        .await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(result.reason, RefreshReason::AppForeground);
    assert!(result.refreshed.health);
    assert!(result.refreshed.score);
    assert!(result.refreshed.advisor);

    let detection = result.change_detection.unwrap();
    assert!(detection.should_refresh_advisor);
    assert_eq!(detection.change_reason, Some(ChangeReason::ScoreChanged));

    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 1);
    assert_eq!(h.feeds.count(FeedKind::ScorePersonalized), 1);
    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 1);

    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert_eq!(snapshot.environment.score, 7.0);
    assert!(snapshot.environment.timestamp >= before);
    assert!(snapshot.last_advisor_refresh >= before.timestamp_millis());

    assert!(h.orchestrator.cadence().state().await.last_refresh_timestamp.is_some());
}

#[tokio::test]
async fn unchanged_reading_keeps_advisory() {
    let h = harness(RecordingFeeds::default()).await;
    seed_baseline(&h).await;
    let seeded = h.orchestrator.snapshots().snapshot().await.unwrap();
    h.set_current(Some(reading(4.0)));

    let result = h.orchestrator.execute_refresh(RefreshReason::Timer).await;

    assert!(result.success);
    assert!(!result.refreshed.advisor);
    assert!(!result.change_detection.unwrap().should_refresh_advisor);
    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 0);

    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert_eq!(snapshot.last_advisor_refresh, seeded.last_advisor_refresh);
    assert!(snapshot.environment.timestamp >= seeded.environment.timestamp);
}

#[tokio::test]
async fn first_load_refreshes_everything() {
    let h = harness(RecordingFeeds::default()).await;
    h.set_current(Some(reading(5.0)));

    let result = h.orchestrator.refresh_on_foreground().await.unwrap();

    assert!(result.success);
    assert!(result.refreshed.advisor);
    assert_eq!(
        result.change_detection.unwrap().change_reason,
        Some(ChangeReason::InitialLoad)
    );

    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert_eq!(snapshot.environment.score, 5.0);
    // The advisory mark runs before the first capture exists.
    assert_eq!(snapshot.last_advisor_refresh, 0);
}

#[tokio::test]
async fn foreground_is_debounced() {
    let h = harness(RecordingFeeds::default()).await;
    h.set_current(Some(reading(5.0)));

    assert!(h.orchestrator.refresh_on_foreground().await.is_some());
    assert!(h.orchestrator.refresh_on_foreground().await.is_none());
    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 1);

    // Pull-to-refresh ignores the gate.
    let pulled = h.orchestrator.refresh_manual().await;
    assert_eq!(pulled.reason, RefreshReason::UserPull);
    assert!(pulled.refreshed.advisor);
    assert_eq!(
        pulled.change_detection.unwrap().change_reason,
        Some(ChangeReason::UserRequested)
    );
    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 2);
}

#[tokio::test]
async fn missing_data_on_pull_still_refreshes_advisory() {
    let h = harness(RecordingFeeds::default()).await;
    seed_baseline(&h).await;
    let seeded = h.orchestrator.snapshots().snapshot().await.unwrap();
    h.set_current(None);

    let result = h.orchestrator.refresh_manual().await;

    assert!(result.success);
    assert!(result.refreshed.advisor);
    assert!(result.change_detection.is_none());
    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert!(snapshot.last_advisor_refresh > seeded.last_advisor_refresh);
    assert_eq!(snapshot.environment, seeded.environment);
}

#[tokio::test]
async fn missing_data_on_foreground_skips_advisory() {
    let h = harness(RecordingFeeds::default()).await;
    seed_baseline(&h).await;
    h.set_current(None);

    let result = h
        .orchestrator
        .execute_refresh(RefreshReason::AppForeground)
        .await;

    assert!(result.success);
    assert!(result.refreshed.health && result.refreshed.score);
    assert!(!result.refreshed.advisor);
    assert!(result.change_detection.is_none());
    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 0);
}

#[tokio::test]
async fn advisory_failure_keeps_partial_progress() {
    let h = harness(RecordingFeeds::failing(FeedKind::AdvisorData)).await;
    seed_baseline(&h).await;
    let seeded = h.orchestrator.snapshots().snapshot().await.unwrap();
    h.set_current(Some(reading(9.0)));

    let result = h.orchestrator.execute_refresh(RefreshReason::Manual).await;

    assert!(!result.success);
    assert!(result.refreshed.health);
    assert!(result.refreshed.score);
    assert!(!result.refreshed.advisor);
    assert!(result.change_detection.is_some());
    let error = result.error.unwrap();
    assert!(error.contains("ADVISOR.DATA"), "error was {error}");

    // Displayed data is left intact on failure.
    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert_eq!(snapshot, seeded);

    let cadence = h.orchestrator.cadence().state().await;
    assert!(!cadence.is_refreshing);
    assert_eq!(cadence.refresh_error.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn cheap_feed_failure_marks_only_what_succeeded() {
    let h = harness(RecordingFeeds::failing(FeedKind::HealthCurrent)).await;
    h.set_current(Some(reading(5.0)));

    let result = h.orchestrator.refresh_manual().await;

    assert!(!result.success);
    assert!(!result.refreshed.health);
    assert!(result.refreshed.score);
    assert!(!result.refreshed.advisor);
    assert!(result.error.unwrap().contains("HEALTH.CURRENT"));
    assert!(h
        .orchestrator
        .cadence()
        .state()
        .await
        .last_refresh_timestamp
        .is_none());
    assert!(h.orchestrator.snapshots().snapshot().await.is_none());
}

#[tokio::test]
async fn concurrent_triggers_share_one_cycle() {
    let h = harness(RecordingFeeds::slow(Duration::from_millis(50))).await;
    h.set_current(Some(reading(5.0)));

    let (first, second) = tokio::join!(
        h.orchestrator.refresh_manual(),
        h.orchestrator.execute_refresh(RefreshReason::AppForeground),
    );

    assert_eq!(first.refresh_id, second.refresh_id);
    assert!(!first.coalesced);
    assert!(second.coalesced);
    assert_eq!(first.reason, RefreshReason::UserPull);
    assert_eq!(second.reason, RefreshReason::AppForeground);
    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 1);
    assert_eq!(h.feeds.count(FeedKind::ScorePersonalized), 1);
    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 1);
}

#[tokio::test]
async fn pull_joining_foreground_cycle_still_refreshes_advisory() {
    let h = harness(RecordingFeeds::slow(Duration::from_millis(50))).await;
    seed_baseline(&h).await;
    let seeded = h.orchestrator.snapshots().snapshot().await.unwrap();
    h.set_current(Some(reading(4.0)));

    let (foreground, pull) = tokio::join!(
        h.orchestrator.execute_refresh(RefreshReason::AppForeground),
        h.orchestrator.refresh_manual(),
    );

    assert_eq!(foreground.reason, RefreshReason::AppForeground);
    assert!(!foreground.coalesced);
    assert!(!foreground.refreshed.advisor);

    assert_eq!(pull.reason, RefreshReason::UserPull);
    assert_eq!(pull.refresh_id, foreground.refresh_id);
    assert!(pull.coalesced);
    assert!(pull.success, "unexpected error: {:?}", pull.error);
    assert!(pull.refreshed.health && pull.refreshed.score && pull.refreshed.advisor);

    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 1);
    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 1);
    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert!(snapshot.last_advisor_refresh > seeded.last_advisor_refresh);
}

#[tokio::test]
async fn dropped_refresh_reopens_the_gate() {
    let h = harness(RecordingFeeds::slow(Duration::from_millis(200))).await;
    h.set_current(Some(reading(5.0)));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        h.orchestrator.execute_refresh(RefreshReason::Manual),
    )
    .await;
    assert!(abandoned.is_err());

    let cadence = h.orchestrator.cadence().state().await;
    assert!(!cadence.is_refreshing);
    assert!(cadence.last_refresh_timestamp.is_none());

    let result = h.orchestrator.refresh_on_foreground().await.unwrap();
    assert!(result.success);
    assert!(!result.coalesced);
}

#[tokio::test]
async fn cancelled_refresh_reports_error() {
    let h = harness(RecordingFeeds::slow(Duration::from_millis(500))).await;
    h.set_current(Some(reading(5.0)));

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = h
        .orchestrator
        .execute_refresh_with_cancel(RefreshReason::UserPull, &token)
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("refresh cancelled"));
    assert!(!result.refreshed.health);
    assert!(!h.orchestrator.cadence().state().await.is_refreshing);
    assert!(h.orchestrator.snapshots().snapshot().await.is_none());
}

#[tokio::test]
async fn force_refresh_advisor_touches_only_advisory() {
    let h = harness(RecordingFeeds::default()).await;
    seed_baseline(&h).await;
    let seeded = h.orchestrator.snapshots().snapshot().await.unwrap();

    h.orchestrator.force_refresh_advisor().await.unwrap();

    assert_eq!(h.feeds.count(FeedKind::AdvisorData), 1);
    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 0);
    assert_eq!(h.feeds.count(FeedKind::ScorePersonalized), 0);
    assert!(h
        .orchestrator
        .cadence()
        .state()
        .await
        .last_refresh_timestamp
        .is_none());

    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert!(snapshot.last_advisor_refresh > seeded.last_advisor_refresh);
    assert_eq!(snapshot.environment, seeded.environment);
}

#[tokio::test]
async fn force_refresh_advisor_surfaces_errors() {
    let h = harness(RecordingFeeds::failing(FeedKind::AdvisorData)).await;
    let err = h.orchestrator.force_refresh_advisor().await.unwrap_err();
    assert!(format!("{err:#}").contains("ADVISOR.DATA unavailable"));
}

#[tokio::test]
async fn subscribers_see_finished_cycles() {
    let h = harness(RecordingFeeds::default()).await;
    h.set_current(Some(reading(5.0)));
    let mut events = h.orchestrator.subscribe();

    let result = h.orchestrator.refresh_manual().await;
    let seen = events.recv().await.unwrap();
    assert_eq!(seen.refresh_id, result.refresh_id);
}

#[tokio::test]
async fn scheduler_runs_timer_refresh_when_due() {
    let h = harness(RecordingFeeds::default()).await;
    h.set_current(Some(reading(5.0)));
    let mut events = h.orchestrator.subscribe();

    let mut scheduler = RefreshScheduler::new(h.orchestrator.clone(), Duration::from_millis(20));
    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert!(scheduler.start().is_err());

    let result = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timer refresh did not run")
        .unwrap();
    assert_eq!(result.reason, RefreshReason::Timer);
    assert!(result.success);

    // Not due again for fifteen minutes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.feeds.count(FeedKind::HealthCurrent), 1);

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn state_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("breathwise.sqlite3");

    {
        let storage = Arc::new(SqliteStore::open(path.clone()).unwrap());
        let h = harness_with(storage, RecordingFeeds::default()).await;
        h.set_current(Some(reading(6.0)));
        assert!(h.orchestrator.refresh_manual().await.success);
    }

    let storage = Arc::new(SqliteStore::open(path).unwrap());
    let h = harness_with(storage, RecordingFeeds::default()).await;

    let snapshot = h.orchestrator.snapshots().snapshot().await.unwrap();
    assert_eq!(snapshot.environment.score, 6.0);
    assert!(h
        .orchestrator
        .cadence()
        .state()
        .await
        .last_refresh_timestamp
        .is_some());
    assert!(h.orchestrator.refresh_on_foreground().await.is_none());
}
