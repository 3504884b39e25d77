use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    cadence::CadenceTracker,
    config::RefreshConfig,
    detection::ChangeDetector,
    models::{Coordinates, EnvironmentUpdate, RefreshReason, RefreshResult},
    snapshot::SnapshotStore,
    storage::KeyValueStore,
};

use super::{
    feeds::{CurrentDataAccessor, FeedClient, FeedKey, FeedKind, LocationProvider},
    inflight::{InFlight, Slot},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 16;
const CANCELLED: &str = "refresh cancelled";

/// Sequences the three feeds under one cost-aware policy.
///
/// Environment and score are refetched on every cycle. The advisory is only
/// regenerated when the change detector says so, or when the user pulled to
/// refresh.
pub struct RefreshOrchestrator {
    feeds: Arc<dyn FeedClient>,
    location: Arc<dyn LocationProvider>,
    current_data: CurrentDataAccessor,
    snapshots: Arc<SnapshotStore>,
    cadence: Arc<CadenceTracker>,
    detector: ChangeDetector,
    settle_delay: Duration,
    in_flight: InFlight,
    events: broadcast::Sender<RefreshResult>,
}

impl RefreshOrchestrator {
    pub fn new(
        feeds: Arc<dyn FeedClient>,
        location: Arc<dyn LocationProvider>,
        current_data: CurrentDataAccessor,
        snapshots: Arc<SnapshotStore>,
        cadence: Arc<CadenceTracker>,
        config: &RefreshConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            feeds,
            location,
            current_data,
            snapshots,
            cadence,
            detector: ChangeDetector::new(config.detection.clone()),
            settle_delay: config.settle_delay,
            in_flight: InFlight::new(),
            events,
        }
    }

    /// Hydrate both stores from `storage` and wire everything together.
    pub async fn load(
        storage: Arc<dyn KeyValueStore>,
        config: &RefreshConfig,
        feeds: Arc<dyn FeedClient>,
        location: Arc<dyn LocationProvider>,
        current_data: CurrentDataAccessor,
    ) -> Result<Self> {
        let snapshots = SnapshotStore::load(storage.clone())
            .await
            .context("failed to load data snapshot")?;
        let cadence = CadenceTracker::load(storage, config.cadence.clone())
            .await
            .context("failed to load refresh cadence")?;

        Ok(Self::new(
            feeds,
            location,
            current_data,
            Arc::new(snapshots),
            Arc::new(cadence),
            config,
        ))
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn cadence(&self) -> &Arc<CadenceTracker> {
        &self.cadence
    }

    /// Every finished cycle, including coalesced and failed ones, is broadcast here.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshResult> {
        self.events.subscribe()
    }

    /// Routine refresh on app foreground. `None` means "not due yet", not an error.
    pub async fn refresh_on_foreground(&self) -> Option<RefreshResult> {
        if !self.cadence.should_refresh().await {
            log_debug!("foreground refresh skipped, not due");
            return None;
        }
        Some(self.execute_refresh(RefreshReason::AppForeground).await)
    }

    /// Pull-to-refresh; bypasses the cadence gate.
    pub async fn refresh_manual(&self) -> RefreshResult {
        self.execute_refresh(RefreshReason::UserPull).await
    }

    pub async fn execute_refresh(&self, reason: RefreshReason) -> RefreshResult {
        self.execute_refresh_with_cancel(reason, &CancellationToken::new())
            .await
    }

    /// Run one cycle, or join the cycle already running for this location.
    ///
    /// Cancelling `cancel` stops at the next suspension point; whatever was
    /// refreshed before that stays marked in the result.
    pub async fn execute_refresh_with_cancel(
        &self,
        reason: RefreshReason,
        cancel: &CancellationToken,
    ) -> RefreshResult {
        let location = self.location.location_or_default();
        let coordinates = location.coordinates;

        loop {
            match self.in_flight.claim(coordinates.key()) {
                Slot::Leader(guard) => {
                    let result = self.run_cycle(reason, coordinates, cancel).await;
                    guard.complete(&result);
                    let _ = self.events.send(result.clone());
                    return result;
                }
                Slot::Follower(mut receiver) => {
                    let handed_over = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            let mut result = RefreshResult::begin(reason, Utc::now());
                            result.error = Some(CANCELLED.to_string());
                            return result;
                        }
                        value = wait_for_leader(&mut receiver) => value,
                    };

                    match handed_over {
                        Some(mut result) => {
                            log_debug!(
                                "{} refresh joined in-flight cycle {}",
                                reason.as_str(),
                                result.refresh_id
                            );
                            result.coalesced = true;
                            result.reason = reason;
                            if reason.is_user_initiated()
                                && result.success
                                && !result.refreshed.advisor
                            {
                                self.follow_up_advisor(&mut result, coordinates, cancel)
                                    .await;
                            }
                            let _ = self.events.send(result.clone());
                            return result;
                        }
                        None => {
                            log_warn!("in-flight refresh abandoned; starting a new cycle");
                        }
                    }
                }
            }
        }
    }

    /// Regenerate only the advisory; no cadence bookkeeping, no detection.
    pub async fn force_refresh_advisor(&self) -> Result<()> {
        let coordinates = self.location.location_or_default().coordinates;
        self.refresh_advisor(coordinates).await?;
        log_info!("advisory force-refreshed");
        Ok(())
    }

    /// A pull that joined a routine cycle still owes the user a fresh advisory.
    async fn follow_up_advisor(
        &self,
        result: &mut RefreshResult,
        coordinates: Coordinates,
        cancel: &CancellationToken,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow!(CANCELLED)),
            outcome = self.refresh_advisor(coordinates) => outcome,
        };

        match outcome {
            Ok(()) => result.refreshed.advisor = true,
            Err(err) => {
                let message = format!("{err:#}");
                log_error!("advisory follow-up for {} failed: {message}", result.refresh_id);
                self.cadence.set_refresh_error(Some(message.clone())).await;
                result.success = false;
                result.error = Some(message);
            }
        }
    }

    async fn refresh_advisor(&self, coordinates: Coordinates) -> Result<()> {
        self.refetch(FeedKind::AdvisorData, coordinates).await?;
        self.snapshots.mark_advisor_refreshed().await
    }

    async fn run_cycle(
        &self,
        reason: RefreshReason,
        coordinates: Coordinates,
        cancel: &CancellationToken,
    ) -> RefreshResult {
        let mut result = RefreshResult::begin(reason, Utc::now());
        log_info!(
            "refresh {} started ({})",
            result.refresh_id,
            reason.as_str()
        );
        let _refreshing = self.cadence.begin_refresh();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow!(CANCELLED)),
            outcome = self.refresh_feeds(reason, coordinates, &mut result) => outcome,
        };

        match outcome {
            Ok(()) => {
                result.success = true;
                log_info!(
                    "refresh {} finished: health={} score={} advisor={}",
                    result.refresh_id,
                    result.refreshed.health,
                    result.refreshed.score,
                    result.refreshed.advisor
                );
            }
            Err(err) => {
                let message = format!("{err:#}");
                log_error!("refresh {} failed: {message}", result.refresh_id);
                self.cadence.set_refresh_error(Some(message.clone())).await;
                result.error = Some(message);
            }
        }

        result
    }

    async fn refresh_feeds(
        &self,
        reason: RefreshReason,
        coordinates: Coordinates,
        result: &mut RefreshResult,
    ) -> Result<()> {
        let (health, score) = tokio::join!(
            self.refetch(FeedKind::HealthCurrent, coordinates),
            self.refetch(FeedKind::ScorePersonalized, coordinates),
        );
        result.refreshed.health = health.is_ok();
        result.refreshed.score = score.is_ok();
        health?;
        score?;
        self.cadence.set_last_refresh().await?;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let user_requested = reason.is_user_initiated();

        let Some(current) = (self.current_data)() else {
            if user_requested {
                log_info!("no current data; refreshing advisory on explicit request");
                self.refetch(FeedKind::AdvisorData, coordinates).await?;
                result.refreshed.advisor = true;
                self.snapshots.mark_advisor_refreshed().await?;
            } else {
                log_debug!("no current data; advisory left as is");
            }
            return Ok(());
        };

        let stored = self.snapshots.snapshot().await;
        let detection = self.detector.detect(
            &current,
            stored.as_ref().map(|s| &s.environment),
            stored.as_ref().and_then(|s| s.last_advisor_refresh_at()),
            user_requested,
            Utc::now(),
        );
        log_debug!(
            "change detection: type={} reason={:?} advisor={}",
            detection.change_type.as_str(),
            detection.change_reason.map(|r| r.as_str()),
            detection.should_refresh_advisor
        );

        let refresh_advisor = detection.should_refresh_advisor;
        result.change_detection = Some(detection);

        if refresh_advisor {
            self.refetch(FeedKind::AdvisorData, coordinates).await?;
            result.refreshed.advisor = true;
            self.snapshots.mark_advisor_refreshed().await?;
        }

        self.snapshots
            .capture_snapshot(&EnvironmentUpdate::from(&current))
            .await?;
        Ok(())
    }

    async fn refetch(&self, kind: FeedKind, coordinates: Coordinates) -> Result<()> {
        let key = FeedKey::new(kind, coordinates);
        self.feeds
            .invalidate_and_refetch(&key)
            .await
            .with_context(|| format!("failed to refresh {key}"))
    }
}

/// `None` when the leader went away without publishing a result.
async fn wait_for_leader(
    receiver: &mut watch::Receiver<Option<RefreshResult>>,
) -> Option<RefreshResult> {
    match receiver.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    }
}
