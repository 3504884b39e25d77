use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::models::RefreshReason;

use super::RefreshOrchestrator;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Background timer trigger. Each tick asks the cadence gate and runs a
/// `timer` refresh when one is due.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("refresh scheduler already running");
        }
        if self.interval.is_zero() {
            bail!("refresh scheduler interval must be greater than zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(scheduler_loop(
            self.orchestrator.clone(),
            self.interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("refresh scheduler started, every {}ms", self.interval.as_millis());
        Ok(())
    }

    /// Stops the loop; a refresh in progress is cancelled, not awaited to completion.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("refresh scheduler task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn scheduler_loop(
    orchestrator: Arc<RefreshOrchestrator>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !orchestrator.cadence().should_refresh().await {
                    continue;
                }
                let result = orchestrator
                    .execute_refresh_with_cancel(RefreshReason::Timer, &cancel_token)
                    .await;
                if let Some(error) = &result.error {
                    log_warn!("timer refresh {} failed: {error}", result.refresh_id);
                } else {
                    log_debug!("timer refresh {} done", result.refresh_id);
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("refresh scheduler shutting down");
                break;
            }
        }
    }
}
