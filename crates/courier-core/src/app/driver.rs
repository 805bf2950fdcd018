//! RetryDriver - outbox の掃き出し
//!
//! One sweep: claim every eligible item, resolve its artifact, deliver it,
//! record the outcome. Per-item failures are recorded on the item and never
//! abort the sweep.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};
use ulid::Ulid;

use super::channel::DeliveryChannel;
use super::policy::DriverPolicy;
use super::resolver::ArtifactResolver;
use super::scheduler::SweepJob;
use crate::domain::{ArtifactRef, DeliveryError, OutboxItem, OutboxKey};
use crate::ports::{ChannelSettings, SettingsProvider};
use crate::store::OutboxStore;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items that passed the eligibility check.
    pub eligible: usize,
    /// Eligible items this sweep managed to claim.
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Eligible items another sweep claimed first.
    pub skipped: usize,
    /// Stale Sending claims moved back to Failed.
    pub reclaimed: usize,
    /// Sent items removed by retention.
    pub pruned: usize,
    /// Store operations that failed; the affected items are retried next sweep.
    pub store_errors: usize,
    /// The channel had no credentials; nothing was attempted.
    pub unconfigured: bool,
}

impl SweepReport {
    /// Something is left that a later sweep could fix.
    pub fn needs_retry(&self) -> bool {
        self.failed > 0 || self.store_errors > 0
    }
}

/// Drains one outbox through one channel.
///
/// Design:
/// - Claim, then resolve, then send: `claim` is the only guard against a
///   second concurrent sweep delivering the same item, and the item it
///   returns (not the sweep's earlier snapshot) is what gets delivered.
/// - The store lock is never held across resolve or send.
/// - A crash between a successful send and `mark_sent` leaves a stale
///   Sending claim that is later reclaimed and re-sent (at-least-once).
pub struct RetryDriver<R: ArtifactRef, C> {
    store: Arc<dyn OutboxStore<R>>,
    channel: C,
    resolver: ArtifactResolver,
    settings: Arc<dyn SettingsProvider>,
    policy: DriverPolicy,
}

impl<R: ArtifactRef, C: DeliveryChannel> RetryDriver<R, C> {
    pub fn new(
        store: Arc<dyn OutboxStore<R>>,
        channel: C,
        resolver: ArtifactResolver,
        settings: Arc<dyn SettingsProvider>,
        policy: DriverPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            resolver,
            settings,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore<R>> {
        &self.store
    }

    pub fn policy(&self) -> &DriverPolicy {
        &self.policy
    }

    /// Run one sweep.
    pub async fn sweep(&self) -> SweepReport {
        let span = info_span!("sweep", channel = self.channel.name(), sweep_id = %Ulid::new());
        self.sweep_inner().instrument(span).await
    }

    async fn sweep_inner(&self) -> SweepReport {
        let mut report = SweepReport::default();

        // 設定は毎回読み直す
        let settings = self.settings.settings();
        if !self.channel.is_configured(&settings) {
            debug!("channel not configured; nothing to do");
            report.unconfigured = true;
            return report;
        }

        match self.store.reclaim_stale(self.policy.claim_timeout).await {
            Ok(reclaimed) => report.reclaimed = reclaimed,
            Err(err) => {
                warn!(error = %err, "stale claim recovery failed");
                report.store_errors += 1;
            }
        }

        let items = match self.store.get_all().await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "failed to load outbox");
                report.store_errors += 1;
                return report;
            }
        };

        for item in items {
            if !self.policy.is_eligible(&item) {
                continue;
            }
            report.eligible += 1;
            self.process(&item.key, &settings, &mut report).await;
        }

        if let Some(retention) = self.policy.retain_sent {
            match self.store.prune_sent(retention).await {
                Ok(pruned) => report.pruned = pruned,
                Err(err) => {
                    warn!(error = %err, "pruning delivered items failed");
                    report.store_errors += 1;
                }
            }
        }

        info!(
            eligible = report.eligible,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            reclaimed = report.reclaimed,
            store_errors = report.store_errors,
            "sweep finished",
        );
        report
    }

    async fn process(&self, key: &OutboxKey, settings: &ChannelSettings, report: &mut SweepReport) {
        // 送るのは claim 時点の内容 (直前に再投入されていればその artifact)
        let item = match self.store.claim(key).await {
            Ok(Some(item)) => {
                report.claimed += 1;
                item
            }
            Ok(None) => {
                debug!(key = %key, "already claimed elsewhere; skipping");
                report.skipped += 1;
                return;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "claim failed");
                report.store_errors += 1;
                return;
            }
        };

        match self.attempt(&item, settings).await {
            Ok(()) => match self.store.mark_sent(key).await {
                Ok(true) => {
                    info!(key = %key, attempts = item.attempts, "delivered");
                    report.sent += 1;
                }
                Ok(false) => {
                    warn!(key = %key, "delivered, but the claim was no longer held");
                    report.sent += 1;
                }
                Err(err) => {
                    // 送信済みだが記録できなかった: 次回 reclaim 後に再送される
                    warn!(key = %key, error = %err, "delivered but could not record it");
                    report.store_errors += 1;
                }
            },
            Err(failure) => {
                warn!(
                    key = %key,
                    attempts = item.attempts + 1,
                    kind = %failure.kind,
                    error = %failure.message,
                    "delivery failed",
                );
                report.failed += 1;
                if let Err(err) = self.store.mark_failed(key, &failure).await {
                    warn!(key = %key, error = %err, "could not record delivery failure");
                    report.store_errors += 1;
                }
            }
        }
    }

    async fn attempt(&self, item: &OutboxItem<R>, settings: &ChannelSettings) -> Result<(), DeliveryError> {
        let path = self
            .resolver
            .resolve(&item.key, &item.artifact, self.policy.reconstruct)
            .await?;
        self.channel.deliver(settings, &path).await
    }
}

#[async_trait]
impl<R: ArtifactRef, C: DeliveryChannel> SweepJob for RetryDriver<R, C> {
    async fn run(&self) -> SweepReport {
        self.sweep().await
    }
}
