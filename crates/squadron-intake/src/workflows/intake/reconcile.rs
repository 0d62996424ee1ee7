use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::domain::{ApplicationRecord, ApplicationStatus, ChannelId, RoleId};
use super::platform::{OutboundMessage, Platform};
use super::repository::{ApplicationRepository, RepositoryError};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub announced: usize,
    /// Records whose notification or status update failed; they stay unannounced for the
    /// next tick.
    pub deferred: usize,
}

/// Periodically announces freshly submitted applications to reviewers.
///
/// A record only becomes `pending-review` after its notification was sent, so a failed send
/// is retried on the next tick and a delivered one is never repeated.
pub struct ReconciliationLoop<R, P> {
    repository: Arc<R>,
    platform: Arc<P>,
    review_channel: ChannelId,
    reviewer_role: RoleId,
    interval: Duration,
}

impl<R, P> ReconciliationLoop<R, P>
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    pub fn new(
        repository: Arc<R>,
        platform: Arc<P>,
        review_channel: ChannelId,
        reviewer_role: RoleId,
    ) -> Self {
        Self {
            repository,
            platform,
            review_channel,
            reviewer_role,
            interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the repeating task. The first pass runs one interval after start; the task
    /// lives until the runtime shuts down.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "reconciliation loop started");
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.tick().await {
                    Ok(summary) if summary.announced > 0 || summary.deferred > 0 => {
                        info!(
                            announced = summary.announced,
                            deferred = summary.deferred,
                            "reconciliation pass finished"
                        );
                    }
                    Ok(_) => debug!("reconciliation pass found nothing to announce"),
                    Err(err) => warn!(error = %err, "reconciliation pass could not read the store"),
                }
            }
        })
    }

    /// One pass: notify reviewers about every unannounced record, then flag it pending review.
    pub async fn tick(&self) -> Result<ReconcileSummary, RepositoryError> {
        let unannounced = self
            .repository
            .list_by_status(ApplicationStatus::SubmittedUnannounced)?;
        let mut summary = ReconcileSummary::default();

        for record in unannounced {
            let applicant = record.applicant_id;
            if let Err(err) = self
                .platform
                .send_channel_message(self.review_channel, self.notification(&record))
                .await
            {
                warn!(applicant_id = %applicant, error = %err, "reviewer notification failed, retrying next tick");
                summary.deferred += 1;
                continue;
            }

            match self
                .repository
                .update_status(applicant, ApplicationStatus::PendingReview)
            {
                Ok(_) => {
                    info!(applicant_id = %applicant, "application announced to reviewers");
                    summary.announced += 1;
                }
                Err(err) => {
                    warn!(applicant_id = %applicant, error = %err, "announced application could not be flagged");
                    summary.deferred += 1;
                }
            }
        }

        Ok(summary)
    }

    pub fn notification(&self, record: &ApplicationRecord) -> OutboundMessage {
        OutboundMessage::text(format!(
            "{} New application detected!\n\
             Username: {}\n\
             Application Time: {}\n\
             To handle this application, use the `/handle` command.",
            self.reviewer_role.mention(),
            record.applicant_username,
            record.submitted_at_label(),
        ))
    }
}
