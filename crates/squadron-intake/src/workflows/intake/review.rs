use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use super::announcements::AnnouncementPool;
use super::catalog::QuestionCatalog;
use super::directory::{leadership_for, GroupDirectory, GroupDirectoryEntry, Leadership, LeadershipMarkers};
use super::domain::{ApplicationRecord, ApplicationStatus, ChannelId, GuildId, RoleId, UserId};
use super::eligibility;
use super::platform::{
    ButtonStyle, Component, Embed, OutboundMessage, Platform, PlatformError, SelectOption,
};
use super::repository::{ApplicationRepository, RepositoryError};

pub const APPLICATION_SELECT_ID: &str = "application_select";
pub const CANCEL_ID: &str = "cancel";

const ACCEPTED_COLOR: u32 = 0x00ff00;
const DENIED_COLOR: u32 = 0xff0000;

/// Guild wiring the review workflow needs for its side effects.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub guild_id: GuildId,
    pub review_channel: ChannelId,
    pub announcement_channel: ChannelId,
    pub general_role: RoleId,
    pub recruit_role: RoleId,
    /// `{callsign}` is replaced with the applicant's requested callsign.
    pub nickname_template: String,
    pub organization_name: String,
    pub leadership_markers: LeadershipMarkers,
}

/// The reviewer acting on an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer {
    pub id: UserId,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("no application found for applicant {0}")]
    NotFound(UserId),
    #[error("application for applicant {applicant} is {status}, not pending review")]
    NotPending {
        applicant: UserId,
        status: ApplicationStatus,
    },
    #[error("a decision on the application from applicant {0} is already in progress")]
    DecisionInProgress(UserId),
    #[error("Squadron role not found for the selected squadron '{0}'.")]
    UnknownGroup(String),
    #[error("unable to update the applicant's membership: {0}")]
    MemberUpdate(PlatformError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub record: ApplicationRecord,
    pub group: GroupDirectoryEntry,
    pub nickname: String,
    pub leadership: Leadership,
    pub announcement: String,
    /// Side effects that failed after the status change; already reported to reviewers.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DenyOutcome {
    pub record: ApplicationRecord,
    pub failures: Vec<String>,
}

/// Reviewer-facing decisions on pending applications.
///
/// Accept runs in a fixed order: nickname, roles, status, applicant DM, reviewer
/// confirmation, announcement. A failed membership update leaves the record pending so the
/// decision can be retried; nothing after the status change can revert it. Only one
/// decision per applicant runs at a time; a second one is refused until the first settles.
pub struct ReviewWorkflow<R, P> {
    catalog: Arc<QuestionCatalog>,
    directory: Arc<GroupDirectory>,
    repository: Arc<R>,
    platform: Arc<P>,
    announcements: Arc<AnnouncementPool>,
    settings: ReviewSettings,
    deciding: Mutex<HashSet<UserId>>,
}

/// Claim on one applicant's decision, released on drop.
struct DecisionClaim<'a> {
    deciding: &'a Mutex<HashSet<UserId>>,
    applicant: UserId,
}

impl Drop for DecisionClaim<'_> {
    fn drop(&mut self) {
        self.deciding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.applicant);
    }
}

impl<R, P> ReviewWorkflow<R, P>
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    pub fn new(
        catalog: Arc<QuestionCatalog>,
        directory: Arc<GroupDirectory>,
        repository: Arc<R>,
        platform: Arc<P>,
        announcements: Arc<AnnouncementPool>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            catalog,
            directory,
            repository,
            platform,
            announcements,
            settings,
            deciding: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    pub fn list_pending(&self) -> Result<Vec<ApplicationRecord>, ReviewError> {
        Ok(self
            .repository
            .list_by_status(ApplicationStatus::PendingReview)?)
    }

    /// Select menu over the pending applications, keyed by applicant id.
    pub fn pending_menu(records: &[ApplicationRecord]) -> Option<OutboundMessage> {
        if records.is_empty() {
            return None;
        }

        let options = records
            .iter()
            .map(|record| SelectOption {
                label: record.applicant_username.clone(),
                value: record.applicant_id.to_string(),
            })
            .collect();

        Some(
            OutboundMessage::text("Select an application to handle:").with_component(
                Component::Select {
                    custom_id: APPLICATION_SELECT_ID.to_string(),
                    placeholder: "Select an application to handle".to_string(),
                    options,
                },
            ),
        )
    }

    /// Full review card for one application, with decision buttons while it is pending.
    pub fn open_record(&self, applicant: UserId) -> Result<OutboundMessage, ReviewError> {
        let record = self
            .repository
            .fetch(applicant)?
            .ok_or(ReviewError::NotFound(applicant))?;

        let mut embed = Embed::new(
            format!("Application for {}", self.settings.organization_name),
            format!("Username: {}", record.applicant_username),
            ACCEPTED_COLOR,
        );
        for entry in &record.answers {
            let value = if entry.answer.is_empty() {
                "N/A"
            } else {
                entry.answer.as_str()
            };
            embed = embed.field(entry.question.clone(), value);
        }
        let hint = eligibility::screen(&self.catalog, &record);
        embed = embed
            .field("Discord Username", record.platform_username.clone())
            .field("User ID", record.applicant_id.to_string())
            .field("Username", record.applicant_username.clone())
            .field("Status", record.status.label())
            .field("Timestamp", record.submitted_at_label())
            .field(
                "Duration",
                format!("{} seconds", record.fill_duration_seconds),
            )
            .field("Eligibility", hint.summary());

        let mut message = OutboundMessage::default().with_embed(embed);
        if record.status == ApplicationStatus::PendingReview {
            message = message
                .with_component(Component::button(
                    format!("accept_{applicant}"),
                    "Accept",
                    ButtonStyle::Success,
                ))
                .with_component(Component::button(
                    format!("deny_{applicant}"),
                    "Deny",
                    ButtonStyle::Danger,
                ));
        }
        Ok(message.with_component(Component::button(CANCEL_ID, "Cancel", ButtonStyle::Secondary)))
    }

    pub async fn accept(
        &self,
        applicant: UserId,
        reviewer: &Reviewer,
    ) -> Result<AcceptOutcome, ReviewError> {
        let _claim = self.claim_decision(applicant)?;
        let record = self.pending_record(applicant)?;

        let group_name = record
            .answer(&self.catalog.group_question().text)
            .unwrap_or_default()
            .to_string();
        let group = self
            .directory
            .resolve_name(&group_name)
            .cloned()
            .ok_or(ReviewError::UnknownGroup(group_name))?;

        let callsign = self
            .catalog
            .callsign_question()
            .and_then(|question| record.answer(&question.text))
            .map(str::trim)
            .filter(|callsign| !callsign.is_empty())
            .unwrap_or(record.platform_username.as_str());
        let nickname = self.settings.nickname_template.replace("{callsign}", callsign);

        let guild = self.settings.guild_id;
        self.platform
            .set_member_nickname(guild, applicant, &nickname)
            .await
            .map_err(ReviewError::MemberUpdate)?;
        self.platform
            .grant_member_roles(
                guild,
                applicant,
                &[
                    self.settings.general_role,
                    self.settings.recruit_role,
                    group.role_id,
                ],
            )
            .await
            .map_err(ReviewError::MemberUpdate)?;

        let record = self
            .repository
            .update_status(applicant, ApplicationStatus::Accepted)?;
        info!(applicant_id = %applicant, group = %group.display_name, reviewer = %reviewer.display_name, "application accepted");

        let mut failures = Vec::new();
        let notified = self
            .notify_applicant(&record, self.acceptance_message(&record), &mut failures)
            .await;

        let confirmation = Embed::new(
            "Application Accepted",
            format!(
                "Application from {} was accepted by {} at {}. {}",
                record.applicant_username,
                reviewer.display_name,
                decision_timestamp(),
                notified_note(notified),
            ),
            ACCEPTED_COLOR,
        );
        self.post(
            self.settings.review_channel,
            OutboundMessage::default().with_embed(confirmation),
            "reviewer confirmation",
            &mut failures,
        )
        .await;

        let leadership = match self.platform.fetch_guild_members(guild).await {
            Ok(members) => leadership_for(group.role_id, &members, &self.settings.leadership_markers),
            Err(err) => {
                warn!(error = %err, "member roster unavailable, announcing without leadership");
                Leadership::default()
            }
        };
        let announcement = format!(
            "{} Please welcome {} into the ranks of {} under the Command of {} and {}!\n\n{}",
            self.settings.general_role.mention(),
            applicant.mention(),
            group.role_id.mention(),
            leadership.co_mention(),
            leadership.xo_mention(),
            self.announcements.choose(),
        );
        self.post(
            self.settings.announcement_channel,
            OutboundMessage::text(announcement.clone()),
            "public announcement",
            &mut failures,
        )
        .await;

        self.report_failures(&failures).await;

        Ok(AcceptOutcome {
            record,
            group,
            nickname,
            leadership,
            announcement,
            failures,
        })
    }

    pub async fn deny(
        &self,
        applicant: UserId,
        reviewer: &Reviewer,
    ) -> Result<DenyOutcome, ReviewError> {
        let _claim = self.claim_decision(applicant)?;
        self.pending_record(applicant)?;
        let record = self
            .repository
            .update_status(applicant, ApplicationStatus::Denied)?;
        info!(applicant_id = %applicant, reviewer = %reviewer.display_name, "application denied");

        let mut failures = Vec::new();
        let notified = self
            .notify_applicant(&record, self.denial_message(&record), &mut failures)
            .await;

        let confirmation = Embed::new(
            "Application Denied",
            format!(
                "Application from {} was denied by {} at {}. {}",
                record.applicant_username,
                reviewer.display_name,
                decision_timestamp(),
                notified_note(notified),
            ),
            DENIED_COLOR,
        );
        self.post(
            self.settings.review_channel,
            OutboundMessage::default().with_embed(confirmation),
            "reviewer confirmation",
            &mut failures,
        )
        .await;

        self.report_failures(&failures).await;

        Ok(DenyOutcome { record, failures })
    }

    pub fn cancel(&self) -> OutboundMessage {
        OutboundMessage::text("Operation canceled.")
    }

    fn claim_decision(&self, applicant: UserId) -> Result<DecisionClaim<'_>, ReviewError> {
        let mut deciding = self
            .deciding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !deciding.insert(applicant) {
            warn!(applicant_id = %applicant, "decision refused, another one is in flight");
            return Err(ReviewError::DecisionInProgress(applicant));
        }
        Ok(DecisionClaim {
            deciding: &self.deciding,
            applicant,
        })
    }

    fn pending_record(&self, applicant: UserId) -> Result<ApplicationRecord, ReviewError> {
        let record = self
            .repository
            .fetch(applicant)?
            .ok_or(ReviewError::NotFound(applicant))?;
        if record.status != ApplicationStatus::PendingReview {
            return Err(ReviewError::NotPending {
                applicant,
                status: record.status,
            });
        }
        Ok(record)
    }

    fn acceptance_message(&self, record: &ApplicationRecord) -> OutboundMessage {
        let org = &self.settings.organization_name;
        OutboundMessage::text(format!(
            "Hello {},\n\n\
             Congratulations! Your application to join {org} has been accepted. \
             Please check the server for further instructions and reach out to a member of \
             {org} leadership if you have any questions.\n\n\
             Best regards,\n\
             {org} Leadership",
            record.applicant_username
        ))
    }

    fn denial_message(&self, record: &ApplicationRecord) -> OutboundMessage {
        let org = &self.settings.organization_name;
        OutboundMessage::text(format!(
            "Hello {},\n\n\
             Thank you for your application to join {org}. After careful consideration, we \
             regret to inform you that your application has been denied. If you believe this \
             decision was made in error, please reach out to a member of {org} leadership for \
             further discussion.\n\n\
             Best regards,\n\
             {org} Leadership",
            record.applicant_username
        ))
    }

    async fn notify_applicant(
        &self,
        record: &ApplicationRecord,
        message: OutboundMessage,
        failures: &mut Vec<String>,
    ) -> bool {
        match self
            .platform
            .send_direct_message(record.applicant_id, message)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(applicant_id = %record.applicant_id, error = %err, "decision DM not delivered");
                failures.push(format!(
                    "Failed to send DM to {}: {err}",
                    record.applicant_username
                ));
                false
            }
        }
    }

    async fn post(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
        what: &str,
        failures: &mut Vec<String>,
    ) {
        if let Err(err) = self.platform.send_channel_message(channel, message).await {
            warn!(channel = %channel, error = %err, "{what} not delivered");
            failures.push(format!("Failed to post {what}: {err}"));
        }
    }

    async fn report_failures(&self, failures: &[String]) {
        for failure in failures {
            if let Err(err) = self
                .platform
                .send_channel_message(self.settings.review_channel, OutboundMessage::text(failure.clone()))
                .await
            {
                warn!(error = %err, failure = %failure, "unable to report side-effect failure to reviewers");
            }
        }
    }
}

fn decision_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn notified_note(notified: bool) -> &'static str {
    if notified {
        "A message notifying the user has been sent."
    } else {
        "The user could not be notified."
    }
}
