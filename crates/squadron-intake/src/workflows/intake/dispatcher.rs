use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assets::IntakeAssets;
use super::directory::GroupDirectory;
use super::domain::{ChannelId, GuildId, RoleId, UserId};
use super::engine::{
    AdvanceOutcome, ConversationEngine, EngineError, StartOutcome, GROUP_SELECT_ID,
    NEXT_BUTTON_ID,
};
use super::platform::{InteractionToken, OutboundMessage, Platform, PlatformError};
use super::reconcile::ReconciliationLoop;
use super::repository::ApplicationRepository;
use super::review::{
    ReviewError, ReviewSettings, ReviewWorkflow, Reviewer, APPLICATION_SELECT_ID, CANCEL_ID,
};
use crate::workflows::roster::Roster;

pub const PERMISSION_DENIED_NOTICE: &str =
    "You do not have the required permissions to use this command.";
const NO_PENDING_NOTICE: &str = "There are no pending applications.";
const DM_UNAVAILABLE_NOTICE: &str =
    "I couldn't send you a direct message. Please allow direct messages from server members and try again.";
const REVIEW_FAILED_NOTICE: &str =
    "An error occurred while processing this application. The review team has been notified.";

/// Inbound platform events, as delivered by the gateway relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    Ready,
    MessageCreate {
        author_id: UserId,
        channel_id: ChannelId,
        content: String,
    },
    ComponentInteraction {
        custom_id: String,
        user_id: UserId,
        #[serde(default)]
        values: Vec<String>,
        token: InteractionToken,
    },
    SlashCommand {
        name: String,
        invoker_id: UserId,
        #[serde(default)]
        invoker_username: String,
        token: InteractionToken,
    },
}

/// What a component's custom id asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    GroupSelect,
    OptionSelect(usize),
    Next,
    YesNo { index: usize, yes: bool },
    OpenApplication,
    Accept(UserId),
    Deny(UserId),
    Cancel,
    Unknown,
}

impl ComponentAction {
    pub fn parse(custom_id: &str) -> Self {
        match custom_id {
            GROUP_SELECT_ID => return Self::GroupSelect,
            NEXT_BUTTON_ID => return Self::Next,
            APPLICATION_SELECT_ID => return Self::OpenApplication,
            CANCEL_ID => return Self::Cancel,
            _ => {}
        }

        let Some((prefix, suffix)) = custom_id.split_once('_') else {
            return Self::Unknown;
        };
        let index = || suffix.parse::<usize>().ok();
        let applicant = || suffix.parse::<UserId>().ok();

        match prefix {
            "dropdown" => index().map(Self::OptionSelect),
            "yes" => index().map(|index| Self::YesNo { index, yes: true }),
            "no" => index().map(|index| Self::YesNo { index, yes: false }),
            "accept" => applicant().map(Self::Accept),
            "deny" => applicant().map(Self::Deny),
            _ => None,
        }
        .unwrap_or(Self::Unknown)
    }
}

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    ReconcilerStarted,
    ReconcilerAlreadyRunning,
    Session(StartOutcome),
    Answer(AdvanceOutcome),
    ReviewOpened(UserId),
    PendingListed(usize),
    Accepted(UserId),
    Denied(UserId),
    Canceled,
    RosterPosted(usize),
    /// The actor got an explanation instead of a state change.
    Rejected(String),
    Unauthorized,
    Ignored,
}

impl Dispatched {
    pub fn label(&self) -> &'static str {
        match self {
            Dispatched::ReconcilerStarted => "reconciler_started",
            Dispatched::ReconcilerAlreadyRunning => "reconciler_already_running",
            Dispatched::Session(_) => "session",
            Dispatched::Answer(_) => "answer",
            Dispatched::ReviewOpened(_) => "review_opened",
            Dispatched::PendingListed(_) => "pending_listed",
            Dispatched::Accepted(_) => "accepted",
            Dispatched::Denied(_) => "denied",
            Dispatched::Canceled => "canceled",
            Dispatched::RosterPosted(_) => "roster_posted",
            Dispatched::Rejected(_) => "rejected",
            Dispatched::Unauthorized => "unauthorized",
            Dispatched::Ignored => "ignored",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Runtime settings for [`IntakeBot`].
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub review: ReviewSettings,
    /// Role allowed to review applications and read the roster.
    pub admin_role: RoleId,
    pub intro_delay: Duration,
    pub reconcile_interval: Duration,
}

/// Routes platform events to the conversation engine, the review workflow and the
/// reconciliation loop.
pub struct IntakeBot<R, P> {
    engine: ConversationEngine<R, P>,
    review: ReviewWorkflow<R, P>,
    reconciler: Arc<ReconciliationLoop<R, P>>,
    directory: Arc<GroupDirectory>,
    repository: Arc<R>,
    platform: Arc<P>,
    guild_id: GuildId,
    admin_role: RoleId,
    reconciler_started: AtomicBool,
}

impl<R, P> IntakeBot<R, P>
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    pub fn new(assets: IntakeAssets, repository: Arc<R>, platform: Arc<P>, settings: BotSettings) -> Self {
        let BotSettings {
            review,
            admin_role,
            intro_delay,
            reconcile_interval,
        } = settings;
        let guild_id = review.guild_id;

        let engine = ConversationEngine::new(
            assets.catalog.clone(),
            assets.directory.clone(),
            repository.clone(),
            platform.clone(),
            guild_id,
        )
        .with_intro_delay(intro_delay);
        let reconciler = ReconciliationLoop::new(
            repository.clone(),
            platform.clone(),
            review.review_channel,
            admin_role,
        )
        .with_interval(reconcile_interval);
        let review = ReviewWorkflow::new(
            assets.catalog,
            assets.directory.clone(),
            repository.clone(),
            platform.clone(),
            assets.announcements,
            review,
        );

        Self {
            engine,
            review,
            reconciler: Arc::new(reconciler),
            directory: assets.directory,
            repository,
            platform,
            guild_id,
            admin_role,
            reconciler_started: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &ConversationEngine<R, P> {
        &self.engine
    }

    pub fn review(&self) -> &ReviewWorkflow<R, P> {
        &self.review
    }

    pub fn reconciler(&self) -> &ReconciliationLoop<R, P> {
        &self.reconciler
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciler_started.load(Ordering::Acquire)
    }

    /// Current roster, sorted by directory group.
    pub async fn roster(&self) -> Result<Roster, PlatformError> {
        let members = self.platform.fetch_guild_members(self.guild_id).await?;
        Ok(Roster::sort(&self.directory, &members))
    }

    pub async fn dispatch(&self, event: PlatformEvent) -> Result<Dispatched, DispatchError> {
        match event {
            PlatformEvent::Ready => Ok(self.on_ready()),
            PlatformEvent::MessageCreate {
                author_id,
                channel_id,
                content,
            } => Ok(Dispatched::Answer(
                self.engine
                    .receive_message(author_id, channel_id, content)
                    .await?,
            )),
            PlatformEvent::ComponentInteraction {
                custom_id,
                user_id,
                values,
                token,
            } => self.on_component(&custom_id, user_id, values, token).await,
            PlatformEvent::SlashCommand {
                name,
                invoker_id,
                invoker_username,
                token,
            } => self.on_command(&name, invoker_id, &invoker_username, token).await,
        }
    }

    fn on_ready(&self) -> Dispatched {
        if self.reconciler_started.swap(true, Ordering::AcqRel) {
            debug!("ready received again, reconciliation loop already running");
            return Dispatched::ReconcilerAlreadyRunning;
        }
        self.reconciler.clone().spawn();
        Dispatched::ReconcilerStarted
    }

    async fn on_component(
        &self,
        custom_id: &str,
        user_id: UserId,
        values: Vec<String>,
        token: InteractionToken,
    ) -> Result<Dispatched, DispatchError> {
        match ComponentAction::parse(custom_id) {
            ComponentAction::GroupSelect => self.on_selection(user_id, 0, values).await,
            ComponentAction::OptionSelect(index) => self.on_selection(user_id, index, values).await,
            ComponentAction::Next => Ok(Dispatched::Answer(
                self.engine.advance(user_id, Some(&token)).await?,
            )),
            ComponentAction::YesNo { index, yes } => Ok(Dispatched::Answer(
                self.engine.answer_yes_no(user_id, index, yes).await?,
            )),
            ComponentAction::OpenApplication => {
                let Some(_reviewer) = self.authorize(user_id, &token).await? else {
                    return Ok(Dispatched::Unauthorized);
                };
                let Some(applicant) = values.first().and_then(|value| value.parse::<UserId>().ok())
                else {
                    return Ok(Dispatched::Ignored);
                };
                match self.review.open_record(applicant) {
                    Ok(card) => {
                        self.platform.respond(&token, card).await?;
                        Ok(Dispatched::ReviewOpened(applicant))
                    }
                    Err(err) => self.review_failed(err, &token).await,
                }
            }
            ComponentAction::Accept(applicant) => {
                let Some(reviewer) = self.authorize(user_id, &token).await? else {
                    return Ok(Dispatched::Unauthorized);
                };
                match self.review.accept(applicant, &reviewer).await {
                    Ok(outcome) => {
                        self.platform
                            .respond(
                                &token,
                                OutboundMessage::text(format!(
                                    "Application from {} accepted.",
                                    outcome.record.applicant_username
                                )),
                            )
                            .await?;
                        Ok(Dispatched::Accepted(applicant))
                    }
                    Err(err) => self.review_failed(err, &token).await,
                }
            }
            ComponentAction::Deny(applicant) => {
                let Some(reviewer) = self.authorize(user_id, &token).await? else {
                    return Ok(Dispatched::Unauthorized);
                };
                match self.review.deny(applicant, &reviewer).await {
                    Ok(outcome) => {
                        self.platform
                            .respond(
                                &token,
                                OutboundMessage::text(format!(
                                    "Application from {} denied.",
                                    outcome.record.applicant_username
                                )),
                            )
                            .await?;
                        Ok(Dispatched::Denied(applicant))
                    }
                    Err(err) => self.review_failed(err, &token).await,
                }
            }
            ComponentAction::Cancel => {
                self.platform.respond(&token, self.review.cancel()).await?;
                Ok(Dispatched::Canceled)
            }
            ComponentAction::Unknown => {
                debug!(custom_id, "unknown component ignored");
                Ok(Dispatched::Ignored)
            }
        }
    }

    async fn on_command(
        &self,
        name: &str,
        invoker: UserId,
        invoker_username: &str,
        token: InteractionToken,
    ) -> Result<Dispatched, DispatchError> {
        match name {
            "apply" => {
                let origin = token.clone();
                match self
                    .engine
                    .start_session(invoker, invoker_username, origin)
                    .await
                {
                    Ok(outcome) => Ok(Dispatched::Session(outcome)),
                    Err(EngineError::Platform(err)) => {
                        warn!(applicant_id = %invoker, error = %err, "unable to open application conversation");
                        self.platform
                            .respond(&token, OutboundMessage::text(DM_UNAVAILABLE_NOTICE))
                            .await?;
                        Ok(Dispatched::Rejected(DM_UNAVAILABLE_NOTICE.to_string()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            "handle" => {
                if self.authorize(invoker, &token).await?.is_none() {
                    return Ok(Dispatched::Unauthorized);
                }
                let pending = match self.review.list_pending() {
                    Ok(pending) => pending,
                    Err(err) => return self.review_failed(err, &token).await,
                };
                let message = ReviewWorkflow::<R, P>::pending_menu(&pending)
                    .unwrap_or_else(|| OutboundMessage::text(NO_PENDING_NOTICE));
                self.platform.respond(&token, message).await?;
                Ok(Dispatched::PendingListed(pending.len()))
            }
            "roster" => {
                if self.authorize(invoker, &token).await?.is_none() {
                    return Ok(Dispatched::Unauthorized);
                }
                let roster = self.roster().await?;
                self.platform
                    .respond(&token, OutboundMessage::text(roster.summary()))
                    .await?;
                Ok(Dispatched::RosterPosted(roster.total()))
            }
            other => {
                debug!(command = other, "unknown command ignored");
                Ok(Dispatched::Ignored)
            }
        }
    }

    /// Resolves the actor as a reviewer, or tells them they lack the admin role.
    async fn authorize(
        &self,
        actor: UserId,
        token: &InteractionToken,
    ) -> Result<Option<Reviewer>, PlatformError> {
        let member = match self.platform.fetch_member(self.guild_id, actor).await {
            Ok(member) => Some(member),
            Err(PlatformError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        match member.filter(|member| member.has_role(self.admin_role)) {
            Some(member) => Ok(Some(Reviewer {
                id: member.id,
                display_name: member.display_name().to_string(),
            })),
            None => {
                info!(actor = %actor, "review action refused, missing admin role");
                self.platform
                    .respond(token, OutboundMessage::text(PERMISSION_DENIED_NOTICE))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Data errors go back to the reviewer verbatim; store and transport errors are logged
    /// and surfaced as a generic notice.
    async fn on_selection(
        &self,
        user_id: UserId,
        index: usize,
        values: Vec<String>,
    ) -> Result<Dispatched, DispatchError> {
        let Some(value) = values.into_iter().next() else {
            return Ok(Dispatched::Ignored);
        };
        Ok(Dispatched::Answer(
            self.engine.submit_selection(user_id, index, value).await?,
        ))
    }

    async fn review_failed(
        &self,
        err: ReviewError,
        token: &InteractionToken,
    ) -> Result<Dispatched, DispatchError> {
        match err {
            ReviewError::NotFound(_)
            | ReviewError::NotPending { .. }
            | ReviewError::DecisionInProgress(_)
            | ReviewError::UnknownGroup(_)
            | ReviewError::MemberUpdate(_) => {
                let notice = err.to_string();
                info!(reason = %notice, "review action rejected");
                self.platform
                    .respond(token, OutboundMessage::text(notice.clone()))
                    .await?;
                Ok(Dispatched::Rejected(notice))
            }
            ReviewError::Repository(_) | ReviewError::Platform(_) => {
                warn!(error = %err, "review action failed");
                if let Err(respond_err) = self
                    .platform
                    .respond(token, OutboundMessage::text(REVIEW_FAILED_NOTICE))
                    .await
                {
                    warn!(error = %respond_err, "unable to report review failure");
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_component_ids() {
        assert_eq!(ComponentAction::parse("squadron_select"), ComponentAction::GroupSelect);
        assert_eq!(ComponentAction::parse("next_button"), ComponentAction::Next);
        assert_eq!(ComponentAction::parse("dropdown_3"), ComponentAction::OptionSelect(3));
        assert_eq!(
            ComponentAction::parse("yes_2"),
            ComponentAction::YesNo { index: 2, yes: true }
        );
        assert_eq!(
            ComponentAction::parse("no_5"),
            ComponentAction::YesNo { index: 5, yes: false }
        );
        assert_eq!(
            ComponentAction::parse("application_select"),
            ComponentAction::OpenApplication
        );
        assert_eq!(
            ComponentAction::parse("accept_42"),
            ComponentAction::Accept(UserId(42))
        );
        assert_eq!(ComponentAction::parse("deny_7"), ComponentAction::Deny(UserId(7)));
        assert_eq!(ComponentAction::parse("cancel"), ComponentAction::Cancel);
    }

    #[test]
    fn malformed_ids_are_unknown() {
        for raw in ["", "accept_", "yes_x", "dropdown", "launch_1", "deny_-3"] {
            assert_eq!(ComponentAction::parse(raw), ComponentAction::Unknown, "{raw}");
        }
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: PlatformEvent = serde_json::from_str(
            r#"{"type":"component_interaction","custom_id":"yes_1","user_id":5,"token":"t-1"}"#,
        )
        .expect("event parses");
        assert_eq!(
            event,
            PlatformEvent::ComponentInteraction {
                custom_id: "yes_1".to_string(),
                user_id: UserId(5),
                values: Vec::new(),
                token: InteractionToken("t-1".to_string()),
            }
        );

        let ready: PlatformEvent = serde_json::from_str(r#"{"type":"ready"}"#).expect("ready parses");
        assert_eq!(ready, PlatformEvent::Ready);
    }
}
