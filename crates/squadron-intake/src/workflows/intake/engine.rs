use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::catalog::{QuestionCatalog, ResponseType};
use super::directory::GroupDirectory;
use super::domain::{
    ApplicationRecord, ApplicationStatus, ChannelId, GuildId, RecordAnswer, UserId,
};
use super::platform::{
    ButtonStyle, Component, InteractionToken, OutboundMessage, Platform, PlatformError,
    SelectOption,
};
use super::repository::{ApplicationRepository, RepositoryError};
use super::session::{AnswerEvent, ApplicationSession, SessionState, SessionStore, Transition};

pub const GROUP_SELECT_ID: &str = "squadron_select";
pub const NEXT_BUTTON_ID: &str = "next_button";

pub(crate) const COMPLETION_THANKS: &str =
    "Thank you for your application! The admin team will review your answers and get back to you soon.";
pub(crate) const COMPLETION_ACK: &str = "Application completed.";
pub(crate) const OPEN_APPLICATION_NOTICE: &str =
    "You already have an application awaiting review. The admin team will be in touch soon.";
const SAVE_FAILED_NOTICE: &str =
    "An error occurred while saving your application. Please restart the application process.";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started,
    /// An in-progress session for the same applicant was replaced.
    Superseded,
    /// The applicant already has an application awaiting review; nothing was started.
    OpenApplication(ApplicationStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Staged,
    Prompted(usize),
    Completed(ApplicationRecord),
    SelectionRequired,
    Ignored,
}

/// Drives each applicant through the question catalog over direct messages.
pub struct ConversationEngine<R, P> {
    catalog: Arc<QuestionCatalog>,
    directory: Arc<GroupDirectory>,
    repository: Arc<R>,
    platform: Arc<P>,
    guild_id: GuildId,
    intro_delay: Duration,
    sessions: Mutex<SessionStore>,
}

impl<R, P> ConversationEngine<R, P>
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    pub fn new(
        catalog: Arc<QuestionCatalog>,
        directory: Arc<GroupDirectory>,
        repository: Arc<R>,
        platform: Arc<P>,
        guild_id: GuildId,
    ) -> Self {
        Self {
            catalog,
            directory,
            repository,
            platform,
            guild_id,
            intro_delay: Duration::ZERO,
            sessions: Mutex::new(SessionStore::default()),
        }
    }

    /// Pause between the welcome message and the first question.
    pub fn with_intro_delay(mut self, intro_delay: Duration) -> Self {
        self.intro_delay = intro_delay;
        self
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    /// Starts (or restarts) an application for `applicant`.
    pub async fn start_session(
        &self,
        applicant: UserId,
        applicant_username: &str,
        origin: InteractionToken,
    ) -> Result<StartOutcome, EngineError> {
        if let Some(open) = self
            .repository
            .fetch(applicant)?
            .filter(|record| !record.status.is_terminal())
        {
            info!(applicant_id = %applicant, status = %open.status, "application already open, not starting");
            self.platform
                .respond(&origin, OutboundMessage::text(OPEN_APPLICATION_NOTICE))
                .await?;
            return Ok(StartOutcome::OpenApplication(open.status));
        }

        if !self.catalog.initial_message().is_empty() {
            self.platform
                .send_direct_message(
                    applicant,
                    OutboundMessage::text(self.catalog.initial_message()),
                )
                .await?;
            if !self.intro_delay.is_zero() {
                tokio::time::sleep(self.intro_delay).await;
            }
        }

        let prompt = self
            .render_question(0)
            .unwrap_or_else(|| OutboundMessage::text(self.catalog.group_question().text.clone()));
        let channel = self.platform.send_direct_message(applicant, prompt).await?;

        let session =
            ApplicationSession::new(applicant, applicant_username, channel, origin, Utc::now());
        let superseded = self.sessions.lock().await.insert(session).is_some();
        info!(applicant_id = %applicant, superseded, "application session started");

        Ok(if superseded {
            StartOutcome::Superseded
        } else {
            StartOutcome::Started
        })
    }

    /// Stages a select-menu choice made on the menu rendered for question `index`. Choices
    /// from an earlier menu, or values not on offer for the current question, are ignored.
    pub async fn submit_selection(
        &self,
        applicant: UserId,
        index: usize,
        value: String,
    ) -> Result<AdvanceOutcome, EngineError> {
        let offered = {
            let sessions = self.sessions.lock().await;
            let Some(current) = sessions
                .get(applicant)
                .and_then(|session| session.state().question_index())
            else {
                debug!(applicant_id = %applicant, "selection without a session ignored");
                return Ok(AdvanceOutcome::Ignored);
            };
            if current != index {
                debug!(
                    applicant_id = %applicant,
                    index,
                    current,
                    "selection from a stale menu ignored"
                );
                return Ok(AdvanceOutcome::Ignored);
            }
            self.options_for(index).contains(&value)
        };

        if !offered {
            debug!(applicant_id = %applicant, %value, "selection not on offer ignored");
            return Ok(AdvanceOutcome::Ignored);
        }
        self.apply(applicant, AnswerEvent::Select { index, value }).await
    }

    /// Commits the staged selection and moves to the next question.
    pub async fn advance(
        &self,
        applicant: UserId,
        token: Option<&InteractionToken>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let outcome = self.apply(applicant, AnswerEvent::Commit).await?;

        if outcome == AdvanceOutcome::SelectionRequired {
            if let Some(token) = token {
                let on_group = self
                    .session(applicant)
                    .await
                    .is_some_and(|session| session.state() == SessionState::AwaitingGroup);
                let notice = if on_group {
                    "Please select a squadron first."
                } else {
                    "Please select an option first."
                };
                self.platform
                    .respond(token, OutboundMessage::text(notice))
                    .await?;
            }
        }

        Ok(outcome)
    }

    /// A message on a direct channel. Only the applicant's own session channel counts.
    pub async fn receive_message(
        &self,
        applicant: UserId,
        channel: ChannelId,
        text: String,
    ) -> Result<AdvanceOutcome, EngineError> {
        let on_session_channel = self
            .sessions
            .lock()
            .await
            .get(applicant)
            .is_some_and(|session| session.direct_channel() == channel);
        if !on_session_channel {
            return Ok(AdvanceOutcome::Ignored);
        }

        self.apply(applicant, AnswerEvent::Text(text)).await
    }

    pub async fn answer_yes_no(
        &self,
        applicant: UserId,
        index: usize,
        yes: bool,
    ) -> Result<AdvanceOutcome, EngineError> {
        self.apply(applicant, AnswerEvent::YesNo { index, yes }).await
    }

    /// Snapshot of the applicant's in-flight session.
    pub async fn session(&self, applicant: UserId) -> Option<ApplicationSession> {
        self.sessions.lock().await.get(applicant).cloned()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Renders question `index` according to its response type.
    pub fn render_question(&self, index: usize) -> Option<OutboundMessage> {
        let question = self.catalog.get(index)?;
        let next = Component::button(NEXT_BUTTON_ID, "Next", ButtonStyle::Success);

        let message = if index == 0 {
            OutboundMessage::text(question.text.clone())
                .with_component(select(
                    GROUP_SELECT_ID.to_string(),
                    "Select a squadron",
                    self.directory.recruiting_names(),
                ))
                .with_component(next)
        } else {
            match question.response_type {
                ResponseType::SingleSelect => OutboundMessage::text(question.text.clone())
                    .with_component(select(
                        format!("dropdown_{index}"),
                        "Select an option",
                        question.options.clone(),
                    ))
                    .with_component(next),
                ResponseType::YesNo => OutboundMessage::text(question.text.clone())
                    .with_component(Component::button(
                        format!("yes_{index}"),
                        "Yes",
                        ButtonStyle::Success,
                    ))
                    .with_component(Component::button(
                        format!("no_{index}"),
                        "No",
                        ButtonStyle::Danger,
                    )),
                ResponseType::FreeText => OutboundMessage::text(question.text.clone()),
            }
        };

        Some(message)
    }

    fn options_for(&self, index: usize) -> Vec<String> {
        if index == 0 {
            return self.directory.recruiting_names();
        }
        self.catalog
            .get(index)
            .map(|question| question.options.clone())
            .unwrap_or_default()
    }

    async fn apply(
        &self,
        applicant: UserId,
        event: AnswerEvent,
    ) -> Result<AdvanceOutcome, EngineError> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(applicant) else {
            debug!(applicant_id = %applicant, "answer without a session ignored");
            return Ok(AdvanceOutcome::Ignored);
        };

        match session.advance(event, &self.catalog) {
            Transition::Staged => Ok(AdvanceOutcome::Staged),
            Transition::SelectionRequired => Ok(AdvanceOutcome::SelectionRequired),
            Transition::Ignored(reason) => {
                debug!(applicant_id = %applicant, reason, "answer ignored");
                Ok(AdvanceOutcome::Ignored)
            }
            Transition::Advanced(SessionState::Complete) => {
                let Some(session) = sessions.remove(applicant) else {
                    return Ok(AdvanceOutcome::Ignored);
                };
                drop(sessions);
                self.complete(session).await.map(AdvanceOutcome::Completed)
            }
            Transition::Advanced(state) => {
                drop(sessions);
                let index = state.question_index().unwrap_or_default();
                if let Some(prompt) = self.render_question(index) {
                    self.platform.send_direct_message(applicant, prompt).await?;
                }
                Ok(AdvanceOutcome::Prompted(index))
            }
        }
    }

    async fn complete(
        &self,
        mut session: ApplicationSession,
    ) -> Result<ApplicationRecord, EngineError> {
        let applicant = session.applicant_id();
        let platform_username = match self.platform.fetch_member(self.guild_id, applicant).await {
            Ok(member) => member.username,
            Err(err) => {
                warn!(applicant_id = %applicant, error = %err, "unable to resolve platform username");
                session.applicant_username().to_string()
            }
        };

        let submitted_at = Utc::now();
        let elapsed = submitted_at - session.started_at();
        let answers = self
            .catalog
            .questions()
            .iter()
            .zip(session.answers())
            .map(|(question, answer)| RecordAnswer {
                question: question.text.clone(),
                answer: answer.clone(),
            })
            .collect();

        let record = ApplicationRecord {
            applicant_username: session.applicant_username().to_string(),
            answers,
            platform_username,
            applicant_id: applicant,
            status: ApplicationStatus::SubmittedUnannounced,
            submitted_at,
            fill_duration_seconds: (elapsed.num_milliseconds().max(0) as f64) / 1000.0,
        };

        let record = match self.repository.append(record) {
            Ok(record) => record,
            Err(err) => {
                warn!(applicant_id = %applicant, error = %err, "failed to store completed application");
                if let Err(send_err) = self
                    .platform
                    .send_direct_message(applicant, OutboundMessage::text(SAVE_FAILED_NOTICE))
                    .await
                {
                    warn!(applicant_id = %applicant, error = %send_err, "unable to tell applicant about failed save");
                }
                return Err(err.into());
            }
        };
        info!(
            applicant_id = %applicant,
            group = record.answers.first().map(|entry| entry.answer.as_str()).unwrap_or_default(),
            "application submitted"
        );

        if let Err(err) = self
            .platform
            .send_direct_message(applicant, OutboundMessage::text(COMPLETION_THANKS))
            .await
        {
            warn!(applicant_id = %applicant, error = %err, "unable to thank applicant");
        }
        if let Some(origin) = session.take_origin() {
            if let Err(err) = self
                .platform
                .respond(&origin, OutboundMessage::text(COMPLETION_ACK))
                .await
            {
                warn!(applicant_id = %applicant, error = %err, "unable to complete origin command");
            }
        }

        Ok(record)
    }
}

fn select(custom_id: String, placeholder: &str, options: Vec<String>) -> Component {
    Component::Select {
        custom_id,
        placeholder: placeholder.to_string(),
        options: options.into_iter().map(SelectOption::same).collect(),
    }
}
