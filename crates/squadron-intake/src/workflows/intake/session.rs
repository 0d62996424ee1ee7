use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::catalog::{QuestionCatalog, ResponseType};
use super::domain::{ChannelId, UserId};
use super::platform::InteractionToken;

/// Where an in-flight application stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingGroup,
    AwaitingQuestion(usize),
    Complete,
}

impl SessionState {
    fn at(index: usize, catalog_len: usize) -> Self {
        match index {
            0 => SessionState::AwaitingGroup,
            i if i < catalog_len => SessionState::AwaitingQuestion(i),
            _ => SessionState::Complete,
        }
    }

    pub fn question_index(&self) -> Option<usize> {
        match self {
            SessionState::AwaitingGroup => Some(0),
            SessionState::AwaitingQuestion(index) => Some(*index),
            SessionState::Complete => None,
        }
    }
}

/// Inputs that can move a session forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// A choice from a select menu, tagged with the question index it was rendered for;
    /// staged until committed.
    Select { index: usize, value: String },
    /// "Next" pressed: commit the staged choice.
    Commit,
    /// A message typed on the applicant's direct channel.
    Text(String),
    /// A yes/no button, tagged with the question index it was rendered for.
    YesNo { index: usize, yes: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Staged,
    Advanced(SessionState),
    SelectionRequired,
    Ignored(&'static str),
}

/// Transient progress for one applicant. `answers.len()` always equals the index of the
/// question being asked; `state` is kept in step with it by [`ApplicationSession::advance`].
#[derive(Debug, Clone)]
pub struct ApplicationSession {
    applicant_id: UserId,
    applicant_username: String,
    direct_channel: ChannelId,
    answers: Vec<String>,
    pending_selection: Option<String>,
    started_at: DateTime<Utc>,
    origin: Option<InteractionToken>,
    state: SessionState,
}

impl ApplicationSession {
    pub fn new(
        applicant_id: UserId,
        applicant_username: impl Into<String>,
        direct_channel: ChannelId,
        origin: InteractionToken,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            applicant_id,
            applicant_username: applicant_username.into(),
            direct_channel,
            answers: Vec::new(),
            pending_selection: None,
            started_at,
            origin: Some(origin),
            state: SessionState::AwaitingGroup,
        }
    }

    pub fn applicant_id(&self) -> UserId {
        self.applicant_id
    }

    pub fn applicant_username(&self) -> &str {
        &self.applicant_username
    }

    pub fn direct_channel(&self) -> ChannelId {
        self.direct_channel
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn pending_selection(&self) -> Option<&str> {
        self.pending_selection.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Hands out the origin handle; later calls get `None` so completion is signalled once.
    pub fn take_origin(&mut self) -> Option<InteractionToken> {
        self.origin.take()
    }

    /// The single transition function. Events that do not fit the current question are
    /// ignored without touching the session.
    pub fn advance(&mut self, event: AnswerEvent, catalog: &QuestionCatalog) -> Transition {
        let Some(index) = self.state.question_index() else {
            return Transition::Ignored("session already complete");
        };
        let Some(question) = catalog.get(index) else {
            return Transition::Ignored("question index outside catalog");
        };

        let answer = match (event, question.response_type) {
            (AnswerEvent::Select { index: asked, value }, ResponseType::SingleSelect)
                if asked == index =>
            {
                self.pending_selection = Some(value);
                return Transition::Staged;
            }
            (AnswerEvent::Select { .. }, ResponseType::SingleSelect) => {
                return Transition::Ignored("selection for a question that is no longer current")
            }
            (AnswerEvent::Commit, ResponseType::SingleSelect) => {
                match self.pending_selection.take() {
                    Some(value) => value,
                    None => return Transition::SelectionRequired,
                }
            }
            (AnswerEvent::Text(text), ResponseType::FreeText) => text,
            (AnswerEvent::YesNo { index: asked, yes }, ResponseType::YesNo) if asked == index => {
                let label = if yes { "Yes" } else { "No" };
                label.to_string()
            }
            (AnswerEvent::YesNo { .. }, ResponseType::YesNo) => {
                return Transition::Ignored("answer for a question that is no longer current")
            }
            _ => return Transition::Ignored("answer does not match the current question"),
        };

        self.answers.push(answer);
        self.state = SessionState::at(self.answers.len(), catalog.len());
        Transition::Advanced(self.state)
    }
}

/// Session table owned by the conversation engine; at most one session per applicant.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<UserId, ApplicationSession>,
}

impl SessionStore {
    /// Inserts a session, returning the one it superseded.
    pub fn insert(&mut self, session: ApplicationSession) -> Option<ApplicationSession> {
        self.sessions.insert(session.applicant_id, session)
    }

    pub fn get(&self, applicant: UserId) -> Option<&ApplicationSession> {
        self.sessions.get(&applicant)
    }

    pub fn get_mut(&mut self, applicant: UserId) -> Option<&mut ApplicationSession> {
        self.sessions.get_mut(&applicant)
    }

    pub fn remove(&mut self, applicant: UserId) -> Option<ApplicationSession> {
        self.sessions.remove(&applicant)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
