use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::intake::announcements::AnnouncementPool;
use crate::workflows::intake::assets::IntakeAssets;
use crate::workflows::intake::catalog::{Question, QuestionCatalog};
use crate::workflows::intake::directory::{GroupDirectory, GroupDirectoryEntry, LeadershipMarkers};
use crate::workflows::intake::dispatcher::{BotSettings, IntakeBot};
use crate::workflows::intake::domain::{
    ApplicationRecord, ApplicationStatus, ChannelId, GuildId, RecordAnswer, RoleId, UserId,
};
use crate::workflows::intake::engine::ConversationEngine;
use crate::workflows::intake::platform::{
    InteractionToken, Member, OutboundMessage, Platform, PlatformError,
};
use crate::workflows::intake::repository::{
    check_transition, select_for_applicant, ApplicationRepository, RepositoryError,
};
use crate::workflows::intake::review::{ReviewSettings, ReviewWorkflow};

pub(super) const GUILD: GuildId = GuildId(1);
pub(super) const REVIEW_CHANNEL: ChannelId = ChannelId(900);
pub(super) const ANNOUNCEMENT_CHANNEL: ChannelId = ChannelId(901);
pub(super) const ADMIN_ROLE: RoleId = RoleId(50);
pub(super) const GENERAL_ROLE: RoleId = RoleId(51);
pub(super) const RECRUIT_ROLE: RoleId = RoleId(52);
pub(super) const ALPHA_ROLE: RoleId = RoleId(100);
pub(super) const BRAVO_ROLE: RoleId = RoleId(200);

pub(super) const APPLICANT: UserId = UserId(7);
pub(super) const ADMIN: UserId = UserId(1);
pub(super) const OUTSIDER: UserId = UserId(2);

pub(super) const GROUP_QUESTION: &str = "Which squadron would you like to join?";
pub(super) const CALLSIGN_QUESTION: &str = "What callsign would you like?";
pub(super) const AIRFRAME_QUESTION: &str = "Preferred airframe?";
pub(super) const AGE_QUESTION: &str = "Are you over 18?";
pub(super) const WELCOME: &str = "Welcome to the application process.";

pub(super) fn token(raw: &str) -> InteractionToken {
    InteractionToken(raw.to_string())
}

/// Group select followed by one yes/no question.
pub(super) fn catalog() -> QuestionCatalog {
    QuestionCatalog::new(
        WELCOME,
        vec![
            Question::single_select(GROUP_QUESTION, Vec::new()),
            Question::yes_no(AGE_QUESTION).expecting("Yes"),
        ],
    )
    .expect("catalog builds")
}

/// Group, callsign, airframe dropdown, age.
pub(super) fn extended_catalog() -> QuestionCatalog {
    QuestionCatalog::new(
        WELCOME,
        vec![
            Question::single_select(GROUP_QUESTION, Vec::new()),
            Question::free_text(CALLSIGN_QUESTION),
            Question::single_select(
                AIRFRAME_QUESTION,
                vec!["F-16".to_string(), "F/A-18".to_string()],
            ),
            Question::yes_no(AGE_QUESTION).expecting("Yes"),
        ],
    )
    .expect("catalog builds")
}

pub(super) fn directory() -> GroupDirectory {
    GroupDirectory::new(vec![
        GroupDirectoryEntry {
            role_id: ALPHA_ROLE,
            display_name: "Alpha".to_string(),
            is_recruiting: true,
        },
        GroupDirectoryEntry {
            role_id: BRAVO_ROLE,
            display_name: "Bravo".to_string(),
            is_recruiting: true,
        },
        GroupDirectoryEntry {
            role_id: RoleId(300),
            display_name: "Charlie".to_string(),
            is_recruiting: false,
        },
    ])
}

pub(super) fn announcements() -> AnnouncementPool {
    AnnouncementPool::new(vec![
        "Fly safe and check six.".to_string(),
        "The coffee is in the ready room.".to_string(),
    ])
    .expect("pool builds")
}

pub(super) fn assets(catalog: QuestionCatalog) -> IntakeAssets {
    IntakeAssets::new(catalog, directory(), announcements())
}

pub(super) fn review_settings() -> ReviewSettings {
    ReviewSettings {
        guild_id: GUILD,
        review_channel: REVIEW_CHANNEL,
        announcement_channel: ANNOUNCEMENT_CHANNEL,
        general_role: GENERAL_ROLE,
        recruit_role: RECRUIT_ROLE,
        nickname_template: "[HVY](R){callsign}".to_string(),
        organization_name: "Joint Task Force Heavy".to_string(),
        leadership_markers: LeadershipMarkers::default(),
    }
}

pub(super) fn bot_settings() -> BotSettings {
    BotSettings {
        review: review_settings(),
        admin_role: ADMIN_ROLE,
        intro_delay: Duration::ZERO,
        reconcile_interval: Duration::from_secs(60),
    }
}

pub(super) fn member(id: UserId, username: &str, nickname: Option<&str>, roles: &[RoleId]) -> Member {
    Member {
        id,
        username: username.to_string(),
        nickname: nickname.map(str::to_string),
        roles: roles.to_vec(),
        joined_at: Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).single(),
    }
}

/// Applicant, an admin, an outsider, and Alpha's two leaders.
pub(super) fn guild_members() -> Vec<Member> {
    vec![
        member(APPLICANT, "maverick7", None, &[]),
        member(ADMIN, "opsboss", Some("Ops"), &[ADMIN_ROLE]),
        member(OUTSIDER, "lurker", None, &[GENERAL_ROLE]),
        member(UserId(11), "viper", Some("[HVY]CO Viper"), &[ALPHA_ROLE, GENERAL_ROLE]),
        member(UserId(12), "jester", Some("[HVY]XO Jester"), &[ALPHA_ROLE, GENERAL_ROLE]),
    ]
}

pub(super) fn engine(
    catalog: QuestionCatalog,
    repository: Arc<MemoryRepository>,
    platform: Arc<FakePlatform>,
) -> ConversationEngine<MemoryRepository, FakePlatform> {
    ConversationEngine::new(
        Arc::new(catalog),
        Arc::new(directory()),
        repository,
        platform,
        GUILD,
    )
}

pub(super) fn review(
    catalog: QuestionCatalog,
    repository: Arc<MemoryRepository>,
    platform: Arc<FakePlatform>,
) -> ReviewWorkflow<MemoryRepository, FakePlatform> {
    ReviewWorkflow::new(
        Arc::new(catalog),
        Arc::new(directory()),
        repository,
        platform,
        Arc::new(announcements()),
        review_settings(),
    )
}

pub(super) fn bot(
    catalog: QuestionCatalog,
) -> (
    IntakeBot<MemoryRepository, FakePlatform>,
    Arc<MemoryRepository>,
    Arc<FakePlatform>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let platform = Arc::new(FakePlatform::with_members(guild_members()));
    let bot = IntakeBot::new(
        assets(catalog),
        repository.clone(),
        platform.clone(),
        bot_settings(),
    );
    (bot, repository, platform)
}

/// A stored record answering `answers` in catalog order.
pub(super) fn record(
    applicant: UserId,
    catalog: &QuestionCatalog,
    answers: &[&str],
    status: ApplicationStatus,
) -> ApplicationRecord {
    ApplicationRecord {
        applicant_username: format!("pilot{}", applicant.0),
        answers: catalog
            .questions()
            .iter()
            .zip(answers)
            .map(|(question, answer)| RecordAnswer {
                question: question.text.clone(),
                answer: answer.to_string(),
            })
            .collect(),
        platform_username: format!("pilot{}", applicant.0),
        applicant_id: applicant,
        status,
        submitted_at: Utc
            .with_ymd_and_hms(2024, 5, 4, 20, 15, 0)
            .single()
            .expect("valid timestamp"),
        fill_duration_seconds: 42.5,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<Vec<ApplicationRecord>>,
}

impl MemoryRepository {
    pub(super) fn with_records(records: Vec<ApplicationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub(super) fn records(&self) -> Vec<ApplicationRecord> {
        self.records.lock().expect("repository mutex poisoned").clone()
    }

    pub(super) fn status_of(&self, applicant: UserId) -> Option<ApplicationStatus> {
        self.fetch(applicant)
            .expect("memory fetch")
            .map(|record| record.status)
    }
}

impl ApplicationRepository for MemoryRepository {
    fn append(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard
            .iter()
            .any(|existing| existing.applicant_id == record.applicant_id && !existing.status.is_terminal())
        {
            return Err(RepositoryError::DuplicateApplicant(record.applicant_id));
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self.records())
    }

    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.status == status)
            .cloned()
            .collect())
    }

    fn fetch(&self, applicant: UserId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(select_for_applicant(guard.iter(), applicant).cloned())
    }

    fn update_status(
        &self,
        applicant: UserId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard
            .iter_mut()
            .rev()
            .find(|record| record.applicant_id == applicant && !record.status.is_terminal())
            .ok_or(RepositoryError::NotFound(applicant))?;
        check_transition(record.status, status)?;
        record.status = status;
        Ok(record.clone())
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn append(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn list_by_status(
        &self,
        _status: ApplicationStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn fetch(&self, _applicant: UserId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(None)
    }

    fn update_status(
        &self,
        applicant: UserId,
        _status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::NotFound(applicant))
    }
}

/// Records every outbound command; individual command kinds can be made to fail.
#[derive(Default)]
pub(super) struct FakePlatform {
    members: Mutex<Vec<Member>>,
    direct: Mutex<Vec<(UserId, OutboundMessage)>>,
    channel: Mutex<Vec<(ChannelId, OutboundMessage)>>,
    responses: Mutex<Vec<(InteractionToken, OutboundMessage)>>,
    nicknames: Mutex<Vec<(UserId, String)>>,
    role_grants: Mutex<Vec<(UserId, Vec<RoleId>)>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    fail_direct: AtomicBool,
    fail_nickname: AtomicBool,
    fail_roster: AtomicBool,
    yield_on_nickname: AtomicBool,
}

impl FakePlatform {
    pub(super) fn with_members(members: Vec<Member>) -> Self {
        Self {
            members: Mutex::new(members),
            ..Self::default()
        }
    }

    pub(super) fn fail_direct_messages(&self, fail: bool) {
        self.fail_direct.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_nicknames(&self, fail: bool) {
        self.fail_nickname.store(fail, Ordering::SeqCst);
    }

    /// Suspends inside the nickname update so a concurrent task can run in between.
    pub(super) fn yield_on_nickname(&self, enabled: bool) {
        self.yield_on_nickname.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn fail_roster(&self, fail: bool) {
        self.fail_roster.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_channel(&self, channel: ChannelId, fail: bool) {
        let mut failing = self.failing_channels.lock().expect("platform mutex poisoned");
        if fail {
            failing.insert(channel);
        } else {
            failing.remove(&channel);
        }
    }

    pub(super) fn direct_to(&self, user: UserId) -> Vec<OutboundMessage> {
        self.direct
            .lock()
            .expect("platform mutex poisoned")
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub(super) fn posted_to(&self, channel: ChannelId) -> Vec<OutboundMessage> {
        self.channel
            .lock()
            .expect("platform mutex poisoned")
            .iter()
            .filter(|(to, _)| *to == channel)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub(super) fn responses_to(&self, token: &InteractionToken) -> Vec<OutboundMessage> {
        self.responses
            .lock()
            .expect("platform mutex poisoned")
            .iter()
            .filter(|(to, _)| to == token)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub(super) fn nicknames(&self) -> Vec<(UserId, String)> {
        self.nicknames.lock().expect("platform mutex poisoned").clone()
    }

    pub(super) fn role_grants(&self) -> Vec<(UserId, Vec<RoleId>)> {
        self.role_grants.lock().expect("platform mutex poisoned").clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn send_direct_message(
        &self,
        user: UserId,
        message: OutboundMessage,
    ) -> Result<ChannelId, PlatformError> {
        if self.fail_direct.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("direct messages closed".to_string()));
        }
        self.direct
            .lock()
            .expect("platform mutex poisoned")
            .push((user, message));
        Ok(ChannelId(user.0))
    }

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> Result<(), PlatformError> {
        if self
            .failing_channels
            .lock()
            .expect("platform mutex poisoned")
            .contains(&channel)
        {
            return Err(PlatformError::Transport(format!("channel {channel} unreachable")));
        }
        self.channel
            .lock()
            .expect("platform mutex poisoned")
            .push((channel, message));
        Ok(())
    }

    async fn respond(
        &self,
        token: &InteractionToken,
        message: OutboundMessage,
    ) -> Result<(), PlatformError> {
        self.responses
            .lock()
            .expect("platform mutex poisoned")
            .push((token.clone(), message));
        Ok(())
    }

    async fn set_member_nickname(
        &self,
        _guild: GuildId,
        member: UserId,
        nickname: &str,
    ) -> Result<(), PlatformError> {
        if self.yield_on_nickname.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_nickname.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("missing manage nicknames".to_string()));
        }
        self.nicknames
            .lock()
            .expect("platform mutex poisoned")
            .push((member, nickname.to_string()));
        Ok(())
    }

    async fn grant_member_roles(
        &self,
        _guild: GuildId,
        member: UserId,
        roles: &[RoleId],
    ) -> Result<(), PlatformError> {
        self.role_grants
            .lock()
            .expect("platform mutex poisoned")
            .push((member, roles.to_vec()));
        Ok(())
    }

    async fn fetch_guild_members(&self, _guild: GuildId) -> Result<Vec<Member>, PlatformError> {
        if self.fail_roster.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("member list unavailable".to_string()));
        }
        Ok(self.members.lock().expect("platform mutex poisoned").clone())
    }

    async fn fetch_member(&self, _guild: GuildId, member: UserId) -> Result<Member, PlatformError> {
        self.members
            .lock()
            .expect("platform mutex poisoned")
            .iter()
            .find(|candidate| candidate.id == member)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("member {member}")))
    }
}
