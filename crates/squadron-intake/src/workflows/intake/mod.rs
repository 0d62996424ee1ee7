//! Squadron application intake and review.
//!
//! Applicants answer the question catalog over direct messages, completed applications land in
//! the flat-file store, the reconciliation loop announces them to reviewers, and reviewers accept
//! or deny them with the membership side effects that follow.

pub mod announcements;
pub mod assets;
pub mod catalog;
pub mod csv_store;
pub mod directory;
pub mod dispatcher;
pub mod domain;
pub(crate) mod eligibility;
pub mod engine;
pub mod platform;
pub mod reconcile;
pub mod repository;
pub mod review;
pub mod router;
pub mod session;

#[cfg(test)]
mod tests;

pub use announcements::{AnnouncementError, AnnouncementPool};
pub use assets::{AssetError, AssetPaths, IntakeAssets};
pub use catalog::{CatalogError, Question, QuestionCatalog, QuestionField, ResponseType};
pub use csv_store::CsvApplicationRepository;
pub use directory::{
    DirectoryError, GroupDirectory, GroupDirectoryEntry, Leadership, LeadershipMarkers,
};
pub use dispatcher::{
    BotSettings, ComponentAction, DispatchError, Dispatched, IntakeBot, PlatformEvent,
};
pub use domain::{
    ApplicationRecord, ApplicationStatus, ApplicationStatusView, ChannelId, GuildId,
    RecordAnswer, RoleId, UserId,
};
pub use eligibility::EligibilityHint;
pub use engine::{AdvanceOutcome, ConversationEngine, EngineError, StartOutcome};
pub use platform::{
    ButtonStyle, Component, Embed, EmbedField, InteractionToken, Member, OutboundMessage,
    Platform, PlatformError, SelectOption,
};
pub use reconcile::{ReconcileSummary, ReconciliationLoop};
pub use repository::{ApplicationRepository, RepositoryError};
pub use review::{AcceptOutcome, DenyOutcome, ReviewError, ReviewSettings, ReviewWorkflow, Reviewer};
pub use router::intake_router;
pub use session::{ApplicationSession, SessionState};
