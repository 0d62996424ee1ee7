use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Platform identity of a member or applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(UserId)
    }
}

/// Role identifier; every recruiting group maps 1:1 onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl RoleId {
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(RoleId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review lifecycle of a stored application.
///
/// `SubmittedUnannounced -> PendingReview -> Accepted | Denied`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    SubmittedUnannounced,
    PendingReview,
    Accepted,
    Denied,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::SubmittedUnannounced => "submitted-unannounced",
            ApplicationStatus::PendingReview => "pending-review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Denied => "denied",
        }
    }

    /// Parses canonical labels as well as the status strings older stores were written with.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "submitted-unannounced" | "Pending (No Post)" => {
                Some(ApplicationStatus::SubmittedUnannounced)
            }
            "pending-review" | "Pending" => Some(ApplicationStatus::PendingReview),
            "accepted" | "Accepted" => Some(ApplicationStatus::Accepted),
            "denied" | "Denied" => Some(ApplicationStatus::Denied),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Denied)
    }

    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (
                ApplicationStatus::SubmittedUnannounced,
                ApplicationStatus::PendingReview
            ) | (ApplicationStatus::PendingReview, ApplicationStatus::Accepted)
                | (ApplicationStatus::PendingReview, ApplicationStatus::Denied)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One answered question, keyed by the question text it was asked with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAnswer {
    pub question: String,
    pub answer: String,
}

/// Durable row describing one completed application and its review status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub applicant_username: String,
    pub answers: Vec<RecordAnswer>,
    pub platform_username: String,
    pub applicant_id: UserId,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub fill_duration_seconds: f64,
}

impl ApplicationRecord {
    pub fn answer(&self, question: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|entry| entry.question == question)
            .map(|entry| entry.answer.as_str())
    }

    pub fn answer_values(&self) -> Vec<&str> {
        self.answers
            .iter()
            .map(|entry| entry.answer.as_str())
            .collect()
    }

    pub fn submitted_at_label(&self) -> String {
        format_timestamp(&self.submitted_at)
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            applicant_id: self.applicant_id,
            applicant_username: self.applicant_username.clone(),
            status: self.status.label(),
            submitted_at: self.submitted_at_label(),
            fill_duration_seconds: self.fill_duration_seconds,
        }
    }
}

/// Sanitized summary exposed by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub applicant_id: UserId,
    pub applicant_username: String,
    pub status: &'static str,
    pub submitted_at: String,
    pub fill_duration_seconds: f64,
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Accepts RFC 3339 as well as the zone-less ISO timestamps older stores contain (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_strings_map_onto_lifecycle() {
        assert_eq!(
            ApplicationStatus::parse("Pending (No Post)"),
            Some(ApplicationStatus::SubmittedUnannounced)
        );
        assert_eq!(
            ApplicationStatus::parse("Pending"),
            Some(ApplicationStatus::PendingReview)
        );
        assert_eq!(ApplicationStatus::parse("withdrawn"), None);
    }

    #[test]
    fn only_forward_transitions_are_allowed() {
        use ApplicationStatus::*;
        assert!(SubmittedUnannounced.can_transition_to(PendingReview));
        assert!(PendingReview.can_transition_to(Accepted));
        assert!(PendingReview.can_transition_to(Denied));
        assert!(!SubmittedUnannounced.can_transition_to(Accepted));
        assert!(!Accepted.can_transition_to(Denied));
        assert!(!Denied.can_transition_to(PendingReview));
    }

    #[test]
    fn zone_less_timestamps_are_read_as_utc() {
        let parsed = parse_timestamp("2024-05-01T12:30:00.250000").expect("legacy timestamp");
        assert_eq!(format_timestamp(&parsed), "2024-05-01T12:30:00.250Z");
    }
}
