//! Sorts guild members into their groups for roster reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::intake::directory::GroupDirectory;
use super::intake::domain::RoleId;
use super::intake::platform::Member;

pub const UNASSIGNED_GROUP: &str = "Unassigned";

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("unable to render roster csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("unable to flush roster csv: {0}")]
    Io(#[from] std::io::Error),
    #[error("roster csv is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRow {
    pub display_name: String,
    pub username: String,
    pub roles: Vec<RoleId>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl RosterRow {
    fn from_member(member: &Member) -> Self {
        Self {
            display_name: member.display_name().to_string(),
            username: member.username.clone(),
            roles: member.roles.clone(),
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterGroup {
    pub name: String,
    pub role_id: Option<RoleId>,
    pub members: Vec<RosterRow>,
}

/// Members bucketed by the first directory group they hold, in directory order,
/// followed by everyone without a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub groups: Vec<RosterGroup>,
}

impl Roster {
    pub fn sort(directory: &GroupDirectory, members: &[Member]) -> Self {
        let mut groups: Vec<RosterGroup> = directory
            .entries()
            .iter()
            .map(|entry| RosterGroup {
                name: entry.display_name.clone(),
                role_id: Some(entry.role_id),
                members: Vec::new(),
            })
            .collect();
        let mut unassigned = RosterGroup {
            name: UNASSIGNED_GROUP.to_string(),
            role_id: None,
            members: Vec::new(),
        };

        for member in members {
            let row = RosterRow::from_member(member);
            let bucket = directory
                .group_for_member(member)
                .and_then(|entry| {
                    groups
                        .iter_mut()
                        .find(|group| group.role_id == Some(entry.role_id))
                })
                .unwrap_or(&mut unassigned);
            bucket.members.push(row);
        }

        groups.push(unassigned);
        for group in &mut groups {
            group
                .members
                .sort_by_key(|row| row.display_name.to_lowercase());
        }

        Self { groups }
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|group| group.members.len()).sum()
    }

    /// Per-group head counts, one line per group.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Roster ({} members)", self.total())];
        lines.extend(
            self.groups
                .iter()
                .map(|group| format!("- {}: {}", group.name, group.members.len())),
        );
        lines.join("\n")
    }

    pub fn to_csv(&self) -> Result<String, RosterError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Group", "Display Name", "Username", "Role IDs", "Joined"])?;

        for group in &self.groups {
            for row in &group.members {
                let roles = row
                    .roles
                    .iter()
                    .map(RoleId::to_string)
                    .collect::<Vec<_>>()
                    .join(";");
                let joined = row
                    .joined_at
                    .map(|joined| joined.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                writer.write_record([
                    group.name.as_str(),
                    row.display_name.as_str(),
                    row.username.as_str(),
                    roles.as_str(),
                    joined.as_str(),
                ])?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| RosterError::Io(err.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}
