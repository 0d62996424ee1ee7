use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use super::domain::{RoleId, UserId};
use super::platform::Member;

/// A recruiting group (squadron) and the role that marks its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDirectoryEntry {
    pub role_id: RoleId,
    pub display_name: String,
    pub is_recruiting: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("unable to read group directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("group directory is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("group directory role id '{0}' is not numeric")]
    InvalidRoleId(String),
}

/// Read-only role → group lookup table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct GroupDirectory {
    entries: Vec<GroupDirectoryEntry>,
}

impl GroupDirectory {
    pub fn new(entries: Vec<GroupDirectoryEntry>) -> Self {
        Self { entries }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DirectoryError> {
        let raw: RawDirectory = serde_json::from_reader(reader)?;
        let mut entries = Vec::with_capacity(raw.squadron_roles.len());
        for (role, entry) in raw.squadron_roles {
            let role_id = role
                .parse::<RoleId>()
                .map_err(|_| DirectoryError::InvalidRoleId(role.clone()))?;
            let (display_name, is_recruiting) = match entry {
                RawEntry::Detailed { name, recruiting } => (name, recruiting),
                RawEntry::Name(name) => (name, false),
            };
            entries.push(GroupDirectoryEntry {
                role_id,
                display_name,
                is_recruiting,
            });
        }
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let file = File::open(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn entries(&self) -> &[GroupDirectoryEntry] {
        &self.entries
    }

    pub fn recruiting(&self) -> impl Iterator<Item = &GroupDirectoryEntry> {
        self.entries.iter().filter(|entry| entry.is_recruiting)
    }

    pub fn recruiting_names(&self) -> Vec<String> {
        self.recruiting()
            .map(|entry| entry.display_name.clone())
            .collect()
    }

    pub fn resolve_name(&self, name: &str) -> Option<&GroupDirectoryEntry> {
        self.entries
            .iter()
            .find(|entry| entry.display_name == name.trim())
    }

    pub fn entry_for_role(&self, role: RoleId) -> Option<&GroupDirectoryEntry> {
        self.entries.iter().find(|entry| entry.role_id == role)
    }

    /// First directory group among the member's roles, in the member's role order.
    pub fn group_for_member(&self, member: &Member) -> Option<&GroupDirectoryEntry> {
        member
            .roles
            .iter()
            .find_map(|role| self.entry_for_role(*role))
    }
}

#[derive(Debug, Deserialize)]
struct RawDirectory {
    #[serde(deserialize_with = "entries_in_file_order")]
    squadron_roles: Vec<(String, RawEntry)>,
}

/// Keeps `squadron_roles` in the order the file lists them; that order is the order
/// groups are offered to applicants.
fn entries_in_file_order<'de, D>(deserializer: D) -> Result<Vec<(String, RawEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedEntries;

    impl<'de> Visitor<'de> for OrderedEntries {
        type Value = Vec<(String, RawEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of role ids to group entries")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());
            while let Some((role, entry)) = map.next_entry::<String, RawEntry>()? {
                entries.push((role, entry));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedEntries)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Detailed {
        name: String,
        #[serde(default)]
        recruiting: bool,
    },
    Name(String),
}

/// Nickname tags identifying a group's commanding and executive officers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadershipMarkers {
    pub commanding_officer: String,
    pub executive_officer: String,
}

impl Default for LeadershipMarkers {
    fn default() -> Self {
        Self {
            commanding_officer: "[HVY]CO".to_string(),
            executive_officer: "[HVY]XO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Leadership {
    pub commanding_officer: Option<UserId>,
    pub executive_officer: Option<UserId>,
}

impl Leadership {
    pub fn co_mention(&self) -> String {
        self.commanding_officer
            .map(|id| id.mention())
            .unwrap_or_else(|| "the CO".to_string())
    }

    pub fn xo_mention(&self) -> String {
        self.executive_officer
            .map(|id| id.mention())
            .unwrap_or_else(|| "the XO".to_string())
    }
}

/// Scans the roster for members of `group_role` whose nickname carries a leadership tag.
/// A member is counted for at most one post. A later tagged member replaces an earlier one
/// for the same post, and the scan stops as soon as both posts are filled.
pub fn leadership_for(group_role: RoleId, members: &[Member], markers: &LeadershipMarkers) -> Leadership {
    let mut leadership = Leadership::default();

    for member in members.iter().filter(|member| member.has_role(group_role)) {
        let Some(nickname) = member.nickname.as_deref() else {
            continue;
        };

        if nickname.contains(&markers.commanding_officer) {
            leadership.commanding_officer = Some(member.id);
        } else if nickname.contains(&markers.executive_officer) {
            leadership.executive_officer = Some(member.id);
        }

        if leadership.commanding_officer.is_some() && leadership.executive_officer.is_some() {
            break;
        }
    }

    leadership
}
