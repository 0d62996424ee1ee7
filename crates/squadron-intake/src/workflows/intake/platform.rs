//! Outbound boundary to the chat platform.
//!
//! The core only decides *what* to send and *when*; delivery, widget rendering and rate
//! limiting belong to whichever adapter implements [`Platform`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ChannelId, GuildId, RoleId, UserId};

/// Opaque handle back to the interaction (slash command or component) that triggered a flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Success,
    Danger,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    Select {
        custom_id: String,
        placeholder: String,
        options: Vec<SelectOption>,
    },
    Button {
        custom_id: String,
        label: String,
        style: ButtonStyle,
    },
}

impl Component {
    pub fn button(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Component::Button {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
        }
    }

    pub fn custom_id(&self) -> &str {
        match self {
            Component::Select { custom_id, .. } | Component::Button { custom_id, .. } => custom_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn same(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Message payload handed to the platform adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform transport failed: {0}")]
    Transport(String),
    #[error("platform resource not found: {0}")]
    NotFound(String),
    #[error("platform refused the request: {0}")]
    Forbidden(String),
}

/// Commands the core issues against the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Sends a direct message and returns the private channel it was delivered on.
    async fn send_direct_message(
        &self,
        user: UserId,
        message: OutboundMessage,
    ) -> Result<ChannelId, PlatformError>;

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> Result<(), PlatformError>;

    /// Ephemeral reply visible only to the actor behind `token`.
    async fn respond(
        &self,
        token: &InteractionToken,
        message: OutboundMessage,
    ) -> Result<(), PlatformError>;

    async fn set_member_nickname(
        &self,
        guild: GuildId,
        member: UserId,
        nickname: &str,
    ) -> Result<(), PlatformError>;

    async fn grant_member_roles(
        &self,
        guild: GuildId,
        member: UserId,
        roles: &[RoleId],
    ) -> Result<(), PlatformError>;

    async fn fetch_guild_members(&self, guild: GuildId) -> Result<Vec<Member>, PlatformError>;

    async fn fetch_member(&self, guild: GuildId, member: UserId) -> Result<Member, PlatformError>;
}
