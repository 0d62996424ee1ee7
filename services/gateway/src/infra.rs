use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use squadron_intake::workflows::intake::{
    ChannelId, GuildId, InteractionToken, Member, OutboundMessage, Platform, PlatformError,
    RoleId, UserId,
};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, LockResult, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// One platform command waiting for the relay to deliver it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub(crate) enum OutboxCommand {
    DirectMessage {
        user: UserId,
        channel: ChannelId,
        message: OutboundMessage,
    },
    ChannelMessage {
        channel: ChannelId,
        message: OutboundMessage,
    },
    Respond {
        token: InteractionToken,
        message: OutboundMessage,
    },
    SetNickname {
        guild: GuildId,
        member: UserId,
        nickname: String,
    },
    GrantRoles {
        guild: GuildId,
        member: UserId,
        roles: Vec<RoleId>,
    },
}

/// Commands held for the relay before the oldest start being dropped.
pub(crate) const OUTBOX_CAPACITY: usize = 10_000;

/// Platform adapter that queues outbound commands for a relay process.
///
/// Member queries are answered from the snapshot the relay last pushed; nickname and role
/// changes are applied to that snapshot as they are queued. The queue holds at most
/// `capacity` commands; when a relay stops draining it, the oldest are discarded.
#[derive(Debug)]
pub(crate) struct OutboxPlatform {
    outbox: Mutex<VecDeque<OutboxCommand>>,
    members: Mutex<Vec<Member>>,
    capacity: usize,
}

impl Default for OutboxPlatform {
    fn default() -> Self {
        Self::with_capacity(OUTBOX_CAPACITY)
    }
}

impl OutboxPlatform {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            outbox: Mutex::new(VecDeque::new()),
            members: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn replace_members(&self, members: Vec<Member>) -> usize {
        let mut snapshot = recover(self.members.lock());
        *snapshot = members;
        snapshot.len()
    }

    pub(crate) fn drain(&self) -> Vec<OutboxCommand> {
        recover(self.outbox.lock()).drain(..).collect()
    }

    fn enqueue(&self, command: OutboxCommand) {
        debug!(?command, "platform command queued");
        let mut outbox = recover(self.outbox.lock());
        while outbox.len() >= self.capacity {
            if let Some(dropped) = outbox.pop_front() {
                warn!(?dropped, capacity = self.capacity, "outbox full, oldest command dropped");
            }
        }
        outbox.push_back(command);
    }

    fn update_member(&self, member: UserId, apply: impl FnOnce(&mut Member)) {
        let mut snapshot = recover(self.members.lock());
        if let Some(entry) = snapshot.iter_mut().find(|entry| entry.id == member) {
            apply(entry);
        }
    }
}

/// The guarded data stays consistent across a panic, so a poisoned lock is still usable.
fn recover<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Platform for OutboxPlatform {
    async fn send_direct_message(
        &self,
        user: UserId,
        message: OutboundMessage,
    ) -> Result<ChannelId, PlatformError> {
        let channel = ChannelId(user.0);
        self.enqueue(OutboxCommand::DirectMessage {
            user,
            channel,
            message,
        });
        Ok(channel)
    }

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> Result<(), PlatformError> {
        self.enqueue(OutboxCommand::ChannelMessage { channel, message });
        Ok(())
    }

    async fn respond(
        &self,
        token: &InteractionToken,
        message: OutboundMessage,
    ) -> Result<(), PlatformError> {
        self.enqueue(OutboxCommand::Respond {
            token: token.clone(),
            message,
        });
        Ok(())
    }

    async fn set_member_nickname(
        &self,
        guild: GuildId,
        member: UserId,
        nickname: &str,
    ) -> Result<(), PlatformError> {
        self.update_member(member, |entry| entry.nickname = Some(nickname.to_string()));
        self.enqueue(OutboxCommand::SetNickname {
            guild,
            member,
            nickname: nickname.to_string(),
        });
        Ok(())
    }

    async fn grant_member_roles(
        &self,
        guild: GuildId,
        member: UserId,
        roles: &[RoleId],
    ) -> Result<(), PlatformError> {
        self.update_member(member, |entry| {
            for role in roles {
                if !entry.roles.contains(role) {
                    entry.roles.push(*role);
                }
            }
        });
        self.enqueue(OutboxCommand::GrantRoles {
            guild,
            member,
            roles: roles.to_vec(),
        });
        Ok(())
    }

    async fn fetch_guild_members(&self, _guild: GuildId) -> Result<Vec<Member>, PlatformError> {
        Ok(recover(self.members.lock()).clone())
    }

    async fn fetch_member(&self, _guild: GuildId, member: UserId) -> Result<Member, PlatformError> {
        recover(self.members.lock())
            .iter()
            .find(|entry| entry.id == member)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("member {member} is not in the snapshot")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, roles: &[u64]) -> Member {
        Member {
            id: UserId(id),
            username: format!("user{id}"),
            nickname: None,
            roles: roles.iter().copied().map(RoleId).collect(),
            joined_at: None,
        }
    }

    #[tokio::test]
    async fn direct_messages_use_the_applicant_channel() {
        let platform = OutboxPlatform::default();

        let channel = platform
            .send_direct_message(UserId(7), OutboundMessage::text("hello"))
            .await
            .expect("queued");

        assert_eq!(channel, ChannelId(7));
        assert_eq!(
            platform.drain(),
            vec![OutboxCommand::DirectMessage {
                user: UserId(7),
                channel: ChannelId(7),
                message: OutboundMessage::text("hello"),
            }]
        );
        assert!(platform.drain().is_empty());
    }

    #[tokio::test]
    async fn member_updates_apply_to_the_snapshot() {
        let platform = OutboxPlatform::default();
        platform.replace_members(vec![member(7, &[51])]);

        platform
            .set_member_nickname(GuildId(1), UserId(7), "[HVY](R)Goose")
            .await
            .expect("queued");
        platform
            .grant_member_roles(GuildId(1), UserId(7), &[RoleId(51), RoleId(100)])
            .await
            .expect("queued");

        let updated = platform
            .fetch_member(GuildId(1), UserId(7))
            .await
            .expect("member present");
        assert_eq!(updated.nickname.as_deref(), Some("[HVY](R)Goose"));
        assert_eq!(updated.roles, vec![RoleId(51), RoleId(100)]);
        assert_eq!(platform.drain().len(), 2);
    }

    #[tokio::test]
    async fn full_outbox_drops_the_oldest_commands() {
        let platform = OutboxPlatform::with_capacity(2);

        for channel in [1, 2, 3] {
            platform
                .send_channel_message(ChannelId(channel), OutboundMessage::text("ping"))
                .await
                .expect("queued");
        }

        let channels: Vec<ChannelId> = platform
            .drain()
            .into_iter()
            .map(|command| match command {
                OutboxCommand::ChannelMessage { channel, .. } => channel,
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(channels, vec![ChannelId(2), ChannelId(3)]);
        assert!(platform.drain().is_empty());
    }

    #[tokio::test]
    async fn unknown_members_are_not_found() {
        let platform = OutboxPlatform::default();

        let result = platform.fetch_member(GuildId(1), UserId(99)).await;

        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }
}
