use tracing::info;
use tutorbot_gateway_protocol::{ChannelId, RoleId, UserId};

use super::Engine;
use crate::actor::SyntheticActor;
use crate::error::{EngineError, EngineResult};

/// Reply used when a greeting has no text.
pub const DEFAULT_GREETING: &str = "Hello there!";

/// Largest number of messages one clear may delete.
pub const MAX_CLEAR: u8 = 100;

impl Engine {
    /// Have the actor say `message`.
    pub async fn greet(&mut self, actor: &SyntheticActor, message: Option<&str>) -> EngineResult<()> {
        actor.ensure_privileged()?;
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_GREETING);
        actor.respond(self.transport.as_ref(), message).await;
        Ok(())
    }

    /// Give `role` to guild member `user`.
    pub async fn give_role(
        &mut self,
        actor: &SyntheticActor,
        user: UserId,
        role: RoleId,
    ) -> EngineResult<String> {
        actor.ensure_privileged()?;

        let member = self
            .transport
            .resolve_member(user)
            .await?
            .ok_or_else(|| EngineError::InvalidArgument(format!("user {user} is not a member")))?;

        if let Err(e) = self.transport.add_role(user, role).await {
            actor
                .respond(self.transport.as_ref(), format!("Failed to give role: {e}"))
                .await;
            return Err(e.into());
        }

        let role_name = self
            .roles
            .iter()
            .find(|r| r.id == role.get())
            .map(|r| r.name.clone())
            .unwrap_or_else(|| role.to_string());
        let reply = format!(
            "Successfully gave {role_name} to {}.",
            member.display_name()
        );
        info!(user = %user, role = %role, "Role given");
        actor.respond(self.transport.as_ref(), reply.as_str()).await;
        Ok(reply)
    }

    /// Delete the `limit` most recent messages of a channel.
    pub async fn clear_messages(
        &mut self,
        actor: &SyntheticActor,
        channel: ChannelId,
        limit: u8,
    ) -> EngineResult<usize> {
        actor.ensure_privileged()?;
        if !(1..=MAX_CLEAR).contains(&limit) {
            return Err(EngineError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_CLEAR}, got {limit}"
            )));
        }

        let deleted = self.transport.purge_messages(channel, limit).await?;
        info!(channel = %channel, deleted, "Messages cleared");
        actor
            .respond(
                self.transport.as_ref(),
                format!("Deleted {deleted} messages in channel {channel}."),
            )
            .await;
        Ok(deleted)
    }
}
