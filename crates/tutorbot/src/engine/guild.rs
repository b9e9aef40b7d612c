use tracing::{info, warn};
use tutorbot_gateway_protocol::{ChannelInfo, GuildInfo, Member, RoleInfo};

use super::Engine;
use crate::actor::SyntheticActor;
use crate::config::AccessRole;
use crate::error::EngineResult;

impl Engine {
    pub async fn guild_info(&self, actor: &SyntheticActor) -> EngineResult<GuildInfo> {
        actor.ensure_privileged()?;
        Ok(self.transport.guild_info().await?)
    }

    pub async fn channels(&self, actor: &SyntheticActor) -> EngineResult<Vec<ChannelInfo>> {
        actor.ensure_privileged()?;
        Ok(self.transport.list_channels().await?)
    }

    pub async fn roles(&self, actor: &SyntheticActor) -> EngineResult<Vec<RoleInfo>> {
        actor.ensure_privileged()?;
        Ok(self.transport.list_roles().await?)
    }

    pub async fn members(&self, actor: &SyntheticActor) -> EngineResult<Vec<Member>> {
        actor.ensure_privileged()?;
        Ok(self.transport.list_members().await?)
    }

    /// Roles used to name roles in replies.
    pub fn known_roles(&self) -> &[AccessRole] {
        &self.roles
    }

    /// Replace the known roles with the guild's own.
    ///
    /// Runs when the gateway becomes ready. On failure the configured roles
    /// stay in place.
    pub(super) async fn refresh_roles(&mut self) {
        match self.transport.list_roles().await {
            Ok(roles) if !roles.is_empty() => {
                self.roles = roles
                    .into_iter()
                    .map(|r| AccessRole {
                        id: r.id.get(),
                        name: r.name,
                    })
                    .collect();
                info!(roles = self.roles.len(), "Known roles refreshed from guild");
            }
            Ok(_) => warn!("Guild reported no roles, keeping configured roles"),
            Err(e) => warn!(error = %e, "Failed to fetch guild roles, keeping configured roles"),
        }
    }
}
