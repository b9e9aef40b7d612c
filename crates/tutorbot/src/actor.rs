//! Synthetic actor: a stand-in for a privileged human operator.
//!
//! Engine commands are written against "the user who issued the command".
//! When a command arrives through the controller there is no such user, so
//! the controller builds a [`SyntheticActor`] that carries the operator's
//! roles and, optionally, a real user to forward replies to.

use tracing::{debug, error};
use tutorbot_gateway_protocol::{ChatTransport, OutboundMessage, UserId};

use crate::config::AccessRole;
use crate::error::{EngineError, EngineResult};

/// Identity and roles a synthetic actor is built from.
#[derive(Debug, Clone)]
pub struct ActorIdentity {
    pub user_id: UserId,
    pub name: String,
    pub roles: Vec<AccessRole>,
}

impl ActorIdentity {
    /// True if one of the roles is named `admin_role` (case-insensitive).
    pub fn has_role(&self, admin_role: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(admin_role))
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticActor {
    identity: ActorIdentity,
    privileged: bool,
    redirect: Option<UserId>,
}

impl SyntheticActor {
    /// Build an actor; it is privileged when `identity` carries `admin_role`.
    pub fn new(identity: ActorIdentity, admin_role: &str, redirect: Option<UserId>) -> Self {
        let privileged = identity.has_role(admin_role);
        Self {
            identity,
            privileged,
            redirect,
        }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub fn redirect(&self) -> Option<UserId> {
        self.redirect
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Fail with [`EngineError::PermissionDenied`] unless privileged.
    pub fn ensure_privileged(&self) -> EngineResult<()> {
        if self.privileged {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied)
        }
    }

    /// Reply to the actor.
    ///
    /// Delivered privately to the redirect target if there is one; dropped
    /// otherwise. Lookup and delivery failures are logged, never returned.
    pub async fn respond(&self, transport: &dyn ChatTransport, message: impl Into<OutboundMessage>) {
        let Some(target) = self.redirect else {
            debug!(actor = %self.identity.name, "No redirect target, reply dropped");
            return;
        };

        let user = match transport.resolve_user(target).await {
            Ok(user) => user,
            Err(e) => {
                error!(target = %target, error = %e, "Failed to resolve redirect target");
                return;
            }
        };

        if let Err(e) = transport.send_direct(user.id, message.into()).await {
            error!(target = %target, error = %e, "Failed to deliver reply to redirect target");
        }
    }

    /// Alias of [`SyntheticActor::respond`] for follow-up messages.
    pub async fn send(&self, transport: &dyn ChatTransport, message: impl Into<OutboundMessage>) {
        self.respond(transport, message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tutorbot_gateway_protocol::{
        ChannelId, ChannelInfo, GuildInfo, Member, MessageId, MessageRef, RoleId, RoleInfo,
        Sender, TransportError, TransportResult,
    };

    use super::*;

    /// Records direct messages; user lookups fail when `known` is false.
    #[derive(Default)]
    struct Recorder {
        known: bool,
        direct: Mutex<Vec<(UserId, String)>>,
    }

    impl Recorder {
        fn knowing_users() -> Self {
            Self {
                known: true,
                ..Self::default()
            }
        }

        fn direct(&self) -> Vec<(UserId, String)> {
            self.direct.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for Recorder {
        async fn send_message(
            &self,
            _channel: ChannelId,
            _message: OutboundMessage,
        ) -> TransportResult<MessageRef> {
            unreachable!("actors only reply privately")
        }

        async fn send_direct(
            &self,
            user: UserId,
            message: OutboundMessage,
        ) -> TransportResult<MessageRef> {
            self.direct.lock().unwrap().push((user, message.content));
            Ok(MessageRef {
                channel_id: ChannelId(user.get()),
                message_id: MessageId(1),
            })
        }

        async fn edit_message(
            &self,
            _target: MessageRef,
            _message: OutboundMessage,
        ) -> TransportResult<()> {
            Ok(())
        }

        async fn resolve_member(&self, _user: UserId) -> TransportResult<Option<Member>> {
            Ok(None)
        }

        async fn resolve_user(&self, user: UserId) -> TransportResult<Sender> {
            if !self.known {
                return Err(TransportError::not_found("user", user));
            }
            Ok(Sender {
                id: user,
                username: format!("user{user}"),
                display_name: None,
                bot: false,
            })
        }

        async fn add_role(&self, _user: UserId, _role: RoleId) -> TransportResult<()> {
            Ok(())
        }

        async fn purge_messages(&self, _channel: ChannelId, _limit: u8) -> TransportResult<usize> {
            Ok(0)
        }

        async fn guild_info(&self) -> TransportResult<GuildInfo> {
            Err(TransportError::platform("no guild"))
        }

        async fn list_channels(&self) -> TransportResult<Vec<ChannelInfo>> {
            Ok(Vec::new())
        }

        async fn list_roles(&self) -> TransportResult<Vec<RoleInfo>> {
            Ok(Vec::new())
        }

        async fn list_members(&self) -> TransportResult<Vec<Member>> {
            Ok(Vec::new())
        }
    }

    fn identity(roles: &[&str]) -> ActorIdentity {
        ActorIdentity {
            user_id: UserId(1),
            name: "tutorbot".to_string(),
            roles: roles
                .iter()
                .enumerate()
                .map(|(i, name)| AccessRole {
                    id: i as u64,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn privileged_only_with_admin_role() {
        let admin = SyntheticActor::new(identity(&["Member", "admin"]), "Admin", None);
        assert!(admin.is_privileged());
        assert!(admin.ensure_privileged().is_ok());

        let member = SyntheticActor::new(identity(&["Member"]), "Admin", Some(UserId(5)));
        assert!(!member.is_privileged());
        assert!(matches!(
            member.ensure_privileged(),
            Err(EngineError::PermissionDenied)
        ));
        assert_eq!(member.redirect(), Some(UserId(5)));
    }

    #[tokio::test]
    async fn replies_go_to_the_redirect_target() {
        let transport = Recorder::knowing_users();
        let actor = SyntheticActor::new(identity(&["Admin"]), "Admin", Some(UserId(42)));

        actor.respond(&transport, "started").await;
        actor.send(&transport, "saved").await;

        assert_eq!(
            transport.direct(),
            vec![
                (UserId(42), "started".to_string()),
                (UserId(42), "saved".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn without_redirect_nothing_is_sent() {
        let transport = Recorder::knowing_users();
        let actor = SyntheticActor::new(identity(&["Admin"]), "Admin", None);

        actor.respond(&transport, "started").await;
        actor.send(&transport, "saved").await;

        assert!(transport.direct().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_target_is_swallowed() {
        let transport = Recorder::default();
        let actor = SyntheticActor::new(identity(&["Admin"]), "Admin", Some(UserId(42)));

        actor.respond(&transport, "started").await;
        actor.send(&transport, "saved").await;

        assert!(transport.direct().is_empty());
    }
}
