//! Gateway protocol types shared between tutorbot and its chat gateways.
//!
//! Gateways translate a concrete chat platform into two things:
//!
//! - **Events** (Gateway → tutorbot): inbound messages and button presses
//! - **Transport** (tutorbot → Gateway): the [`ChatTransport`] capability surface
//!   used to send, edit and moderate messages
//!
//! # Example: Forwarding Events
//!
//! ```ignore
//! use tutorbot_gateway_protocol::{GatewayEvent, InboundMessage};
//!
//! let event = GatewayEvent::MessageReceived(Box::new(message));
//! event_tx.send(event).await?;
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// Platform user id.
    UserId
);
snowflake!(
    /// Text channel or direct-message channel id.
    ChannelId
);
snowflake!(
    /// Message id, unique within its channel.
    MessageId
);
snowflake!(
    /// Guild role id.
    RoleId
);
snowflake!(
    /// Guild (community) id.
    GuildId
);

// ============================================================================
// Identities
// ============================================================================

/// The author of a message or the presser of a button, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    /// Account name (unique handle).
    pub username: String,
    /// Global display name, if the user set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

/// A user resolved as a member of the bot's guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub username: String,
    /// Guild nickname, falling back to the global display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl Member {
    /// Name shown in the guild: nickname if present, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }

    /// Participant string used in rosters and survey records: `"Display (username)"`.
    pub fn participant_tag(&self) -> String {
        format!("{} ({})", self.display_name(), self.username)
    }
}

// ============================================================================
// Guild directory
// ============================================================================

/// The guild the bot serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    /// Approximate, as reported by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    /// Platform channel type, e.g. `"text"` or `"voice"`.
    pub kind: String,
    pub position: u16,
    /// Category the channel is filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub position: u16,
    #[serde(default)]
    pub mentionable: bool,
}

// ============================================================================
// Events (Gateway → tutorbot)
// ============================================================================

/// Events sent from a gateway to tutorbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway connected and knows its own identity.
    Ready { bot_user_id: UserId },

    /// Incoming message in a guild channel or a direct-message channel.
    MessageReceived(Box<InboundMessage>),

    /// A button attached to one of the bot's messages was pressed.
    ButtonPressed(Box<ButtonPress>),

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

/// Incoming chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub author: Sender,
    pub content: String,
    /// True when the message was sent in a direct-message channel.
    #[serde(default)]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Button press on a message previously sent through the transport.
///
/// Gateways acknowledge the interaction before forwarding it, so the
/// platform never shows a failed interaction even when tutorbot ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonPress {
    pub interaction_id: String,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user: Sender,
    /// The `custom_id` of the pressed button.
    pub custom_id: String,
}

// ============================================================================
// Outbound messages
// ============================================================================

/// Visual style of a button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

/// An interactive button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub custom_id: String,
    #[serde(default)]
    pub style: ButtonStyle,
    #[serde(default)]
    pub disabled: bool,
}

impl Button {
    pub fn new(label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            custom_id: custom_id.into(),
            style: ButtonStyle::Primary,
            disabled: false,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }
}

/// A titled block rendered under the message text (an embed on Discord).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub fields: Vec<CardField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Message to send or to replace an existing message with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    /// Rows of buttons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_card(mut self, card: Card) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_button_row(mut self, row: Vec<Button>) -> Self {
        self.buttons.push(row);
        self
    }

    /// Copy of this message with every button disabled.
    pub fn disabled(&self) -> Self {
        let mut copy = self.clone();
        for button in copy.buttons.iter_mut().flatten() {
            button.disabled = true;
        }
        copy
    }
}

impl From<&str> for OutboundMessage {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<String> for OutboundMessage {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

/// Location of a message sent through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

// ============================================================================
// Transport
// ============================================================================

/// Errors reported by a chat transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u64 },

    #[error("missing permission: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl TransportError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn platform(message: impl fmt::Display) -> Self {
        Self::Platform(message.to_string())
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<ChannelId> for u64 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl From<RoleId> for u64 {
    fn from(id: RoleId) -> Self {
        id.0
    }
}

/// Convenience type alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;

/// Capability surface of a live chat connection.
///
/// Implementations are shared behind an `Arc` and called from the engine's
/// event loop only.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message to a guild or direct-message channel.
    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef>;

    /// Open (or reuse) the private channel to `user` and send a message there.
    async fn send_direct(&self, user: UserId, message: OutboundMessage)
    -> TransportResult<MessageRef>;

    /// Replace the content, card and buttons of a message.
    async fn edit_message(&self, target: MessageRef, message: OutboundMessage)
    -> TransportResult<()>;

    /// Resolve a user as a member of the bot's guild. `Ok(None)` if not a member.
    async fn resolve_member(&self, user: UserId) -> TransportResult<Option<Member>>;

    /// Resolve a user id to an account, member of the guild or not.
    async fn resolve_user(&self, user: UserId) -> TransportResult<Sender>;

    /// Give a guild role to a member.
    async fn add_role(&self, user: UserId, role: RoleId) -> TransportResult<()>;

    /// Delete up to `limit` of the most recent messages in a channel.
    ///
    /// Returns the number of messages deleted.
    async fn purge_messages(&self, channel: ChannelId, limit: u8) -> TransportResult<usize>;

    /// Describe the guild the bot serves.
    async fn guild_info(&self) -> TransportResult<GuildInfo>;

    /// Channels of the guild, ordered by position.
    async fn list_channels(&self) -> TransportResult<Vec<ChannelInfo>>;

    /// Roles of the guild except the implicit everyone role, ordered by position.
    async fn list_roles(&self) -> TransportResult<Vec<RoleInfo>>;

    /// Human members of the guild; bot accounts are left out.
    async fn list_members(&self) -> TransportResult<Vec<Member>>;
}
