//! Discord gateway for tutorbot using serenity.
//!
//! [`DiscordGateway`] connects a bot account, forwards messages and button
//! presses as [`GatewayEvent`]s, and hands out a [`DiscordTransport`] that
//! implements [`ChatTransport`] over Discord's HTTP API.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::all::{
    ButtonStyle, ChannelId, ComponentInteraction, CreateActionRow, CreateButton, CreateEmbed,
    CreateInteractionResponse, CreateMessage, EditMessage, GatewayIntents, GetMessages, GuildId,
    Interaction, MessageId, RoleId, ShardManager, UserId,
};
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tutorbot_gateway_protocol as proto;
use tutorbot_gateway_protocol::{
    ButtonPress, ChatTransport, GatewayEvent, InboundMessage, MessageRef, OutboundMessage,
    TransportError, TransportResult,
};

/// Discord message character limit.
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Discord embed field value limit.
const MAX_FIELD_LENGTH: usize = 1024;

/// Largest page the member list endpoint returns.
const MEMBER_PAGE: u64 = 1000;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Guild the bot serves. The first guild reported on connect when unset.
    pub guild_id: Option<u64>,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            guild_id: None,
        }
    }

    pub fn with_guild(mut self, guild_id: Option<u64>) -> Self {
        self.guild_id = guild_id;
        self
    }
}

// ============================================================================
// Discord Gateway
// ============================================================================

/// A connected (not yet started) Discord client.
pub struct DiscordGateway {
    client: Client,
    transport: Arc<DiscordTransport>,
    event_tx: mpsc::Sender<GatewayEvent>,
}

impl DiscordGateway {
    /// Build the client. Events are forwarded to `event_tx` once [`Self::run`] starts.
    pub async fn connect(
        config: DiscordConfig,
        event_tx: mpsc::Sender<GatewayEvent>,
    ) -> Result<Self, serenity::Error> {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let guild = Arc::new(OnceLock::new());
        if let Some(id) = config.guild_id {
            let _ = guild.set(GuildId::new(id));
        }

        let handler = Handler {
            event_tx: event_tx.clone(),
            guild: Arc::clone(&guild),
        };

        let client = Client::builder(&config.bot_token, intents)
            .event_handler(handler)
            .await?;

        let transport = Arc::new(DiscordTransport {
            http: Arc::clone(&client.http),
            guild,
        });

        Ok(Self {
            client,
            transport,
            event_tx,
        })
    }

    pub fn transport(&self) -> Arc<DiscordTransport> {
        Arc::clone(&self.transport)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.client.shard_manager))
    }

    /// Run the client until it is shut down or fails.
    pub async fn run(mut self) {
        info!("Discord gateway started");

        let reason = match self.client.start().await {
            Ok(()) => "client stopped".to_string(),
            Err(e) => {
                error!(error = %e, "Discord client error");
                e.to_string()
            }
        };

        let _ = self.event_tx.send(GatewayEvent::Shutdown { reason }).await;
        info!("Discord gateway stopped");
    }
}

/// Stops a running [`DiscordGateway`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<ShardManager>);

impl ShutdownHandle {
    pub async fn shutdown(&self) {
        self.0.shutdown_all().await;
    }
}

// ============================================================================
// Event Handler
// ============================================================================

struct Handler {
    event_tx: mpsc::Sender<GatewayEvent>,
    guild: Arc<OnceLock<GuildId>>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        // Skip bot messages to avoid loops
        if msg.author.bot {
            return;
        }

        let event = GatewayEvent::MessageReceived(Box::new(InboundMessage {
            message_id: proto::MessageId(msg.id.get()),
            channel_id: proto::ChannelId(msg.channel_id.get()),
            author: sender_of(&msg.author),
            content: msg.content.clone(),
            direct: msg.guild_id.is_none(),
            timestamp: {
                let ts = msg.timestamp;
                chrono::DateTime::from_timestamp(ts.unix_timestamp(), ts.nanosecond())
            },
        }));

        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "Failed to send message event");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };

        handle_component_interaction(&ctx, &component, &self.event_tx).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        if self.guild.get().is_none()
            && let Some(first) = ready.guilds.first()
        {
            let _ = self.guild.set(first.id);
        }
        info!(
            user = %ready.user.name,
            user_id = %ready.user.id,
            guild = ?self.guild.get(),
            "Discord bot connected"
        );

        let event = GatewayEvent::Ready {
            bot_user_id: proto::UserId(ready.user.id.get()),
        };
        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "Failed to send ready event");
        }
    }
}

async fn handle_component_interaction(
    ctx: &Context,
    component: &ComponentInteraction,
    event_tx: &mpsc::Sender<GatewayEvent>,
) {
    // Acknowledge immediately; Discord requires a response within 3 seconds
    let ack = CreateInteractionResponse::Acknowledge;
    if let Err(e) = component.create_response(&ctx.http, ack).await {
        warn!(error = %e, "Failed to acknowledge interaction");
        return;
    }

    let event = GatewayEvent::ButtonPressed(Box::new(ButtonPress {
        interaction_id: component.id.to_string(),
        channel_id: proto::ChannelId(component.channel_id.get()),
        message_id: proto::MessageId(component.message.id.get()),
        user: sender_of(&component.user),
        custom_id: component.data.custom_id.clone(),
    }));

    if let Err(e) = event_tx.send(event).await {
        warn!(error = %e, "Failed to send button event");
    }
}

fn sender_of(user: &serenity::model::user::User) -> proto::Sender {
    proto::Sender {
        id: proto::UserId(user.id.get()),
        username: user.name.clone(),
        display_name: user.global_name.clone(),
        bot: user.bot,
    }
}

// ============================================================================
// Transport
// ============================================================================

/// [`ChatTransport`] over Discord's HTTP API.
pub struct DiscordTransport {
    http: Arc<Http>,
    guild: Arc<OnceLock<GuildId>>,
}

impl DiscordTransport {
    fn guild(&self) -> TransportResult<GuildId> {
        self.guild
            .get()
            .copied()
            .ok_or_else(|| TransportError::platform("bot is not connected to a guild yet"))
    }

    async fn send_to(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef> {
        let chunks = chunk_message(&message.content);
        let last_idx = chunks.len() - 1;
        let mut last = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut builder = CreateMessage::new().content(*chunk);

            // Card and buttons go on the last chunk only
            if i == last_idx {
                if let Some(card) = &message.card {
                    builder = builder.embed(convert_card(card));
                }
                builder = builder.components(convert_buttons(&message.buttons));
            }

            let sent = channel
                .send_message(&self.http, builder)
                .await
                .map_err(|e| map_error(e, "channel", channel.get()))?;
            last = Some(sent.id);
        }

        let message_id = last.ok_or_else(|| TransportError::platform("nothing was sent"))?;
        Ok(MessageRef {
            channel_id: proto::ChannelId(channel.get()),
            message_id: proto::MessageId(message_id.get()),
        })
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn send_message(
        &self,
        channel: proto::ChannelId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef> {
        self.send_to(ChannelId::new(channel.get()), message).await
    }

    async fn send_direct(
        &self,
        user: proto::UserId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef> {
        let dm = UserId::new(user.get())
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| map_error(e, "user", user.get()))?;
        self.send_to(dm.id, message).await
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: OutboundMessage,
    ) -> TransportResult<()> {
        let builder = EditMessage::new()
            .content(&message.content)
            .embeds(message.card.iter().map(convert_card).collect())
            .components(convert_buttons(&message.buttons));

        ChannelId::new(target.channel_id.get())
            .edit_message(&self.http, MessageId::new(target.message_id.get()), builder)
            .await
            .map_err(|e| map_error(e, "message", target.message_id.get()))?;
        Ok(())
    }

    async fn resolve_member(&self, user: proto::UserId) -> TransportResult<Option<proto::Member>> {
        let guild = self.guild()?;
        match guild.member(&self.http, UserId::new(user.get())).await {
            Ok(member) => Ok(Some(member_of(&member))),
            Err(e) => match map_error(e, "member", user.get()) {
                TransportError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn resolve_user(&self, user: proto::UserId) -> TransportResult<proto::Sender> {
        let resolved = UserId::new(user.get())
            .to_user(&self.http)
            .await
            .map_err(|e| map_error(e, "user", user.get()))?;
        Ok(sender_of(&resolved))
    }

    async fn add_role(&self, user: proto::UserId, role: proto::RoleId) -> TransportResult<()> {
        let guild = self.guild()?;
        self.http
            .add_member_role(
                guild,
                UserId::new(user.get()),
                RoleId::new(role.get()),
                Some("requested by tutorbot"),
            )
            .await
            .map_err(|e| map_error(e, "member", user.get()))
    }

    async fn purge_messages(&self, channel: proto::ChannelId, limit: u8) -> TransportResult<usize> {
        let channel_id = ChannelId::new(channel.get());
        let messages = channel_id
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(|e| map_error(e, "channel", channel.get()))?;

        match messages.as_slice() {
            [] => {}
            // Bulk delete needs at least two messages
            [only] => channel_id
                .delete_message(&self.http, only.id)
                .await
                .map_err(|e| map_error(e, "message", only.id.get()))?,
            many => channel_id
                .delete_messages(&self.http, many.iter().map(|m| m.id).collect::<Vec<_>>())
                .await
                .map_err(|e| map_error(e, "channel", channel.get()))?,
        }

        debug!(channel = %channel, deleted = messages.len(), "Purged messages");
        Ok(messages.len())
    }

    async fn guild_info(&self) -> TransportResult<proto::GuildInfo> {
        let guild = self.guild()?;
        let partial = guild
            .to_partial_guild_with_counts(&self.http)
            .await
            .map_err(|e| map_error(e, "guild", guild.get()))?;
        Ok(proto::GuildInfo {
            id: proto::GuildId(partial.id.get()),
            name: partial.name,
            member_count: partial.approximate_member_count,
            description: partial.description,
            owner_id: Some(proto::UserId(partial.owner_id.get())),
        })
    }

    async fn list_channels(&self) -> TransportResult<Vec<proto::ChannelInfo>> {
        let guild = self.guild()?;
        let channels = guild
            .channels(&self.http)
            .await
            .map_err(|e| map_error(e, "guild", guild.get()))?;

        let mut listed: Vec<proto::ChannelInfo> = channels
            .into_values()
            .map(|channel| proto::ChannelInfo {
                id: proto::ChannelId(channel.id.get()),
                name: channel.name,
                kind: channel.kind.name().to_string(),
                position: channel.position,
                category_id: channel.parent_id.map(|p| proto::ChannelId(p.get())),
                topic: channel.topic,
            })
            .collect();
        listed.sort_by_key(|c| (c.position, c.id));
        Ok(listed)
    }

    async fn list_roles(&self) -> TransportResult<Vec<proto::RoleInfo>> {
        let guild = self.guild()?;
        let roles = guild
            .roles(&self.http)
            .await
            .map_err(|e| map_error(e, "guild", guild.get()))?;

        // The everyone role shares the guild's id
        let mut listed: Vec<proto::RoleInfo> = roles
            .into_values()
            .filter(|role| role.id.get() != guild.get())
            .map(|role| proto::RoleInfo {
                id: proto::RoleId(role.id.get()),
                name: role.name,
                position: role.position,
                mentionable: role.mentionable,
            })
            .collect();
        listed.sort_by_key(|r| (r.position, r.id));
        Ok(listed)
    }

    async fn list_members(&self) -> TransportResult<Vec<proto::Member>> {
        let guild = self.guild()?;
        let mut listed = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = guild
                .members(&self.http, Some(MEMBER_PAGE), after)
                .await
                .map_err(|e| map_error(e, "guild", guild.get()))?;
            let full = page.len() as u64 == MEMBER_PAGE;
            after = page.last().map(|m| m.user.id);
            listed.extend(page.iter().filter(|m| !m.user.bot).map(member_of));
            if !full || after.is_none() {
                break;
            }
        }

        debug!(guild = %guild, members = listed.len(), "Listed members");
        Ok(listed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn map_error(error: serenity::Error, entity: &'static str, id: u64) -> TransportError {
    if let serenity::Error::Http(http) = &error
        && let Some(status) = http.status_code()
    {
        return match status.as_u16() {
            404 => TransportError::not_found(entity, id),
            401 | 403 => TransportError::Forbidden(error.to_string()),
            400 => TransportError::InvalidRequest(error.to_string()),
            _ => TransportError::platform(&error),
        };
    }
    TransportError::platform(&error)
}

fn member_of(member: &serenity::model::guild::Member) -> proto::Member {
    proto::Member {
        id: proto::UserId(member.user.id.get()),
        username: member.user.name.clone(),
        nickname: member.nick.clone().or_else(|| member.user.global_name.clone()),
        roles: member.roles.iter().map(|r| proto::RoleId(r.get())).collect(),
    }
}

fn convert_card(card: &proto::Card) -> CreateEmbed {
    CreateEmbed::new().title(&card.title).fields(
        card.fields
            .iter()
            .map(|f| (f.name.clone(), truncate(&f.value, MAX_FIELD_LENGTH), f.inline)),
    )
}

fn convert_buttons(rows: &[Vec<proto::Button>]) -> Vec<CreateActionRow> {
    rows.iter()
        .map(|row| {
            let buttons: Vec<CreateButton> = row
                .iter()
                .map(|btn| {
                    CreateButton::new(&btn.custom_id)
                        .label(&btn.label)
                        .style(convert_style(btn.style))
                        .disabled(btn.disabled)
                })
                .collect();
            CreateActionRow::Buttons(buttons)
        })
        .collect()
}

fn convert_style(style: proto::ButtonStyle) -> ButtonStyle {
    match style {
        proto::ButtonStyle::Primary => ButtonStyle::Primary,
        proto::ButtonStyle::Secondary => ButtonStyle::Secondary,
        proto::ButtonStyle::Success => ButtonStyle::Success,
        proto::ButtonStyle::Danger => ButtonStyle::Danger,
    }
}

/// Cut `value` to at most `max` bytes on a char boundary, marking the cut.
fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max - '…'.len_utf8();
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &value[..end])
}

fn chunk_message(content: &str) -> Vec<&str> {
    if content.len() <= MAX_MESSAGE_LENGTH {
        return vec![content];
    }

    let mut chunks = Vec::new();
    let mut remaining = content;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LENGTH {
            chunks.push(remaining);
            break;
        }

        let mut boundary = MAX_MESSAGE_LENGTH;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        // Prefer splitting at a newline within the limit
        let split_at = remaining[..boundary].rfind('\n').unwrap_or(boundary);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}
