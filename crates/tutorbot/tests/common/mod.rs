//! Common test utilities.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tutorbot_gateway_protocol::{
    ButtonPress, ChannelId, ChannelInfo, ChatTransport, GatewayEvent, GuildId, GuildInfo,
    InboundMessage, Member, MessageId, MessageRef, OutboundMessage, RoleId, RoleInfo, Sender,
    TransportError, TransportResult, UserId,
};

use tutorbot::actor::{ActorIdentity, SyntheticActor};
use tutorbot::config::AccessRole;
use tutorbot::engine::{Engine, EngineConfig, TimerReceiver};
use tutorbot::store::{
    AppendOutcome, Record, RecordDir, RecordKey, RecordStore, StorageError, StorageResult, Table,
};

/// User that synthetic actors redirect their replies to.
pub const OPERATOR: UserId = UserId(900);

/// Channel surveys and forms are posted in.
pub const CHANNEL: ChannelId = ChannelId(500);

/// Guild the mock transport serves.
pub const GUILD: GuildId = GuildId(77);

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct Sent {
    pub channel: ChannelId,
    pub message: OutboundMessage,
    pub at: MessageRef,
}

#[derive(Debug, Clone)]
pub struct Direct {
    pub user: UserId,
    pub message: OutboundMessage,
    pub at: MessageRef,
}

/// Transport that records everything sent through it.
#[derive(Default)]
pub struct MockTransport {
    members: Mutex<HashMap<UserId, Member>>,
    sent: Mutex<Vec<Sent>>,
    direct: Mutex<Vec<Direct>>,
    edits: Mutex<Vec<(MessageRef, OutboundMessage)>>,
    roles: Mutex<Vec<(UserId, RoleId)>>,
    purges: Mutex<Vec<(ChannelId, u8)>>,
    guild_roles: Mutex<Vec<RoleInfo>>,
    channels: Mutex<Vec<ChannelInfo>>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
    fail_roles: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_member(&self, member: Member) {
        self.members.lock().unwrap().insert(member.id, member);
    }

    pub fn add_guild_role(&self, id: u64, name: &str) {
        let mut roles = self.guild_roles.lock().unwrap();
        let position = roles.len() as u16 + 1;
        roles.push(RoleInfo {
            id: RoleId(id),
            name: name.to_string(),
            position,
            mentionable: false,
        });
    }

    pub fn add_channel(&self, id: u64, name: &str) {
        let mut channels = self.channels.lock().unwrap();
        let position = channels.len() as u16;
        channels.push(ChannelInfo {
            id: ChannelId(id),
            name: name.to_string(),
            kind: "text".to_string(),
            position,
            category_id: None,
            topic: None,
        });
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_roles(&self, fail: bool) {
        self.fail_roles.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn direct(&self) -> Vec<Direct> {
        self.direct.lock().unwrap().clone()
    }

    /// Text of every direct message to `user`, oldest first.
    pub fn direct_texts(&self, user: UserId) -> Vec<String> {
        self.direct()
            .into_iter()
            .filter(|d| d.user == user)
            .map(|d| d.message.content)
            .collect()
    }

    /// Most recent direct message to `user` that carries buttons.
    pub fn last_prompt(&self, user: UserId) -> Option<Direct> {
        self.direct()
            .into_iter()
            .rev()
            .find(|d| d.user == user && !d.message.buttons.is_empty())
    }

    pub fn edits(&self) -> Vec<(MessageRef, OutboundMessage)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<(UserId, RoleId)> {
        self.roles.lock().unwrap().clone()
    }

    pub fn purges(&self) -> Vec<(ChannelId, u8)> {
        self.purges.lock().unwrap().clone()
    }

    fn next_ref(&self, channel: ChannelId) -> MessageRef {
        MessageRef {
            channel_id: channel,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }

    fn check_send(&self) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Forbidden("sending disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef> {
        self.check_send()?;
        let at = self.next_ref(channel);
        self.sent.lock().unwrap().push(Sent {
            channel,
            message,
            at,
        });
        Ok(at)
    }

    async fn send_direct(
        &self,
        user: UserId,
        message: OutboundMessage,
    ) -> TransportResult<MessageRef> {
        self.check_send()?;
        let at = self.next_ref(ChannelId(user.get() + 10_000));
        self.direct.lock().unwrap().push(Direct { user, message, at });
        Ok(at)
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: OutboundMessage,
    ) -> TransportResult<()> {
        self.edits.lock().unwrap().push((target, message));
        Ok(())
    }

    async fn resolve_member(&self, user: UserId) -> TransportResult<Option<Member>> {
        Ok(self.members.lock().unwrap().get(&user).cloned())
    }

    async fn resolve_user(&self, user: UserId) -> TransportResult<Sender> {
        let member = self.members.lock().unwrap().get(&user).cloned();
        Ok(match member {
            Some(m) => Sender {
                id: m.id,
                username: m.username,
                display_name: m.nickname,
                bot: false,
            },
            None => sender(user.get(), &format!("user{}", user.get())),
        })
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> TransportResult<()> {
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(TransportError::Forbidden("role is above the bot".to_string()));
        }
        self.roles.lock().unwrap().push((user, role));
        Ok(())
    }

    async fn purge_messages(&self, channel: ChannelId, limit: u8) -> TransportResult<usize> {
        self.purges.lock().unwrap().push((channel, limit));
        Ok(usize::from(limit).min(7))
    }

    async fn guild_info(&self) -> TransportResult<GuildInfo> {
        Ok(GuildInfo {
            id: GUILD,
            name: "Tutorium".to_string(),
            member_count: Some(self.members.lock().unwrap().len() as u64),
            description: None,
            owner_id: Some(OPERATOR),
        })
    }

    async fn list_channels(&self) -> TransportResult<Vec<ChannelInfo>> {
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn list_roles(&self) -> TransportResult<Vec<RoleInfo>> {
        Ok(self.guild_roles.lock().unwrap().clone())
    }

    async fn list_members(&self) -> TransportResult<Vec<Member>> {
        let mut members: Vec<Member> = self.members.lock().unwrap().values().cloned().collect();
        members.sort_by_key(|m| m.id);
        Ok(members)
    }
}

// ============================================================================
// Failing store
// ============================================================================

/// Store whose every operation fails.
pub struct BrokenStore;

fn disk_full() -> StorageError {
    StorageError::file_io(
        PathBuf::from("/broken"),
        std::io::Error::other("no space left on device"),
    )
}

#[async_trait]
impl RecordStore for BrokenStore {
    async fn write_table(&self, _key: &RecordKey, _table: &Table) -> StorageResult<PathBuf> {
        Err(disk_full())
    }

    async fn append_unique(
        &self,
        _key: &RecordKey,
        _record: &Record,
        _unique_column: &str,
    ) -> StorageResult<AppendOutcome> {
        Err(disk_full())
    }

    async fn read_table(&self, _key: &RecordKey) -> StorageResult<Table> {
        Err(disk_full())
    }

    async fn list(&self, _dir: RecordDir) -> StorageResult<Vec<String>> {
        Err(disk_full())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn sender(id: u64, username: &str) -> Sender {
    Sender {
        id: UserId(id),
        username: username.to_string(),
        display_name: None,
        bot: false,
    }
}

pub fn member(id: u64, username: &str, nickname: Option<&str>) -> Member {
    Member {
        id: UserId(id),
        username: username.to_string(),
        nickname: nickname.map(str::to_string),
        roles: vec![],
    }
}

pub fn roles() -> Vec<AccessRole> {
    vec![
        AccessRole {
            id: 1,
            name: "Admin".to_string(),
        },
        AccessRole {
            id: 2,
            name: "Tutor".to_string(),
        },
    ]
}

/// Privileged actor replying to [`OPERATOR`].
pub fn admin() -> SyntheticActor {
    SyntheticActor::new(
        ActorIdentity {
            user_id: OPERATOR,
            name: "operator".to_string(),
            roles: roles(),
        },
        "Admin",
        Some(OPERATOR),
    )
}

/// Actor without the admin role.
pub fn visitor() -> SyntheticActor {
    SyntheticActor::new(
        ActorIdentity {
            user_id: UserId(901),
            name: "visitor".to_string(),
            roles: vec![],
        },
        "Admin",
        Some(UserId(901)),
    )
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        groups: vec!["g1".to_string(), "G2".to_string()],
        roles: roles(),
        default_duration: Duration::from_secs(30),
    }
}

pub fn engine(
    transport: &Arc<MockTransport>,
    store: Arc<dyn RecordStore>,
) -> (Engine, TimerReceiver) {
    let transport: Arc<dyn ChatTransport> = transport.clone();
    Engine::new(engine_config(), transport, store)
}

/// Direct message from `from`.
pub fn dm(from: &Member, text: &str) -> GatewayEvent {
    message_event(from, ChannelId(from.id.get() + 10_000), text, true)
}

/// `from` posting `text` in guild channel `channel`.
pub fn channel_message(from: &Member, channel: ChannelId, text: &str) -> GatewayEvent {
    message_event(from, channel, text, false)
}

fn message_event(from: &Member, channel: ChannelId, text: &str, direct: bool) -> GatewayEvent {
    GatewayEvent::MessageReceived(Box::new(InboundMessage {
        message_id: MessageId(1),
        channel_id: channel,
        author: Sender {
            id: from.id,
            username: from.username.clone(),
            display_name: None,
            bot: false,
        },
        content: text.to_string(),
        direct,
        timestamp: None,
    }))
}

/// `from` pressing the button with `custom_id` on the message at `at`.
pub fn press(from: &Member, at: MessageRef, custom_id: &str) -> GatewayEvent {
    GatewayEvent::ButtonPressed(Box::new(ButtonPress {
        interaction_id: "1".to_string(),
        channel_id: at.channel_id,
        message_id: at.message_id,
        user: Sender {
            id: from.id,
            username: from.username.clone(),
            display_name: None,
            bot: false,
        },
        custom_id: custom_id.to_string(),
    }))
}

/// Button `index` of the first row of `message`.
pub fn button(message: &OutboundMessage, index: usize) -> String {
    message.buttons[0][index].custom_id.clone()
}
