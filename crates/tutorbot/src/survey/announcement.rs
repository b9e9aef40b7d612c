use std::collections::HashSet;
use std::time::Duration;

use tutorbot_gateway_protocol::{Button, ButtonStyle, MessageRef, OutboundMessage, UserId};

use super::chain::ChainTemplate;
use super::ids::AnnouncementId;

/// Broadcast survey: a message with a single "Participate" button that hands
/// every participant their own copy of the chain.
#[derive(Debug)]
pub struct Announcement {
    id: AnnouncementId,
    text: String,
    template: ChainTemplate,
    duration: Duration,
    participants: HashSet<UserId>,
    message: Option<MessageRef>,
}

impl Announcement {
    pub fn new(text: impl Into<String>, template: ChainTemplate, duration: Duration) -> Self {
        Self {
            id: AnnouncementId::new(),
            text: text.into(),
            template,
            duration,
            participants: HashSet::new(),
            message: None,
        }
    }

    pub fn id(&self) -> &AnnouncementId {
        &self.id
    }

    pub fn template(&self) -> &ChainTemplate {
        &self.template
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn message(&self) -> Option<MessageRef> {
        self.message
    }

    pub fn set_message(&mut self, message: MessageRef) {
        self.message = Some(message);
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Register `user`. False if they already participated.
    pub fn register(&mut self, user: UserId) -> bool {
        self.participants.insert(user)
    }

    pub fn render(&self) -> OutboundMessage {
        OutboundMessage::text(format!("```{}```", self.text)).with_button_row(vec![
            Button::new("Participate", announcement_custom_id(&self.id)).style(ButtonStyle::Success),
        ])
    }
}

pub(super) fn announcement_custom_id(id: &AnnouncementId) -> String {
    format!("an:{id}")
}
