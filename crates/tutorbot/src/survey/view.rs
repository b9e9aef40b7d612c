use std::collections::HashSet;
use std::time::Duration;

use tutorbot_gateway_protocol::{Button, MessageRef, OutboundMessage, UserId};

use super::entry::SurveyEntry;
use super::ids::{ChainId, ViewId};
use super::kind::QuestionKind;

/// Record tag of views that belong to a chain.
pub const CHAINED_TAG: &str = "CS";
/// Record tag of a standalone direct view.
pub const SINGLE_TAG: &str = "SS";

/// A question as submitted by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub kind: QuestionKind,
}

impl Question {
    pub fn new(prompt: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            prompt: prompt.into(),
            kind,
        }
    }
}

/// Immutable description of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSpec {
    /// Shown to participants and used as the answer's column label.
    pub prompt: String,
    pub kind: QuestionKind,
    pub duration: Duration,
    pub disable_on_answer: bool,
}

impl ViewSpec {
    pub fn new(question: Question, duration: Duration, disable_on_answer: bool) -> Self {
        Self {
            prompt: question.prompt,
            kind: question.kind,
            duration,
            disable_on_answer,
        }
    }
}

/// Result of a participant selecting an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Recorded,
    /// The participant already answered this view.
    Duplicate,
    /// The option index does not exist for this view's kind.
    InvalidOption,
}

/// One live question instance.
#[derive(Debug)]
pub struct SessionView {
    id: ViewId,
    spec: ViewSpec,
    topic: String,
    chain: Option<ChainId>,
    answered: HashSet<UserId>,
    entry: SurveyEntry,
    completed: Vec<SurveyEntry>,
    message: Option<MessageRef>,
}

impl SessionView {
    pub fn new(spec: ViewSpec, topic: impl Into<String>, chain: Option<ChainId>) -> Self {
        Self {
            id: ViewId::new(),
            spec,
            topic: topic.into(),
            chain,
            answered: HashSet::new(),
            entry: SurveyEntry::default(),
            completed: Vec::new(),
            message: None,
        }
    }

    pub fn id(&self) -> &ViewId {
        &self.id
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn chain(&self) -> Option<&ChainId> {
        self.chain.as_ref()
    }

    pub fn message(&self) -> Option<MessageRef> {
        self.message
    }

    pub fn set_message(&mut self, message: MessageRef) {
        self.message = Some(message);
    }

    pub fn has_answered(&self, user: UserId) -> bool {
        self.answered.contains(&user)
    }

    pub fn entry(&self) -> &SurveyEntry {
        &self.entry
    }

    pub fn completed(&self) -> &[SurveyEntry] {
        &self.completed
    }

    /// `CS` for chained views, `SS` for a standalone view.
    pub fn tag(&self) -> &'static str {
        if self.chain.is_some() {
            CHAINED_TAG
        } else {
            SINGLE_TAG
        }
    }

    /// Record the participant's choice into the in-progress entry.
    pub fn select(&mut self, user: UserId, name: &str, option: usize) -> Selection {
        if self.answered.contains(&user) {
            return Selection::Duplicate;
        }
        let Some(label) = self.spec.kind.option(option) else {
            return Selection::InvalidOption;
        };
        self.answered.insert(user);
        self.entry.set_name(name);
        self.entry.merge(&self.spec.prompt, label);
        Selection::Recorded
    }

    /// Move the in-progress entry into the completed list.
    pub fn finalize(&mut self) {
        let entry = std::mem::take(&mut self.entry);
        self.completed.push(entry);
    }

    /// Hand the in-progress entry to the next view in the chain.
    pub fn take_entry(&mut self) -> SurveyEntry {
        std::mem::take(&mut self.entry)
    }

    pub fn receive_entry(&mut self, entry: SurveyEntry) {
        self.entry = entry;
    }

    /// The prompt in a code block with one button per option.
    pub fn render(&self) -> OutboundMessage {
        let kind = self.spec.kind;
        let buttons = kind
            .options()
            .iter()
            .enumerate()
            .map(|(idx, label)| {
                Button::new(*label, view_custom_id(&self.id, idx)).style(kind.style(idx))
            })
            .collect();
        OutboundMessage::text(format!("```{}```", self.spec.prompt)).with_button_row(buttons)
    }
}

pub(super) fn view_custom_id(view: &ViewId, option: usize) -> String {
    format!("sv:{view}:{option}")
}
