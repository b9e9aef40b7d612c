//! Tutor-session feedback form: one three-way question with a live tally.

use std::collections::HashSet;
use std::time::Duration;

use tutorbot_gateway_protocol::{
    Button, ButtonStyle, Card, CardField, MessageRef, OutboundMessage, UserId,
};

use super::entry::NAME_COLUMN;
use super::ids::FormId;
use crate::store::{Record, RecordKey};

/// Column holding the chosen category.
pub const FEEDBACK_COLUMN: &str = "Feedback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Good,
    Satisfactory,
    Poor,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Good, Self::Satisfactory, Self::Poor];

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Satisfactory => "Satisfactory",
            Self::Poor => "Poor",
        }
    }

    fn style(self) -> ButtonStyle {
        match self {
            Self::Good => ButtonStyle::Success,
            Self::Satisfactory => ButtonStyle::Primary,
            Self::Poor => ButtonStyle::Danger,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Good => 0,
            Self::Satisfactory => 1,
            Self::Poor => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Outcome of a press on the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Recorded,
    Duplicate,
}

#[derive(Debug)]
pub struct FeedbackForm {
    id: FormId,
    group: String,
    key: RecordKey,
    duration: Duration,
    answered: HashSet<UserId>,
    /// Participant names per category, indexed like [`Category::ALL`].
    votes: [Vec<String>; 3],
    message: Option<MessageRef>,
}

impl FeedbackForm {
    /// `key` is the record set the form persists to, fixed at creation.
    pub fn new(group: impl Into<String>, key: RecordKey, duration: Duration) -> Self {
        Self {
            id: FormId::new(),
            group: group.into(),
            key,
            duration,
            answered: HashSet::new(),
            votes: Default::default(),
            message: None,
        }
    }

    pub fn id(&self) -> &FormId {
        &self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
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

    pub fn participants(&self) -> usize {
        self.answered.len()
    }

    pub fn count(&self, category: Category) -> usize {
        self.votes[category.index()].len()
    }

    /// Share of participants that chose `category`, 0 when nobody voted.
    pub fn percentage(&self, category: Category) -> f64 {
        let total = self.participants();
        if total == 0 {
            return 0.0;
        }
        self.count(category) as f64 * 100.0 / total as f64
    }

    pub fn record(&mut self, user: UserId, name: &str, category: Category) -> Vote {
        if !self.answered.insert(user) {
            return Vote::Duplicate;
        }
        self.votes[category.index()].push(name.to_string());
        Vote::Recorded
    }

    /// All votes as records, Good first, then Satisfactory, then Poor.
    pub fn records(&self) -> Vec<Record> {
        Category::ALL
            .iter()
            .flat_map(|category| {
                self.votes[category.index()].iter().map(|name| {
                    Record::new()
                        .with(NAME_COLUMN, name.as_str())
                        .with(FEEDBACK_COLUMN, category.label())
                })
            })
            .collect()
    }

    pub fn render(&self) -> OutboundMessage {
        let mut fields = vec![CardField {
            name: "Participants".to_string(),
            value: self.participants().to_string(),
            inline: false,
        }];
        fields.extend(Category::ALL.iter().map(|&category| CardField {
            name: category.label().to_string(),
            value: format!("`{:.2} %`", self.percentage(category)),
            inline: true,
        }));

        let buttons = Category::ALL
            .iter()
            .map(|&category| {
                Button::new(category.label(), feedback_custom_id(&self.id, category))
                    .style(category.style())
            })
            .collect();

        OutboundMessage::text(format!(
            "```How was the tutor session of group {}?```",
            self.group
        ))
        .with_card(Card {
            title: "Tutor Session Feedback".to_string(),
            fields,
        })
        .with_button_row(buttons)
    }
}

pub(super) fn feedback_custom_id(form: &FormId, category: Category) -> String {
    format!("fb:{form}:{}", category.index())
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;

    fn form() -> FeedbackForm {
        FeedbackForm::new(
            "g1",
            RecordKey::tutor_feedback("g1", Local::now()),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn percentages_are_zero_without_votes() {
        let form = form();
        for category in Category::ALL {
            assert_eq!(form.percentage(category), 0.0);
        }
        let card = form.render().card.unwrap();
        assert_eq!(card.title, "Tutor Session Feedback");
        assert_eq!(card.fields[0].value, "0");
        assert_eq!(card.fields[1].value, "`0.00 %`");
    }

    #[test]
    fn tally_counts_first_vote_only() {
        let mut form = form();
        assert_eq!(form.record(UserId(1), "Ann (ann)", Category::Good), Vote::Recorded);
        assert_eq!(form.record(UserId(1), "Ann (ann)", Category::Poor), Vote::Duplicate);
        assert_eq!(form.record(UserId(2), "Bob (bob)", Category::Poor), Vote::Recorded);
        assert_eq!(form.record(UserId(3), "Cy (cy)", Category::Poor), Vote::Recorded);

        assert_eq!(form.participants(), 3);
        assert_eq!(form.count(Category::Poor), 2);

        let card = form.render().card.unwrap();
        let values: Vec<_> = card.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["3", "`33.33 %`", "`0.00 %`", "`66.67 %`"]);
    }

    #[test]
    fn records_list_categories_in_fixed_order() {
        let mut form = form();
        form.record(UserId(2), "Bob (bob)", Category::Poor);
        form.record(UserId(1), "Ann (ann)", Category::Good);

        let records = form.records();
        assert_eq!(records[0].get("Name"), Some("Ann (ann)"));
        assert_eq!(records[0].get("Feedback"), Some("Good"));
        assert_eq!(records[1].get("Feedback"), Some("Poor"));
    }

    #[test]
    fn button_ids_encode_category() {
        let form = form();
        let message = form.render();
        assert_eq!(
            message.buttons[0][1].custom_id,
            format!("fb:{}:1", form.id())
        );
    }
}
