use crate::store::Record;

/// Column holding the participant in every survey record.
pub const NAME_COLUMN: &str = "Name";

/// Answers of one participant, in the order the questions were answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyEntry {
    name: Option<String>,
    answers: Vec<(String, String)>,
}

impl SurveyEntry {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Store `option` under `label`, replacing an earlier answer to the same label.
    pub fn merge(&mut self, label: &str, option: &str) {
        match self.answers.iter_mut().find(|(l, _)| l == label) {
            Some((_, value)) => *value = option.to_string(),
            None => self.answers.push((label.to_string(), option.to_string())),
        }
    }

    pub fn answers(&self) -> &[(String, String)] {
        &self.answers
    }

    pub fn answer(&self, label: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.answers.is_empty()
    }

    pub fn to_record(&self) -> Record {
        self.answers.iter().fold(
            Record::new().with(NAME_COLUMN, self.name.as_deref().unwrap_or_default()),
            |record, (label, value)| record.with(label.as_str(), value.as_str()),
        )
    }
}
