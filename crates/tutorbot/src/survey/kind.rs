use std::fmt;
use std::str::FromStr;

use tutorbot_gateway_protocol::ButtonStyle;

use super::SurveyError;

/// Option set a question offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    /// Very Easy .. Very Hard, styled green to red.
    Difficulty,
    /// 20% .. 100%, styled red to green.
    Score,
}

const DIFFICULTY: [&str; 5] = ["Very Easy", "Easy", "Medium", "Hard", "Very Hard"];
const SCORE: [&str; 5] = ["20%", "40%", "60%", "80%", "100%"];

// Discord buttons only come in four colours; the middle option is neutral.
const GREEN_TO_RED: [ButtonStyle; 5] = [
    ButtonStyle::Success,
    ButtonStyle::Success,
    ButtonStyle::Secondary,
    ButtonStyle::Danger,
    ButtonStyle::Danger,
];

impl QuestionKind {
    pub fn options(self) -> &'static [&'static str] {
        match self {
            Self::Difficulty => &DIFFICULTY,
            Self::Score => &SCORE,
        }
    }

    pub fn option(self, index: usize) -> Option<&'static str> {
        self.options().get(index).copied()
    }

    pub fn style(self, index: usize) -> ButtonStyle {
        let index = index.min(GREEN_TO_RED.len() - 1);
        match self {
            Self::Difficulty => GREEN_TO_RED[index],
            Self::Score => GREEN_TO_RED[GREEN_TO_RED.len() - 1 - index],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Difficulty => "Difficulty",
            Self::Score => "Score",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "difficulty" => Ok(Self::Difficulty),
            "score" => Ok(Self::Score),
            _ => Err(SurveyError::UnknownKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" SCORE ".parse::<QuestionKind>().unwrap(), QuestionKind::Score);
        assert_eq!(
            "difficulty".parse::<QuestionKind>().unwrap(),
            QuestionKind::Difficulty
        );
        assert!(matches!(
            "rating".parse::<QuestionKind>(),
            Err(SurveyError::UnknownKind(k)) if k == "rating"
        ));
    }

    #[test]
    fn styles_run_in_opposite_directions() {
        assert_eq!(QuestionKind::Difficulty.style(0), ButtonStyle::Success);
        assert_eq!(QuestionKind::Difficulty.style(4), ButtonStyle::Danger);
        assert_eq!(QuestionKind::Score.style(0), ButtonStyle::Danger);
        assert_eq!(QuestionKind::Score.style(4), ButtonStyle::Success);
        assert_eq!(QuestionKind::Score.option(2), Some("60%"));
        assert_eq!(QuestionKind::Score.option(5), None);
    }
}
