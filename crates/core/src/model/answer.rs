use std::collections::BTreeSet;

use crate::model::ids::{OptionId, QuestionId};

/// The user's current answer to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Selected option ids for choice questions.
    Choices(BTreeSet<OptionId>),
    /// Free text for open questions.
    Text(String),
}

impl Answer {
    /// A single-option selection.
    #[must_use]
    pub fn choice(option: impl Into<OptionId>) -> Self {
        Self::Choices(BTreeSet::from([option.into()]))
    }

    #[must_use]
    pub fn choices<I, O>(options: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OptionId>,
    {
        Self::Choices(options.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// An answer with no selected options or only whitespace counts as unanswered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Choices(set) => set.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<&BTreeSet<OptionId>> {
        match self {
            Self::Choices(set) => Some(set),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Choices(_) => None,
        }
    }
}

/// One row of a flush: the answer for a question, or `None` when unanswered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntry {
    pub question_id: QuestionId,
    pub answer: Option<Answer>,
    pub elapsed_secs: Option<u32>,
}

impl AnswerEntry {
    #[must_use]
    pub fn unanswered(question_id: QuestionId) -> Self {
        Self {
            question_id,
            answer: None,
            elapsed_secs: None,
        }
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Selected option ids in stable order; empty for text or unanswered entries.
    #[must_use]
    pub fn option_ids(&self) -> Vec<String> {
        self.answer
            .as_ref()
            .and_then(Answer::selected)
            .map(|set| set.iter().map(|o| o.as_str().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Text response; empty for choice or unanswered entries.
    #[must_use]
    pub fn text(&self) -> &str {
        self.answer.as_ref().and_then(Answer::as_text).unwrap_or("")
    }
}
