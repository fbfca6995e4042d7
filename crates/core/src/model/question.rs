use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has an empty prompt")]
    EmptyPrompt(QuestionId),

    #[error("choice question {0} has no options")]
    MissingOptions(QuestionId),

    #[error("question {question} lists option {option} more than once")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("unknown question type: {0}")]
    UnknownKind(String),
}

//
// ─── QUESTION KIND ────────────────────────────────────────────────────────────
//

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    /// Exactly one option may be selected.
    SingleChoice,
    /// Any subset of options may be selected.
    MultiChoice,
    /// Two options, one may be selected.
    TrueFalse,
    /// Free text answer.
    FreeText,
}

impl QuestionKind {
    /// Parses the backend `question_type` tag.
    ///
    /// Interview question categories (`technical`, `behavioral`, ...) are all
    /// answered in free text, so anything that is not a known choice tag maps
    /// to `FreeText` when `lenient` is set.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::UnknownKind` for unrecognized tags when not lenient.
    pub fn from_wire(tag: &str, lenient: bool) -> Result<Self, QuestionError> {
        match tag {
            "mcq" | "single" | "single_choice" => Ok(Self::SingleChoice),
            "multiple" | "multi_choice" => Ok(Self::MultiChoice),
            "true_false" => Ok(Self::TrueFalse),
            "short_answer" | "text" | "free_text" => Ok(Self::FreeText),
            _ if lenient => Ok(Self::FreeText),
            other => Err(QuestionError::UnknownKind(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_choice(self) -> bool {
        !matches!(self, Self::FreeText)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SingleChoice => "Single Choice",
            Self::MultiChoice => "Multiple Choice",
            Self::TrueFalse => "True/False",
            Self::FreeText => "Short Answer",
        }
    }
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub text: String,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(id: impl Into<OptionId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A question as fetched for a session. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    kind: QuestionKind,
    options: Vec<ChoiceOption>,
    points: f64,
    order: u32,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, a choice question has no
    /// options, or option ids repeat.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        kind: QuestionKind,
        options: Vec<ChoiceOption>,
        points: f64,
        order: u32,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt(id));
        }
        if kind.is_choice() && options.is_empty() {
            return Err(QuestionError::MissingOptions(id));
        }

        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(&option.id) {
                return Err(QuestionError::DuplicateOption {
                    question: id,
                    option: option.id.clone(),
                });
            }
        }

        Ok(Self {
            id,
            prompt,
            kind,
            options,
            points,
            order,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    #[must_use]
    pub fn points(&self) -> f64 {
        self.points
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn has_option(&self, option: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
