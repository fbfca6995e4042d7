//! In-memory answer buffer for a running session.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::model::{Answer, AnswerEntry, OptionId, Question, QuestionId, QuestionKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("question {question} has no option {option}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("answer shape does not fit question {question} ({kind:?})")]
    KindMismatch {
        question: QuestionId,
        kind: QuestionKind,
    },

    #[error("question {0} accepts a single option")]
    TooManyOptions(QuestionId),
}

#[derive(Debug, Clone)]
struct Slot {
    kind: QuestionKind,
    options: BTreeSet<OptionId>,
}

/// Latest answer per question, validated against the session's questions.
///
/// Every question has at most one entry; writing replaces the previous value.
/// Empty answers (no options, blank text) are stored as "unanswered".
#[derive(Debug, Clone)]
pub struct AnswerBuffer {
    slots: HashMap<QuestionId, Slot>,
    answers: HashMap<QuestionId, Answer>,
    elapsed: HashMap<QuestionId, u32>,
}

impl AnswerBuffer {
    #[must_use]
    pub fn new(questions: &[Question]) -> Self {
        let slots = questions
            .iter()
            .map(|q| {
                let slot = Slot {
                    kind: q.kind(),
                    options: q.options().iter().map(|o| o.id.clone()).collect(),
                };
                (q.id(), slot)
            })
            .collect();

        Self {
            slots,
            answers: HashMap::new(),
            elapsed: HashMap::new(),
        }
    }

    /// Replace the answer for `question`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError` if the question is unknown, the answer shape does
    /// not fit the question kind, or an option id does not exist.
    pub fn set_answer(&mut self, question: QuestionId, answer: Answer) -> Result<(), BufferError> {
        let slot = self.slot(question)?;
        match (&answer, slot.kind) {
            (Answer::Text(_), QuestionKind::FreeText) => {}
            (Answer::Choices(selected), kind) if kind.is_choice() => {
                if kind != QuestionKind::MultiChoice && selected.len() > 1 {
                    return Err(BufferError::TooManyOptions(question));
                }
                if let Some(missing) = selected.iter().find(|o| !slot.options.contains(*o)) {
                    return Err(BufferError::UnknownOption {
                        question,
                        option: missing.clone(),
                    });
                }
            }
            (_, kind) => return Err(BufferError::KindMismatch { question, kind }),
        }

        if answer.is_empty() {
            self.answers.remove(&question);
        } else {
            self.answers.insert(question, answer);
        }
        Ok(())
    }

    /// Current answer, or `None` when unanswered.
    #[must_use]
    pub fn get_answer(&self, question: QuestionId) -> Option<&Answer> {
        self.answers.get(&question)
    }

    /// Flip `option` for a multi-choice question; select it for single-choice
    /// and true/false questions.
    ///
    /// Returns the answer after the change (`None` if it became unanswered).
    ///
    /// # Errors
    ///
    /// Returns `BufferError` if the question is unknown, is free text, or the
    /// option does not exist.
    pub fn toggle_option(
        &mut self,
        question: QuestionId,
        option: OptionId,
    ) -> Result<Option<&Answer>, BufferError> {
        let slot = self.slot(question)?;
        if !slot.kind.is_choice() {
            return Err(BufferError::KindMismatch {
                question,
                kind: slot.kind,
            });
        }
        if !slot.options.contains(&option) {
            return Err(BufferError::UnknownOption { question, option });
        }

        let next = if slot.kind == QuestionKind::MultiChoice {
            let mut selected = self
                .answers
                .get(&question)
                .and_then(Answer::selected)
                .cloned()
                .unwrap_or_default();
            if !selected.remove(&option) {
                selected.insert(option);
            }
            Answer::Choices(selected)
        } else {
            Answer::choice(option)
        };

        if next.is_empty() {
            self.answers.remove(&question);
        } else {
            self.answers.insert(question, next);
        }
        Ok(self.answers.get(&question))
    }

    /// Drop any answer for `question`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::UnknownQuestion` for questions outside the session.
    pub fn clear_answer(&mut self, question: QuestionId) -> Result<(), BufferError> {
        self.slot(question)?;
        self.answers.remove(&question);
        Ok(())
    }

    /// Add time spent on `question`.
    pub fn record_elapsed(&mut self, question: QuestionId, secs: u32) {
        if self.slots.contains_key(&question) && secs > 0 {
            let total = self.elapsed.entry(question).or_insert(0);
            *total = total.saturating_add(secs);
        }
    }

    #[must_use]
    pub fn elapsed(&self, question: QuestionId) -> Option<u32> {
        self.elapsed.get(&question).copied()
    }

    /// The current entry for one question.
    #[must_use]
    pub fn entry(&self, question: QuestionId) -> AnswerEntry {
        AnswerEntry {
            question_id: question,
            answer: self.answers.get(&question).cloned(),
            elapsed_secs: self.elapsed(question),
        }
    }

    /// One entry per question in the given order, unanswered ones included.
    #[must_use]
    pub fn flush_entries(&self, questions: &[Question]) -> Vec<AnswerEntry> {
        questions.iter().map(|q| self.entry(q.id())).collect()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, question: QuestionId) -> Result<&Slot, BufferError> {
        self.slots
            .get(&question)
            .ok_or(BufferError::UnknownQuestion(question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChoiceOption;

    fn choice(id: u64, kind: QuestionKind) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            kind,
            vec![
                ChoiceOption::new("A", "a"),
                ChoiceOption::new("B", "b"),
                ChoiceOption::new("C", "c"),
            ],
            1.0,
            u32::try_from(id).unwrap(),
        )
        .unwrap()
    }

    fn text(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            QuestionKind::FreeText,
            Vec::new(),
            5.0,
            u32::try_from(id).unwrap(),
        )
        .unwrap()
    }

    fn questions() -> Vec<Question> {
        vec![
            choice(1, QuestionKind::SingleChoice),
            choice(2, QuestionKind::MultiChoice),
            text(3),
        ]
    }

    #[test]
    fn set_answer_overwrites_previous_value() {
        let mut buffer = AnswerBuffer::new(&questions());
        let q = QuestionId::new(1);
        buffer.set_answer(q, Answer::choice("A")).unwrap();
        buffer.set_answer(q, Answer::choice("C")).unwrap();
        assert_eq!(buffer.get_answer(q), Some(&Answer::choice("C")));
        assert_eq!(buffer.answered_count(), 1);
    }

    #[test]
    fn latest_write_wins_across_mixed_operations() {
        let mut buffer = AnswerBuffer::new(&questions());
        let multi = QuestionId::new(2);
        let ops = ["A", "B", "A", "C", "B"];
        let mut expected = BTreeSet::new();
        for op in ops {
            let option = OptionId::from(op);
            if !expected.remove(&option) {
                expected.insert(option.clone());
            }
            buffer.toggle_option(multi, option).unwrap();
            assert_eq!(
                buffer.get_answer(multi).and_then(Answer::selected),
                Some(&expected)
            );
        }

        buffer.set_answer(multi, Answer::choices(["B"])).unwrap();
        assert_eq!(buffer.get_answer(multi), Some(&Answer::choices(["B"])));
    }

    #[test]
    fn toggling_same_option_twice_is_a_no_op() {
        let mut buffer = AnswerBuffer::new(&questions());
        let multi = QuestionId::new(2);
        buffer.set_answer(multi, Answer::choices(["A"])).unwrap();
        let before = buffer.get_answer(multi).cloned();

        buffer.toggle_option(multi, "C".into()).unwrap();
        buffer.toggle_option(multi, "C".into()).unwrap();

        assert_eq!(buffer.get_answer(multi).cloned(), before);
    }

    #[test]
    fn removing_last_option_leaves_question_unanswered() {
        let mut buffer = AnswerBuffer::new(&questions());
        let multi = QuestionId::new(2);
        buffer.toggle_option(multi, "B".into()).unwrap();
        let after = buffer.toggle_option(multi, "B".into()).unwrap();
        assert!(after.is_none());
        assert!(buffer.get_answer(multi).is_none());
    }

    #[test]
    fn single_choice_toggle_replaces_selection() {
        let mut buffer = AnswerBuffer::new(&questions());
        let single = QuestionId::new(1);
        buffer.toggle_option(single, "A".into()).unwrap();
        buffer.toggle_option(single, "B".into()).unwrap();
        assert_eq!(buffer.get_answer(single), Some(&Answer::choice("B")));
    }

    #[test]
    fn rejects_invalid_writes() {
        let mut buffer = AnswerBuffer::new(&questions());
        assert_eq!(
            buffer.set_answer(QuestionId::new(99), Answer::text("x")),
            Err(BufferError::UnknownQuestion(QuestionId::new(99)))
        );
        assert!(matches!(
            buffer.toggle_option(QuestionId::new(1), "Z".into()),
            Err(BufferError::UnknownOption { .. })
        ));
        assert!(matches!(
            buffer.set_answer(QuestionId::new(3), Answer::choice("A")),
            Err(BufferError::KindMismatch { .. })
        ));
        assert_eq!(
            buffer.set_answer(QuestionId::new(1), Answer::choices(["A", "B"])),
            Err(BufferError::TooManyOptions(QuestionId::new(1)))
        );
        assert_eq!(buffer.answered_count(), 0);
    }

    #[test]
    fn blank_text_clears_answer() {
        let mut buffer = AnswerBuffer::new(&questions());
        let q = QuestionId::new(3);
        buffer.set_answer(q, Answer::text("draft")).unwrap();
        buffer.set_answer(q, Answer::text("  ")).unwrap();
        assert!(buffer.get_answer(q).is_none());
    }

    #[test]
    fn flush_includes_every_question_in_order() {
        let qs = questions();
        let mut buffer = AnswerBuffer::new(&qs);
        buffer.set_answer(QuestionId::new(3), Answer::text("because")).unwrap();
        buffer.record_elapsed(QuestionId::new(3), 12);
        buffer.record_elapsed(QuestionId::new(3), 3);

        let entries = buffer.flush_entries(&qs);
        assert_eq!(entries.len(), 3);
        let ids: Vec<_> = entries.iter().map(|e| e.question_id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(!entries[0].is_answered());
        assert!(!entries[1].is_answered());
        assert_eq!(entries[2].text(), "because");
        assert_eq!(entries[2].elapsed_secs, Some(15));
    }
}
