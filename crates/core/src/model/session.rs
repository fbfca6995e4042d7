use chrono::{DateTime, Utc};
use std::fmt;

use crate::model::ids::{AttemptId, ExamId, InterviewId};

/// Which flow a timed session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Exam,
    Interview,
}

/// Identifies one running session on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRef {
    /// An attempt of an exam definition.
    Attempt { attempt: AttemptId, exam: ExamId },
    /// Interviews are single-use; the interview id is the session id.
    Interview(InterviewId),
}

impl SessionRef {
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Attempt { .. } => SessionKind::Exam,
            Self::Interview(_) => SessionKind::Interview,
        }
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempt { attempt, exam } => write!(f, "exam {exam} attempt {attempt}"),
            Self::Interview(id) => write!(f, "interview {id}"),
        }
    }
}

/// When a session must be finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Server-provided absolute end time.
    At(DateTime<Utc>),
    /// Configured duration counted from load time.
    Remaining(u32),
    /// No time limit.
    Unlimited,
}

impl Deadline {
    /// Whole seconds left at `now`, never negative. `None` when unlimited.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<u32> {
        match *self {
            Self::At(end) => {
                let secs = (end - now).num_seconds().max(0);
                Some(u32::try_from(secs).unwrap_or(u32::MAX))
            }
            Self::Remaining(secs) => Some(secs),
            Self::Unlimited => None,
        }
    }

    /// Deadline from a duration in minutes; zero means unlimited.
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        if minutes == 0 {
            Self::Unlimited
        } else {
            Self::Remaining(minutes.saturating_mul(60))
        }
    }
}

/// Session metadata resolved by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMeta {
    pub session: SessionRef,
    pub title: String,
    pub deadline: Deadline,
}
