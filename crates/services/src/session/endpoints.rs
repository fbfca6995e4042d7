use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use prep_core::model::{
    AnswerEntry, AttemptId, Deadline, ExamId, InterviewId, Question, SessionMeta, SessionRef,
    SessionResult,
};

use crate::api::ApiClient;
use crate::api::dto::{
    AnswerPayload, CompleteInterviewResponse, ExamRef, ResponsePayload, SubmitExamRequest,
    SubmitExamResponse,
};
use crate::catalog::{CatalogService, exam_questions_from};
use crate::error::ApiError;

/// What the loader hands to the controller.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub meta: SessionMeta,
    pub questions: Vec<Question>,
}

/// Backend calls of one timed session. Exams and interviews differ only here.
#[async_trait]
pub trait SessionEndpoints: Send + Sync {
    fn session(&self) -> SessionRef;

    /// Fetch metadata and the ordered question list.
    async fn load(&self) -> Result<LoadedSession, ApiError>;

    /// Best-effort save of a single answer while the session runs.
    async fn autosave(&self, entry: &AnswerEntry) -> Result<(), ApiError>;

    /// Send every entry and close the session; returns the scored result.
    async fn finalize(&self, entries: &[AnswerEntry]) -> Result<SessionResult, ApiError>;
}

/// Deadline from the best information available: an explicit end time, a
/// start time plus duration, or the duration alone.
#[must_use]
pub fn resolve_deadline(
    end: Option<DateTime<Utc>>,
    started: Option<DateTime<Utc>>,
    duration_minutes: u32,
) -> Deadline {
    if let Some(end) = end {
        return Deadline::At(end);
    }
    match started {
        Some(start) if duration_minutes > 0 => {
            Deadline::At(start + Duration::minutes(i64::from(duration_minutes)))
        }
        _ => Deadline::from_minutes(duration_minutes),
    }
}

//
// ─── EXAM ATTEMPT ─────────────────────────────────────────────────────────────
//

pub struct ExamEndpoints {
    api: Arc<ApiClient>,
    catalog: CatalogService,
    attempt: AttemptId,
    exam: ExamId,
    end_time: Option<DateTime<Utc>>,
}

impl ExamEndpoints {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, attempt: AttemptId, exam: ExamId) -> Self {
        Self {
            catalog: CatalogService::new(Arc::clone(&api)),
            api,
            attempt,
            exam,
            end_time: None,
        }
    }

    /// Use the deadline returned when the attempt was started.
    #[must_use]
    pub fn with_end_time(mut self, end_time: Option<DateTime<Utc>>) -> Self {
        self.end_time = end_time;
        self
    }
}

#[async_trait]
impl SessionEndpoints for ExamEndpoints {
    fn session(&self) -> SessionRef {
        SessionRef::Attempt {
            attempt: self.attempt,
            exam: self.exam,
        }
    }

    async fn load(&self) -> Result<LoadedSession, ApiError> {
        let attempt = self.catalog.attempt(self.attempt).await?;
        if !attempt.is_in_progress() {
            return Err(ApiError::Validation {
                message: "This attempt has already been submitted.".into(),
            });
        }

        let exam = match attempt.exam {
            ExamRef::Summary(exam) => *exam,
            ExamRef::Id(id) => self.catalog.exam(id).await?,
        };
        let questions = if exam.questions.is_empty() {
            self.catalog.exam_questions(self.exam).await?
        } else {
            exam_questions_from(exam.questions)?
        };

        let deadline = resolve_deadline(
            attempt.end_time.or(self.end_time),
            attempt.start_time,
            exam.duration_minutes,
        );
        Ok(LoadedSession {
            meta: SessionMeta {
                session: self.session(),
                title: exam.title,
                deadline,
            },
            questions,
        })
    }

    async fn autosave(&self, entry: &AnswerEntry) -> Result<(), ApiError> {
        let _: Value = self
            .api
            .post(
                &format!("attempts/{}/submit_answer/", self.attempt),
                &AnswerPayload::from_entry(entry),
            )
            .await?;
        Ok(())
    }

    async fn finalize(&self, entries: &[AnswerEntry]) -> Result<SessionResult, ApiError> {
        let request = SubmitExamRequest {
            answers: entries.iter().map(AnswerPayload::from_entry).collect(),
        };
        let response: SubmitExamResponse = self
            .api
            .post(&format!("attempts/{}/submit/", self.attempt), &request)
            .await?;
        if response.result.is_null() {
            let raw: Value = self
                .api
                .get(&format!("attempts/{}/results/", self.attempt))
                .await?;
            return Ok(SessionResult::new(raw));
        }
        Ok(SessionResult::new(response.result))
    }
}

//
// ─── INTERVIEW ────────────────────────────────────────────────────────────────
//

pub struct InterviewEndpoints {
    api: Arc<ApiClient>,
    catalog: CatalogService,
    interview: InterviewId,
}

impl InterviewEndpoints {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, interview: InterviewId) -> Self {
        Self {
            catalog: CatalogService::new(Arc::clone(&api)),
            api,
            interview,
        }
    }

    async fn send_response(&self, entry: &AnswerEntry) -> Result<(), ApiError> {
        let _: Value = self
            .api
            .post(
                &format!("interviews/{}/submit_response/", self.interview),
                &ResponsePayload::from_entry(entry),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionEndpoints for InterviewEndpoints {
    fn session(&self) -> SessionRef {
        SessionRef::Interview(self.interview)
    }

    /// Scheduled interviews are started on load.
    async fn load(&self) -> Result<LoadedSession, ApiError> {
        let mut interview = self.catalog.interview(self.interview).await?;
        if interview.is_scheduled() {
            interview = self.catalog.start_interview(self.interview).await?;
        }
        if !interview.is_in_progress() {
            return Err(ApiError::Validation {
                message: format!("This interview is {}.", interview.status.replace('_', " ")),
            });
        }

        let questions = self.catalog.interview_questions(self.interview).await?;
        let deadline = resolve_deadline(None, interview.started_at, interview.duration_minutes);
        Ok(LoadedSession {
            meta: SessionMeta {
                session: self.session(),
                title: interview.title,
                deadline,
            },
            questions,
        })
    }

    async fn autosave(&self, entry: &AnswerEntry) -> Result<(), ApiError> {
        self.send_response(entry).await
    }

    /// Responses are stored per question, so the flush is one call per entry
    /// (blank text for unanswered ones) followed by `complete/`.
    async fn finalize(&self, entries: &[AnswerEntry]) -> Result<SessionResult, ApiError> {
        for entry in entries {
            self.send_response(entry).await?;
        }
        let done: CompleteInterviewResponse = self
            .api
            .post_empty(&format!("interviews/{}/complete/", self.interview))
            .await?;
        Ok(SessionResult::new(done.interview))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::time::fixed_now;

    #[test]
    fn explicit_end_time_wins() {
        let end = fixed_now() + Duration::minutes(5);
        assert_eq!(
            resolve_deadline(Some(end), Some(fixed_now()), 60),
            Deadline::At(end)
        );
    }

    #[test]
    fn start_plus_duration() {
        let start = fixed_now();
        assert_eq!(
            resolve_deadline(None, Some(start), 30),
            Deadline::At(start + Duration::minutes(30))
        );
    }

    #[test]
    fn duration_only_or_unlimited() {
        assert_eq!(resolve_deadline(None, None, 2), Deadline::Remaining(120));
        assert_eq!(resolve_deadline(None, Some(fixed_now()), 0), Deadline::Unlimited);
    }
}
