//! Timed answer sessions shared by exams and interviews.

mod controller;
mod endpoints;
mod timer;

use std::sync::Arc;

use prep_core::model::{AttemptId, ExamId, InterviewId};

use crate::api::ApiClient;
use crate::catalog::CatalogService;
use crate::error::ApiError;

pub use controller::{Progress, SessionController, SessionOptions, SubmitFailure};
pub use endpoints::{
    ExamEndpoints, InterviewEndpoints, LoadedSession, SessionEndpoints, resolve_deadline,
};
pub use timer::CountdownTimer;

/// Builds session controllers wired to the backend.
#[derive(Clone)]
pub struct SessionLauncher {
    api: Arc<ApiClient>,
    catalog: CatalogService,
    options: SessionOptions,
}

impl SessionLauncher {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, options: SessionOptions) -> Self {
        Self {
            catalog: CatalogService::new(Arc::clone(&api)),
            api,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Controller for an existing attempt. Call `load` before use.
    #[must_use]
    pub fn exam_attempt(&self, attempt: AttemptId, exam: ExamId) -> SessionController {
        let endpoints = ExamEndpoints::new(Arc::clone(&self.api), attempt, exam);
        SessionController::new(Arc::new(endpoints), self.options)
    }

    /// Start a new attempt of `exam`, or resume the one already in progress.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the attempt can neither be started nor resumed.
    pub async fn start_or_resume_exam(&self, exam: ExamId) -> Result<SessionController, ApiError> {
        match self.catalog.start_exam(exam).await {
            Ok(started) => {
                let endpoints = ExamEndpoints::new(Arc::clone(&self.api), started.attempt.id, exam)
                    .with_end_time(started.end_time);
                Ok(SessionController::new(Arc::new(endpoints), self.options))
            }
            Err(ApiError::AlreadyInProgress {
                existing: Some(attempt),
                ..
            }) => {
                tracing::info!(exam = %exam, attempt = %attempt, "resuming attempt in progress");
                Ok(self.exam_attempt(attempt, exam))
            }
            Err(err) => Err(err),
        }
    }

    /// Controller for an attempt known only by id.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the attempt cannot be fetched.
    pub async fn resume_attempt(&self, attempt: AttemptId) -> Result<SessionController, ApiError> {
        let dto = self.catalog.attempt(attempt).await?;
        Ok(self.exam_attempt(attempt, dto.exam.id()))
    }

    /// Controller for an interview; a scheduled one is started on load.
    #[must_use]
    pub fn interview(&self, interview: InterviewId) -> SessionController {
        let endpoints = InterviewEndpoints::new(Arc::clone(&self.api), interview);
        SessionController::new(Arc::new(endpoints), self.options)
    }
}
