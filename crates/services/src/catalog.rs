use std::sync::Arc;

use prep_core::model::{AttemptId, ExamId, InterviewId, Question, TemplateId};

use crate::api::ApiClient;
use crate::api::dto::{
    AttemptDto, ExamQuestionDto, ExamSummary, InterviewEnvelope, InterviewQuestionDto,
    InterviewSummary, Listing, StartExamResponse, TemplateSummary, UseTemplateRequest,
};
use crate::error::ApiError;

/// Which interviews to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterviewScope {
    #[default]
    All,
    /// Only interviews created by the signed-in user.
    Mine,
}

/// Read access to exams, interviews and templates, plus the calls that open
/// a new session on the backend.
#[derive(Clone)]
pub struct CatalogService {
    api: Arc<ApiClient>,
}

impl CatalogService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn list_exams(&self) -> Result<Vec<ExamSummary>, ApiError> {
        let listing: Listing<ExamSummary> = self.api.get("exams/").await?;
        Ok(listing.into_vec())
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn exam(&self, id: ExamId) -> Result<ExamSummary, ApiError> {
        self.api.get(&format!("exams/{id}/")).await
    }

    /// Open a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AlreadyInProgress` with the existing attempt id when
    /// one is already open, or another `ApiError` if the request fails.
    pub async fn start_exam(&self, id: ExamId) -> Result<StartExamResponse, ApiError> {
        let started: StartExamResponse = self.api.post_empty(&format!("exams/{id}/start/")).await?;
        tracing::info!(exam = %id, attempt = %started.attempt.id, "exam attempt started");
        Ok(started)
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn attempt(&self, id: AttemptId) -> Result<AttemptDto, ApiError> {
        self.api.get(&format!("attempts/{id}/")).await
    }

    /// Questions of an exam in presentation order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if a question is malformed, or another
    /// `ApiError` if the request fails.
    pub async fn exam_questions(&self, id: ExamId) -> Result<Vec<Question>, ApiError> {
        let listing: Listing<ExamQuestionDto> =
            self.api.get(&format!("exams/{id}/questions/")).await?;
        exam_questions_from(listing.into_vec())
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn list_interviews(
        &self,
        scope: InterviewScope,
    ) -> Result<Vec<InterviewSummary>, ApiError> {
        let path = match scope {
            InterviewScope::All => "interviews/",
            InterviewScope::Mine => "interviews/my_interviews/",
        };
        let listing: Listing<InterviewSummary> = self.api.get(path).await?;
        Ok(listing.into_vec())
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn interview(&self, id: InterviewId) -> Result<InterviewSummary, ApiError> {
        self.api.get(&format!("interviews/{id}/")).await
    }

    /// Move a scheduled interview to in-progress.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the interview is not scheduled, or
    /// another `ApiError` if the request fails.
    pub async fn start_interview(&self, id: InterviewId) -> Result<InterviewSummary, ApiError> {
        let started: InterviewEnvelope = self
            .api
            .post_empty(&format!("interviews/{id}/start/"))
            .await?;
        tracing::info!(interview = %id, "interview started");
        Ok(started.interview)
    }

    /// # Errors
    ///
    /// Returns `ApiError::Decode` if a question is malformed, or another
    /// `ApiError` if the request fails.
    pub async fn interview_questions(&self, id: InterviewId) -> Result<Vec<Question>, ApiError> {
        let listing: Listing<InterviewQuestionDto> =
            self.api.get(&format!("interviews/{id}/questions/")).await?;
        let mut questions = listing
            .into_vec()
            .into_iter()
            .map(|dto| {
                dto.into_question()
                    .map_err(|e| ApiError::Decode(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        questions.sort_by_key(Question::order);
        Ok(questions)
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn templates(&self) -> Result<Vec<TemplateSummary>, ApiError> {
        let listing: Listing<TemplateSummary> = self.api.get("templates/").await?;
        Ok(listing.into_vec())
    }

    /// Create a scheduled interview from a template.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn use_template(
        &self,
        id: TemplateId,
        job_role: &str,
        company_name: &str,
    ) -> Result<InterviewSummary, ApiError> {
        let job_role = if job_role.trim().is_empty() {
            "Software Engineer"
        } else {
            job_role.trim()
        };
        let created: InterviewEnvelope = self
            .api
            .post(
                &format!("templates/{id}/use_template/"),
                &UseTemplateRequest {
                    job_role,
                    company_name: company_name.trim(),
                },
            )
            .await?;
        tracing::info!(template = %id, interview = %created.interview.id, "interview created from template");
        Ok(created.interview)
    }
}

/// Validate and order exam questions.
///
/// # Errors
///
/// Returns `ApiError::Decode` naming the first malformed question.
pub fn exam_questions_from(dtos: Vec<ExamQuestionDto>) -> Result<Vec<Question>, ApiError> {
    let mut questions = dtos
        .into_iter()
        .map(|dto| {
            dto.into_question()
                .map_err(|e| ApiError::Decode(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    questions.sort_by_key(Question::order);
    Ok(questions)
}
