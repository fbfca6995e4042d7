//! Wire shapes of the REST backend.
//!
//! Only the fields the client reads are modeled; everything else is ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use prep_core::model::{
    AnswerEntry, AttemptId, ChoiceOption, ExamId, InterviewId, Question, QuestionError,
    QuestionId, QuestionKind, TemplateId, UserProfile,
};

//
// ─── HELPERS ──────────────────────────────────────────────────────────────────
//

/// Decimal fields arrive as numbers or strings depending on the model field.
fn flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// RFC 3339 timestamps, or naive ones read as UTC.
fn flexible_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Paginated list or bare array, depending on the endpoint's pagination setting.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page {
        #[serde(default)]
        count: Option<u64>,
        results: Vec<T>,
    },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Page { results, .. } => results,
            Self::Plain(items) => items,
        }
    }
}

//
// ─── AUTH ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Fields of a new account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Partial profile update; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.bio.is_none()
            && self.phone_number.is_none()
            && self.organization.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
    pub new_password_confirm: &'a str,
}

/// Profile endpoints return the user bare; some wrap it under `user`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProfileResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl ProfileResponse {
    #[must_use]
    pub fn into_user(self) -> UserProfile {
        match self {
            Self::Wrapped { user } | Self::Bare(user) => user,
        }
    }
}

//
// ─── EXAMS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
pub struct ExamSummary {
    pub id: ExamId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub total_marks: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub passing_marks: Option<f64>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Only present on the detail endpoint.
    #[serde(default)]
    pub questions: Vec<ExamQuestionDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionDto {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExamQuestionDto {
    pub id: QuestionId,
    pub question_text: String,
    pub question_type: String,
    #[serde(default)]
    pub options: Vec<OptionDto>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub marks: Option<f64>,
    #[serde(default)]
    pub order: u32,
}

impl ExamQuestionDto {
    /// Convert to a validated question. Unknown types are treated as free text
    /// and true/false questions without explicit options get `true`/`false`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the question fails validation.
    pub fn into_question(self) -> Result<Question, QuestionError> {
        let kind = QuestionKind::from_wire(&self.question_type, true)?;
        let options = if kind == QuestionKind::TrueFalse && self.options.is_empty() {
            vec![
                ChoiceOption::new("true", "True"),
                ChoiceOption::new("false", "False"),
            ]
        } else if kind.is_choice() {
            self.options
                .into_iter()
                .map(|o| ChoiceOption::new(o.id.as_str(), o.text))
                .collect()
        } else {
            Vec::new()
        };
        Question::new(
            self.id,
            self.question_text,
            kind,
            options,
            self.marks.unwrap_or(1.0),
            self.order,
        )
    }
}

/// Attempts embed the exam as an object; some views send only its id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExamRef {
    Id(ExamId),
    Summary(Box<ExamSummary>),
}

impl ExamRef {
    #[must_use]
    pub fn id(&self) -> ExamId {
        match self {
            Self::Id(id) => *id,
            Self::Summary(exam) => exam.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptDto {
    pub id: AttemptId,
    pub exam: ExamRef,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub end_time: Option<DateTime<Utc>>,
}

impl AttemptDto {
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status.is_empty() || self.status == "in_progress"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartExamResponse {
    pub attempt: AttemptDto,
    /// Server deadline for the new attempt.
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AnswerPayload {
    pub question_id: QuestionId,
    pub user_answer: Vec<String>,
    pub time_spent_seconds: u32,
}

impl AnswerPayload {
    /// Choice answers send option ids, text answers a one-element list, and
    /// unanswered questions an empty list.
    #[must_use]
    pub fn from_entry(entry: &AnswerEntry) -> Self {
        let user_answer = match entry.answer.as_ref().and_then(|a| a.as_text()) {
            Some(text) => vec![text.to_owned()],
            None => entry.option_ids(),
        };
        Self {
            question_id: entry.question_id,
            user_answer,
            time_spent_seconds: entry.elapsed_secs.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitExamRequest {
    pub answers: Vec<AnswerPayload>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitExamResponse {
    #[serde(default)]
    pub result: Value,
}

//
// ─── INTERVIEWS ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewSummary {
    pub id: InterviewId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interview_type: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub job_role: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub percentage: Option<f64>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub started_at: Option<DateTime<Utc>>,
}

impl InterviewSummary {
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.status == "scheduled"
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == "in_progress"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewEnvelope {
    pub interview: InterviewSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewQuestionDto {
    pub id: QuestionId,
    pub question_text: String,
    #[serde(default)]
    pub order: u32,
}

impl InterviewQuestionDto {
    /// Interview questions are always answered in free text.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` for a blank question.
    pub fn into_question(self) -> Result<Question, QuestionError> {
        Question::new(
            self.id,
            self.question_text,
            QuestionKind::FreeText,
            Vec::new(),
            1.0,
            self.order,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ResponsePayload<'a> {
    pub question_id: QuestionId,
    pub text_response: &'a str,
    pub time_taken_seconds: u32,
}

impl<'a> ResponsePayload<'a> {
    #[must_use]
    pub fn from_entry(entry: &'a AnswerEntry) -> Self {
        Self {
            question_id: entry.question_id,
            text_response: entry.text(),
            time_taken_seconds: entry.elapsed_secs.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteInterviewResponse {
    #[serde(default)]
    pub interview: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSummary {
    pub id: TemplateId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interview_type: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub times_used: u32,
    #[serde(default)]
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
pub struct UseTemplateRequest<'a> {
    pub job_role: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub company_name: &'a str,
}

//
// ─── ANALYTICS ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_activities: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_exams: u32,
    pub exams_passed: u32,
    #[serde(deserialize_with = "flexible_f64")]
    pub exam_pass_rate: Option<f64>,
    #[serde(deserialize_with = "flexible_f64")]
    pub avg_exam_score: Option<f64>,
    pub total_interviews: u32,
    pub interviews_completed: u32,
    #[serde(deserialize_with = "flexible_f64")]
    pub interview_completion_rate: Option<f64>,
    #[serde(deserialize_with = "flexible_f64")]
    pub avg_interview_score: Option<f64>,
    pub recent_activities: Vec<Value>,
    pub weekly_trends: Vec<Value>,
}
