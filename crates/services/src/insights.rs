use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use prep_core::model::{AttemptId, InterviewId, SessionRef, SessionResult};

use crate::api::ApiClient;
use crate::api::dto::DashboardSummary;
use crate::error::ApiError;

/// Bucket size of performance trends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendPeriod {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl TrendPeriod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown period {other:?} (daily, weekly, monthly)")),
        }
    }
}

/// Scored results and analytics. All payloads are computed server-side.
#[derive(Clone)]
pub struct InsightsService {
    api: Arc<ApiClient>,
}

impl InsightsService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn exam_results(&self, attempt: AttemptId) -> Result<SessionResult, ApiError> {
        let raw: Value = self.api.get(&format!("attempts/{attempt}/results/")).await?;
        Ok(SessionResult::new(raw))
    }

    /// # Errors
    ///
    /// Returns `ApiError::Validation` while the interview is not completed,
    /// or another `ApiError` if the request fails.
    pub async fn interview_results(
        &self,
        interview: InterviewId,
    ) -> Result<SessionResult, ApiError> {
        let raw: Value = self
            .api
            .get(&format!("interviews/{interview}/results/"))
            .await?;
        Ok(SessionResult::new(raw))
    }

    /// Results of any finished session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn results(&self, session: SessionRef) -> Result<SessionResult, ApiError> {
        match session {
            SessionRef::Attempt { attempt, .. } => self.exam_results(attempt).await,
            SessionRef::Interview(id) => self.interview_results(id).await,
        }
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn dashboard(&self) -> Result<DashboardSummary, ApiError> {
        self.api.get("analytics/dashboard/").await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn exam_stats(&self) -> Result<Value, ApiError> {
        self.api.get("analytics/exam_stats/").await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn interview_stats(&self) -> Result<Value, ApiError> {
        self.api.get("analytics/interview_stats/").await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn performance_trends(&self, period: TrendPeriod) -> Result<Value, ApiError> {
        self.api
            .get_query(
                "analytics/performance_trends/",
                &[("period", period.as_str())],
            )
            .await
    }
}
