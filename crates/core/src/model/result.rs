use serde_json::Value;

/// Server-computed outcome of a submitted session.
///
/// The client never interprets scoring rules; it keeps the payload as-is and
/// only reads a few aggregate fields for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    raw: Value,
}

impl SessionResult {
    #[must_use]
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    #[must_use]
    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Obtained score: `marks_obtained` for exams, `total_score` for interviews.
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.number("marks_obtained")
            .or_else(|| self.number("total_score"))
    }

    /// Maximum score: `total_marks` for exams, `max_score` for interviews.
    #[must_use]
    pub fn max_score(&self) -> Option<f64> {
        self.number("total_marks").or_else(|| self.number("max_score"))
    }

    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        self.number("percentage")
    }

    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        self.raw.get("is_passed").and_then(Value::as_bool)
    }

    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.raw.get("overall_feedback").and_then(Value::as_str)
    }

    // Decimal fields arrive as strings from the backend serializers.
    fn number(&self, key: &str) -> Option<f64> {
        match self.raw.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_exam_aggregates() {
        let result = SessionResult::new(json!({
            "marks_obtained": "7.50",
            "total_marks": 10,
            "percentage": 75.0,
            "is_passed": true
        }));
        assert_eq!(result.score(), Some(7.5));
        assert_eq!(result.max_score(), Some(10.0));
        assert_eq!(result.percentage(), Some(75.0));
        assert_eq!(result.passed(), Some(true));
    }

    #[test]
    fn reads_interview_aggregates() {
        let result = SessionResult::new(json!({
            "total_score": 32,
            "max_score": 50,
            "overall_feedback": "Solid answers"
        }));
        assert_eq!(result.score(), Some(32.0));
        assert_eq!(result.max_score(), Some(50.0));
        assert_eq!(result.passed(), None);
        assert_eq!(result.feedback(), Some("Solid answers"));
    }
}
