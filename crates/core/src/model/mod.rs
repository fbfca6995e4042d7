mod answer;
mod ids;
mod question;
mod result;
mod session;
mod user;

pub use ids::{
    AttemptId, ExamId, InterviewId, OptionId, ParseIdError, QuestionId, TemplateId, UserId,
};

pub use answer::{Answer, AnswerEntry};
pub use question::{ChoiceOption, Question, QuestionError, QuestionKind};
pub use result::SessionResult;
pub use session::{Deadline, SessionKind, SessionMeta, SessionRef};
pub use user::{AuthState, AuthTokens, UserProfile};
