use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde_json::json;
use tokio::sync::Notify;

use prep_core::model::{
    Answer, AnswerEntry, AttemptId, ChoiceOption, Deadline, ExamId, InterviewId, OptionId,
    Question, QuestionId, QuestionKind, SessionMeta, SessionRef, SessionResult,
};
use prep_core::time::fixed_now;
use prep_core::{PhaseError, SessionPhase, SubmitTrigger};
use services::{
    ApiError, LoadedSession, SessionController, SessionEndpoints, SessionError, SessionOptions,
    SubmitFailure,
};

//
// ─── FAKE BACKEND ─────────────────────────────────────────────────────────────
//

struct FakeEndpoints {
    session: SessionRef,
    questions: Vec<Question>,
    deadline: Deadline,
    finalize_failures: AtomicUsize,
    finalize_delay: Duration,
    fail_autosave: bool,
    /// Held calls wait here before they record anything.
    gate: Option<Arc<Notify>>,
    finalized: Mutex<Vec<Vec<AnswerEntry>>>,
    autosaved: Mutex<Vec<AnswerEntry>>,
}

impl FakeEndpoints {
    fn exam(questions: Vec<Question>, deadline: Deadline) -> Self {
        Self {
            session: SessionRef::Attempt {
                attempt: AttemptId::new(9),
                exam: ExamId::new(2),
            },
            questions,
            deadline,
            finalize_failures: AtomicUsize::new(0),
            finalize_delay: Duration::ZERO,
            fail_autosave: false,
            gate: None,
            finalized: Mutex::new(Vec::new()),
            autosaved: Mutex::new(Vec::new()),
        }
    }

    fn failing_finalize(self, times: usize) -> Self {
        self.finalize_failures.store(times, Ordering::SeqCst);
        self
    }

    fn slow_finalize(mut self, delay: Duration) -> Self {
        self.finalize_delay = delay;
        self
    }

    fn failing_autosave(mut self) -> Self {
        self.fail_autosave = true;
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    fn finalize_calls(&self) -> Vec<Vec<AnswerEntry>> {
        self.finalized.lock().unwrap().clone()
    }

    fn autosave_calls(&self) -> Vec<AnswerEntry> {
        self.autosaved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionEndpoints for FakeEndpoints {
    fn session(&self) -> SessionRef {
        self.session
    }

    async fn load(&self) -> Result<LoadedSession, ApiError> {
        Ok(LoadedSession {
            meta: SessionMeta {
                session: self.session,
                title: "Ownership and borrowing".into(),
                deadline: self.deadline,
            },
            questions: self.questions.clone(),
        })
    }

    async fn autosave(&self, entry: &AnswerEntry) -> Result<(), ApiError> {
        self.pass_gate().await;
        self.autosaved.lock().unwrap().push(entry.clone());
        if self.fail_autosave {
            return Err(ApiError::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn finalize(&self, entries: &[AnswerEntry]) -> Result<SessionResult, ApiError> {
        self.pass_gate().await;
        if !self.finalize_delay.is_zero() {
            tokio::time::sleep(self.finalize_delay).await;
        }
        let failures = self.finalize_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.finalize_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ApiError::Status(503));
        }
        self.finalized.lock().unwrap().push(entries.to_vec());
        let answered = entries.iter().filter(|e| e.is_answered()).count();
        Ok(SessionResult::new(json!({
            "marks_obtained": answered,
            "total_marks": entries.len(),
            "percentage": 100.0 * answered as f64 / entries.len() as f64,
            "is_passed": answered * 2 >= entries.len()
        })))
    }
}

fn qid(n: u64) -> QuestionId {
    QuestionId::new(n)
}

fn abcd() -> Vec<ChoiceOption> {
    ["A", "B", "C", "D"]
        .into_iter()
        .map(|id| ChoiceOption::new(id, format!("option {id}")))
        .collect()
}

/// Five questions: single, multi, true/false, two free text.
fn five_questions() -> Vec<Question> {
    vec![
        Question::new(qid(1), "Who owns a moved value?", QuestionKind::SingleChoice, abcd(), 1.0, 1)
            .unwrap(),
        Question::new(qid(2), "Which types are Copy?", QuestionKind::MultiChoice, abcd(), 2.0, 2)
            .unwrap(),
        Question::new(
            qid(3),
            "A &mut borrow is exclusive.",
            QuestionKind::TrueFalse,
            vec![ChoiceOption::new("true", "True"), ChoiceOption::new("false", "False")],
            1.0,
            3,
        )
        .unwrap(),
        Question::new(qid(4), "Explain lifetimes.", QuestionKind::FreeText, Vec::new(), 3.0, 4)
            .unwrap(),
        Question::new(qid(5), "Explain Send and Sync.", QuestionKind::FreeText, Vec::new(), 3.0, 5)
            .unwrap(),
    ]
}

fn options() -> SessionOptions {
    SessionOptions {
        clock: prep_core::Clock::fixed(fixed_now()),
        ..SessionOptions::default()
    }
}

async fn loaded(fake: Arc<FakeEndpoints>) -> SessionController {
    let controller = SessionController::new(fake, options());
    controller.load().await.unwrap();
    controller
}

async fn wait_until_submitted(controller: &SessionController) {
    let mut phase = controller.watch_phase();
    tokio::time::timeout(
        Duration::from_secs(60),
        phase.wait_for(SessionPhase::is_submitted),
    )
    .await
    .expect("session should submit")
    .unwrap();
}

//
// ─── SCENARIOS ────────────────────────────────────────────────────────────────
//

#[tokio::test(start_paused = true)]
async fn timer_expiry_submits_all_entries_once() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Remaining(3)));
    let controller = loaded(Arc::clone(&fake)).await;

    controller.set_answer(qid(1), Answer::choice("B")).unwrap();
    controller.toggle_option(qid(2), OptionId::new("A")).unwrap();
    controller
        .set_answer(qid(4), Answer::text("Lifetimes bound references."))
        .unwrap();

    wait_until_submitted(&controller).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let calls = fake.finalize_calls();
    assert_eq!(calls.len(), 1);
    let entries = &calls[0];
    assert_eq!(entries.len(), 5);
    assert_eq!(entries.iter().filter(|e| !e.is_answered()).count(), 2);
    let ids: Vec<QuestionId> = entries.iter().map(|e| e.question_id).collect();
    assert_eq!(ids, vec![qid(1), qid(2), qid(3), qid(4), qid(5)]);

    assert_eq!(controller.phase(), SessionPhase::Submitted);
    let result = controller.result().unwrap();
    assert_eq!(result.score(), Some(3.0));
    assert_eq!(controller.remaining_secs(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn user_submit_stops_the_countdown() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Remaining(5)));
    let controller = loaded(Arc::clone(&fake)).await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let result = controller.submit(SubmitTrigger::User).await.unwrap();
    assert_eq!(result.passed(), Some(false));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fake.finalize_calls().len(), 1);
    assert_eq!(controller.remaining_secs(), Some(3));
}

#[tokio::test(start_paused = true)]
async fn failed_submit_keeps_answers_and_allows_retry() {
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Unlimited).failing_finalize(1),
    );
    let controller = loaded(Arc::clone(&fake)).await;
    controller.set_answer(qid(3), Answer::choice("true")).unwrap();
    controller.set_answer(qid(5), Answer::text("markers")).unwrap();

    let err = controller.submit(SubmitTrigger::User).await.unwrap_err();
    assert!(matches!(err, SessionError::Api(ApiError::Status(503))));
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.answer(qid(3)), Some(Answer::choice("true")));
    assert_eq!(controller.answer(qid(5)), Some(Answer::text("markers")));
    assert_eq!(controller.progress().answered, 2);

    controller.set_answer(qid(4), Answer::text("edited after failure")).unwrap();
    controller.submit(SubmitTrigger::User).await.unwrap();
    let calls = fake.finalize_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].iter().filter(|e| e.is_answered()).count(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_timer_submit_is_reported_and_can_be_retried() {
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Remaining(2)).failing_finalize(1),
    );
    let controller = loaded(Arc::clone(&fake)).await;
    controller.set_answer(qid(1), Answer::choice("C")).unwrap();
    assert_eq!(controller.take_submit_failure(), None);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert!(fake.finalize_calls().is_empty());
    let failure = controller.take_submit_failure().unwrap();
    assert_eq!(
        failure,
        SubmitFailure {
            trigger: SubmitTrigger::Timer,
            message: SessionError::Api(ApiError::Status(503)).user_message(),
        }
    );
    assert_eq!(controller.take_submit_failure(), None);
    assert_eq!(controller.answer(qid(1)), Some(Answer::choice("C")));

    controller.submit(SubmitTrigger::User).await.unwrap();
    assert_eq!(fake.finalize_calls().len(), 1);
    assert_eq!(controller.take_submit_failure(), None);
}

#[tokio::test(start_paused = true)]
async fn second_submit_is_rejected_while_one_is_in_flight() {
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Unlimited)
            .slow_finalize(Duration::from_secs(2)),
    );
    let controller = loaded(Arc::clone(&fake)).await;

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit(SubmitTrigger::User).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(
        controller.phase(),
        SessionPhase::Submitting(SubmitTrigger::User)
    );

    let second = controller.submit(SubmitTrigger::User).await;
    assert!(matches!(
        second,
        Err(SessionError::Phase(PhaseError::SubmitInFlight))
    ));
    assert!(matches!(
        controller.set_answer(qid(1), Answer::choice("A")),
        Err(SessionError::Phase(PhaseError::SubmitInFlight))
    ));

    first.await.unwrap().unwrap();
    assert_eq!(fake.finalize_calls().len(), 1);
    assert!(controller.phase().is_submitted());
}

#[tokio::test(start_paused = true)]
async fn timer_expiring_during_user_submit_does_not_submit_twice() {
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Remaining(1))
            .slow_finalize(Duration::from_secs(3)),
    );
    let controller = loaded(Arc::clone(&fake)).await;

    let user = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit(SubmitTrigger::User).await }
    });
    tokio::time::sleep(Duration::from_secs(5)).await;

    user.await.unwrap().unwrap();
    assert_eq!(fake.finalize_calls().len(), 1);
    assert!(controller.phase().is_submitted());
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_the_countdown() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Remaining(2)));
    let controller = loaded(Arc::clone(&fake)).await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    controller.teardown();
    controller.teardown();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(fake.finalize_calls().is_empty());
    assert_eq!(controller.phase(), SessionPhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn teardown_abandons_pending_autosaves() {
    let gate = Arc::new(Notify::new());
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Unlimited).gated(Arc::clone(&gate)),
    );
    let controller = loaded(Arc::clone(&fake)).await;

    controller.set_answer(qid(4), Answer::text("half written")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.teardown();
    gate.notify_waiters();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(fake.autosave_calls().is_empty());
    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.answer(qid(4)), Some(Answer::text("half written")));
}

#[tokio::test(start_paused = true)]
async fn teardown_during_submit_closes_it_and_keeps_answers() {
    let gate = Arc::new(Notify::new());
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Unlimited).gated(Arc::clone(&gate)),
    );
    let controller = SessionController::new(
        Arc::clone(&fake) as Arc<dyn SessionEndpoints>,
        SessionOptions {
            autosave: false,
            ..options()
        },
    );
    controller.load().await.unwrap();
    controller.set_answer(qid(1), Answer::choice("A")).unwrap();

    let submit = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit(SubmitTrigger::User).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(
        controller.phase(),
        SessionPhase::Submitting(SubmitTrigger::User)
    );

    controller.teardown();
    assert!(matches!(submit.await.unwrap(), Err(SessionError::Closed)));
    gate.notify_waiters();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(controller.phase(), SessionPhase::InProgress);
    assert_eq!(controller.answer(qid(1)), Some(Answer::choice("A")));
    assert!(fake.finalize_calls().is_empty());
    assert!(controller.result().is_none());
}

#[tokio::test(start_paused = true)]
async fn past_deadline_submits_immediately() {
    let deadline = Deadline::At(fixed_now() - ChronoDuration::seconds(30));
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), deadline));
    let controller = loaded(Arc::clone(&fake)).await;

    wait_until_submitted(&controller).await;
    assert_eq!(fake.finalize_calls().len(), 1);
    assert_eq!(fake.finalize_calls()[0].len(), 5);
}

#[tokio::test(start_paused = true)]
async fn absolute_deadline_counts_from_the_clock() {
    let deadline = Deadline::At(fixed_now() + ChronoDuration::minutes(4));
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), deadline));
    let controller = loaded(fake).await;

    let progress = controller.progress();
    assert_eq!(progress.remaining_secs, Some(240));
    assert_eq!(progress.clock().as_deref(), Some("4:00"));
    assert_eq!(progress.urgency(), Some(prep_core::Urgency::Warning));
    controller.teardown();
}

//
// ─── ANSWERS & NAVIGATION ─────────────────────────────────────────────────────
//

#[tokio::test(start_paused = true)]
async fn toggling_the_same_option_twice_is_a_no_op() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(fake).await;

    controller.toggle_option(qid(2), OptionId::new("C")).unwrap();
    let before = controller.answer(qid(2));
    controller.toggle_option(qid(2), OptionId::new("D")).unwrap();
    let after = controller.toggle_option(qid(2), OptionId::new("D")).unwrap();
    assert_eq!(after, before);
    assert_eq!(controller.answer(qid(2)), Some(Answer::choice("C")));

    let cleared = controller.toggle_option(qid(2), OptionId::new("C")).unwrap();
    assert_eq!(cleared, None);
    assert_eq!(controller.progress().answered, 0);
}

#[tokio::test(start_paused = true)]
async fn latest_write_wins() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(Arc::clone(&fake)).await;

    controller.set_answer(qid(1), Answer::choice("A")).unwrap();
    controller.toggle_option(qid(1), OptionId::new("D")).unwrap();
    controller.set_answer(qid(4), Answer::text("first")).unwrap();
    controller.set_answer(qid(4), Answer::text("second")).unwrap();
    controller.set_answer(qid(5), Answer::text("gone")).unwrap();
    controller.clear_answer(qid(5)).unwrap();

    assert_eq!(controller.answer(qid(1)), Some(Answer::choice("D")));
    assert_eq!(controller.answer(qid(4)), Some(Answer::text("second")));
    assert_eq!(controller.answer(qid(5)), None);

    controller.submit(SubmitTrigger::User).await.unwrap();
    let entries = &fake.finalize_calls()[0];
    assert_eq!(entries[0].option_ids(), vec!["D".to_owned()]);
    assert_eq!(entries[3].text(), "second");
    assert!(!entries[4].is_answered());
}

#[tokio::test(start_paused = true)]
async fn invalid_answers_are_rejected() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(fake).await;

    assert!(matches!(
        controller.set_answer(qid(1), Answer::text("free text on a choice")),
        Err(SessionError::Buffer(_))
    ));
    assert!(matches!(
        controller.toggle_option(qid(1), OptionId::new("Z")),
        Err(SessionError::Buffer(_))
    ));
    assert!(matches!(
        controller.set_answer(qid(99), Answer::choice("A")),
        Err(SessionError::Buffer(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn edits_are_rejected_after_submission() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(fake).await;
    controller.submit(SubmitTrigger::User).await.unwrap();

    assert!(matches!(
        controller.set_answer(qid(4), Answer::text("late")),
        Err(SessionError::Phase(PhaseError::AlreadySubmitted))
    ));
    assert!(matches!(
        controller.submit(SubmitTrigger::User).await,
        Err(SessionError::Phase(PhaseError::AlreadySubmitted))
    ));
}

#[tokio::test(start_paused = true)]
async fn navigation_keeps_position_in_range_and_tracks_time() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(Arc::clone(&fake)).await;

    assert_eq!(controller.previous().unwrap(), 0);
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(controller.next().unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(controller.go_to(4).unwrap(), 4);
    assert_eq!(controller.next().unwrap(), 4);
    assert!(matches!(
        controller.go_to(5),
        Err(SessionError::OutOfRange { index: 5, len: 5 })
    ));
    assert_eq!(controller.current().unwrap().1.id(), qid(5));

    controller.submit(SubmitTrigger::User).await.unwrap();
    let entries = &fake.finalize_calls()[0];
    assert_eq!(entries[0].elapsed_secs, Some(7));
    assert_eq!(entries[1].elapsed_secs, Some(4));
    assert_eq!(entries[2].elapsed_secs, None);
}

#[tokio::test(start_paused = true)]
async fn autosave_failures_are_swallowed() {
    let fake = Arc::new(
        FakeEndpoints::exam(five_questions(), Deadline::Unlimited).failing_autosave(),
    );
    let controller = loaded(Arc::clone(&fake)).await;

    controller.set_answer(qid(1), Answer::choice("A")).unwrap();
    controller.set_answer(qid(4), Answer::text("draft")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let saved = fake.autosave_calls();
    assert_eq!(saved.len(), 2);
    assert_eq!(controller.answer(qid(1)), Some(Answer::choice("A")));
    controller.submit(SubmitTrigger::User).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn autosave_can_be_disabled() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = SessionController::new(
        Arc::clone(&fake) as Arc<dyn SessionEndpoints>,
        SessionOptions {
            autosave: false,
            ..options()
        },
    );
    controller.load().await.unwrap();
    controller.set_answer(qid(4), Answer::text("no network")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(fake.autosave_calls().is_empty());
}

//
// ─── LOADING ──────────────────────────────────────────────────────────────────
//

#[tokio::test(start_paused = true)]
async fn empty_session_stays_loading() {
    let fake = Arc::new(FakeEndpoints::exam(Vec::new(), Deadline::Unlimited));
    let controller = SessionController::new(fake, options());

    assert!(matches!(controller.load().await, Err(SessionError::Empty)));
    assert_eq!(controller.phase(), SessionPhase::Loading);
    assert!(matches!(
        controller.set_answer(qid(1), Answer::choice("A")),
        Err(SessionError::Phase(PhaseError::NotLoaded))
    ));
    assert!(matches!(
        controller.submit(SubmitTrigger::User).await,
        Err(SessionError::Phase(PhaseError::NotLoaded))
    ));
}

#[tokio::test(start_paused = true)]
async fn loading_twice_is_rejected() {
    let fake = Arc::new(FakeEndpoints::exam(five_questions(), Deadline::Unlimited));
    let controller = loaded(fake).await;
    assert!(matches!(
        controller.load().await,
        Err(SessionError::Phase(PhaseError::AlreadyLoaded))
    ));
    assert_eq!(controller.progress().remaining_secs, None);
}

#[tokio::test(start_paused = true)]
async fn interview_sessions_share_the_controller() {
    let mut fake = FakeEndpoints::exam(
        vec![
            Question::new(qid(11), "Tell me about yourself.", QuestionKind::FreeText, Vec::new(), 1.0, 2)
                .unwrap(),
            Question::new(qid(10), "Why Rust?", QuestionKind::FreeText, Vec::new(), 1.0, 1)
                .unwrap(),
        ],
        Deadline::from_minutes(30),
    );
    fake.session = SessionRef::Interview(InterviewId::new(4));
    let fake = Arc::new(fake);
    let controller = loaded(Arc::clone(&fake)).await;

    assert_eq!(controller.current().unwrap().1.id(), qid(10));
    assert_eq!(controller.progress().remaining_secs, Some(1_800));
    controller.set_answer(qid(10), Answer::text("Memory safety.")).unwrap();
    controller.submit(SubmitTrigger::User).await.unwrap();

    let entries = &fake.finalize_calls()[0];
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].text(), "Memory safety.");
    assert_eq!(entries[1].text(), "");
}
