use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use prep_core::model::{
    Answer, AnswerEntry, OptionId, Question, QuestionId, SessionMeta, SessionRef, SessionResult,
};
use prep_core::{
    AnswerBuffer, Clock, PhaseError, SessionPhase, SubmitTrigger, Urgency, format_clock,
};

use crate::error::SessionError;
use crate::session::endpoints::{LoadedSession, SessionEndpoints};
use crate::session::timer::CountdownTimer;

/// Tunables for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Save each answer as soon as it changes.
    pub autosave: bool,
    /// Wall clock used to turn absolute deadlines into remaining seconds.
    pub clock: Clock,
    /// Countdown period; one second outside tests.
    pub tick: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autosave: true,
            clock: Clock::System,
            tick: Duration::from_secs(1),
        }
    }
}

/// Point-in-time view of a session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub phase: SessionPhase,
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    /// `None` for untimed sessions.
    pub remaining_secs: Option<u32>,
}

impl Progress {
    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn urgency(&self) -> Option<Urgency> {
        self.remaining_secs.map(Urgency::for_remaining)
    }

    /// Remaining time as `m:ss`.
    #[must_use]
    pub fn clock(&self) -> Option<String> {
        self.remaining_secs.map(format_clock)
    }
}

/// A submission that failed and left the session editable again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitFailure {
    pub trigger: SubmitTrigger,
    /// Readable cause, suitable for showing as is.
    pub message: String,
}

struct State {
    phase: SessionPhase,
    meta: Option<SessionMeta>,
    questions: Vec<Question>,
    buffer: AnswerBuffer,
    position: usize,
    position_since: Instant,
    result: Option<SessionResult>,
    last_failure: Option<SubmitFailure>,
}

impl State {
    fn current_id(&self) -> Option<QuestionId> {
        self.questions.get(self.position).map(Question::id)
    }

    /// Credit whole seconds spent on the current question, carrying the
    /// sub-second remainder forward.
    fn settle_elapsed(&mut self, now: Instant) {
        let spent = now.saturating_duration_since(self.position_since).as_secs();
        if spent == 0 {
            return;
        }
        if let Some(id) = self.current_id() {
            self.buffer
                .record_elapsed(id, u32::try_from(spent).unwrap_or(u32::MAX));
        }
        self.position_since += Duration::from_secs(spent);
    }
}

struct Inner {
    endpoints: Arc<dyn SessionEndpoints>,
    options: SessionOptions,
    cancel: CancellationToken,
    state: Mutex<State>,
    timer: Mutex<Option<CountdownTimer>>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One timed answer session, exam attempt or interview.
///
/// Cheap to clone; clones share state. All state transitions happen under a
/// lock that is never held across an `.await`, so the countdown and a user
/// submit can race safely: only one of them claims the submission.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    #[must_use]
    pub fn new(endpoints: Arc<dyn SessionEndpoints>, options: SessionOptions) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Loading);
        Self {
            inner: Arc::new(Inner {
                endpoints,
                options,
                cancel: CancellationToken::new(),
                state: Mutex::new(State {
                    phase: SessionPhase::Loading,
                    meta: None,
                    questions: Vec::new(),
                    buffer: AnswerBuffer::new(&[]),
                    position: 0,
                    position_since: Instant::now(),
                    result: None,
                    last_failure: None,
                }),
                timer: Mutex::new(None),
                phase_tx,
            }),
        }
    }

    #[must_use]
    pub fn session(&self) -> SessionRef {
        self.inner.endpoints.session()
    }

    //
    // ─── LIFECYCLE ────────────────────────────────────────────────────────────
    //

    /// Fetch the session and start its countdown. A failed load leaves the
    /// session in `Loading` so it can be retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` for a session without questions,
    /// `SessionError::Api` if fetching fails, and `SessionError::Phase` if the
    /// session was already loaded.
    pub async fn load(&self) -> Result<Progress, SessionError> {
        if self.state().phase != SessionPhase::Loading {
            return Err(PhaseError::AlreadyLoaded.into());
        }

        let loaded = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => return Err(SessionError::Closed),
            loaded = self.inner.endpoints.load() => loaded?,
        };
        let LoadedSession {
            meta,
            mut questions,
        } = loaded;
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        questions.sort_by_key(Question::order);
        let remaining = self.inner.options.clock.remaining_secs(&meta.deadline);

        {
            let mut state = self.state();
            state.phase.loaded()?;
            state.buffer = AnswerBuffer::new(&questions);
            state.questions = questions;
            state.meta = Some(meta.clone());
            state.position = 0;
            state.position_since = Instant::now();
            self.publish(state.phase);
        }
        tracing::info!(
            session = %meta.session,
            title = %meta.title,
            remaining_secs = ?remaining,
            "session loaded"
        );

        if let Some(secs) = remaining {
            self.start_timer(secs);
        }
        Ok(self.progress())
    }

    /// Flush every answer and close the session.
    ///
    /// Only one submission can be in flight. On failure the session returns
    /// to `InProgress` with its answers untouched and may be submitted again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Phase` if the session is not in progress (a
    /// concurrent submit included), `SessionError::Api` if the backend call
    /// fails, and `SessionError::Closed` if the session is torn down meanwhile.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SessionResult, SessionError> {
        let (session, entries) = {
            let mut state = self.state();
            state.phase.begin_submit(trigger)?;
            state.last_failure = None;
            state.settle_elapsed(Instant::now());
            self.publish(state.phase);
            let entries = state.buffer.flush_entries(&state.questions);
            (self.session(), entries)
        };
        tracing::info!(
            %session,
            ?trigger,
            entries = entries.len(),
            answered = entries.iter().filter(|e| e.is_answered()).count(),
            "submitting session"
        );

        let outcome = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(SessionError::Closed),
            result = self.inner.endpoints.finalize(&entries) => result.map_err(SessionError::from),
        };

        let mut state = self.state();
        match outcome {
            Ok(result) => {
                state.phase.submit_succeeded()?;
                state.result = Some(result.clone());
                self.publish(state.phase);
                drop(state);
                self.stop_timer();
                tracing::info!(%session, "session submitted");
                Ok(result)
            }
            Err(err) => {
                state.phase.submit_failed()?;
                state.last_failure = Some(SubmitFailure {
                    trigger,
                    message: err.user_message(),
                });
                self.publish(state.phase);
                tracing::warn!(%session, error = %err, "submission failed; answers kept");
                Err(err)
            }
        }
    }

    /// Stop the countdown and abandon in-flight autosaves. Safe to call more
    /// than once; no callbacks run afterwards.
    pub fn teardown(&self) {
        if !self.inner.cancel.is_cancelled() {
            tracing::debug!(session = %self.session(), "session torn down");
        }
        self.inner.cancel.cancel();
    }

    //
    // ─── ANSWERS ──────────────────────────────────────────────────────────────
    //

    /// Replace the answer for `question`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Phase` unless in progress and
    /// `SessionError::Buffer` if the answer does not fit the question.
    pub fn set_answer(&self, question: QuestionId, answer: Answer) -> Result<(), SessionError> {
        let entry = {
            let mut state = self.state();
            state.phase.ensure_editable()?;
            state.buffer.set_answer(question, answer)?;
            state.settle_elapsed(Instant::now());
            state.buffer.entry(question)
        };
        self.schedule_autosave(entry);
        Ok(())
    }

    /// Toggle (multi-choice) or select (single-choice) an option.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Phase` unless in progress and
    /// `SessionError::Buffer` for unknown questions or options.
    pub fn toggle_option(
        &self,
        question: QuestionId,
        option: OptionId,
    ) -> Result<Option<Answer>, SessionError> {
        let (answer, entry) = {
            let mut state = self.state();
            state.phase.ensure_editable()?;
            let answer = state.buffer.toggle_option(question, option)?.cloned();
            state.settle_elapsed(Instant::now());
            (answer, state.buffer.entry(question))
        };
        self.schedule_autosave(entry);
        Ok(answer)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Phase` unless in progress and
    /// `SessionError::Buffer` for unknown questions.
    pub fn clear_answer(&self, question: QuestionId) -> Result<(), SessionError> {
        let entry = {
            let mut state = self.state();
            state.phase.ensure_editable()?;
            state.buffer.clear_answer(question)?;
            state.buffer.entry(question)
        };
        self.schedule_autosave(entry);
        Ok(())
    }

    #[must_use]
    pub fn answer(&self, question: QuestionId) -> Option<Answer> {
        self.state().buffer.get_answer(question).cloned()
    }

    //
    // ─── NAVIGATION ───────────────────────────────────────────────────────────
    //

    /// Move to `index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfRange` for an invalid index and
    /// `SessionError::Phase` before the session is loaded.
    pub fn go_to(&self, index: usize) -> Result<usize, SessionError> {
        let mut state = self.state();
        if state.phase == SessionPhase::Loading {
            return Err(PhaseError::NotLoaded.into());
        }
        let len = state.questions.len();
        if index >= len {
            return Err(SessionError::OutOfRange { index, len });
        }
        state.settle_elapsed(Instant::now());
        state.position = index;
        Ok(index)
    }

    /// Advance one question; stays on the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Phase` before the session is loaded.
    pub fn next(&self) -> Result<usize, SessionError> {
        self.step(|position, len| (position + 1).min(len - 1))
    }

    /// Go back one question; stays on the first one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Phase` before the session is loaded.
    pub fn previous(&self) -> Result<usize, SessionError> {
        self.step(|position, _| position.saturating_sub(1))
    }

    fn step(&self, to: impl FnOnce(usize, usize) -> usize) -> Result<usize, SessionError> {
        let mut state = self.state();
        if state.phase == SessionPhase::Loading || state.questions.is_empty() {
            return Err(PhaseError::NotLoaded.into());
        }
        let target = to(state.position, state.questions.len());
        if target != state.position {
            state.settle_elapsed(Instant::now());
            state.position = target;
        }
        Ok(target)
    }

    //
    // ─── VIEWS ────────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    /// Receiver notified on every phase change, e.g. an automatic submit.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase_tx.subscribe()
    }

    #[must_use]
    pub fn meta(&self) -> Option<SessionMeta> {
        self.state().meta.clone()
    }

    #[must_use]
    pub fn questions(&self) -> Vec<Question> {
        self.state().questions.clone()
    }

    /// The question at the current position with its index.
    #[must_use]
    pub fn current(&self) -> Option<(usize, Question)> {
        let state = self.state();
        state
            .questions
            .get(state.position)
            .map(|q| (state.position, q.clone()))
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.timer().as_ref().map(CountdownTimer::remaining)
    }

    /// Receiver for countdown ticks; `None` for untimed or unloaded sessions.
    #[must_use]
    pub fn watch_remaining(&self) -> Option<watch::Receiver<u32>> {
        self.timer().as_ref().map(CountdownTimer::subscribe)
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        let remaining_secs = self.remaining_secs();
        let state = self.state();
        Progress {
            phase: state.phase,
            position: state.position,
            total: state.questions.len(),
            answered: state.buffer.answered_count(),
            remaining_secs,
        }
    }

    /// Take the most recent submit failure, if it was not taken yet.
    ///
    /// Lets a front end report an automatic submit that failed while it was
    /// not awaiting the call itself.
    #[must_use]
    pub fn take_submit_failure(&self) -> Option<SubmitFailure> {
        self.state().last_failure.take()
    }

    /// Result of a successful submission.
    #[must_use]
    pub fn result(&self) -> Option<SessionResult> {
        self.state().result.clone()
    }

    //
    // ─── INTERNALS ────────────────────────────────────────────────────────────
    //

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<CountdownTimer>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, phase: SessionPhase) {
        self.inner.phase_tx.send_replace(phase);
    }

    fn start_timer(&self, secs: u32) {
        let weak = Arc::downgrade(&self.inner);
        let timer = CountdownTimer::with_period(
            secs,
            self.inner.options.tick,
            self.inner.cancel.child_token(),
            move || async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let controller = SessionController { inner };
                tracing::info!(session = %controller.session(), "time is up; submitting");
                match controller.submit(SubmitTrigger::Timer).await {
                    Ok(_) | Err(SessionError::Closed) => {}
                    Err(SessionError::Phase(err)) => {
                        tracing::debug!(error = %err, "automatic submit skipped");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "automatic submit failed");
                    }
                }
            },
        );
        *self.timer() = Some(timer);
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.timer().as_ref() {
            timer.cancel();
        }
    }

    fn schedule_autosave(&self, entry: AnswerEntry) {
        if !self.inner.options.autosave {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!("no runtime; autosave skipped");
            return;
        };
        let endpoints = Arc::clone(&self.inner.endpoints);
        let cancel = self.inner.cancel.clone();
        runtime.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                result = endpoints.autosave(&entry) => {
                    if let Err(err) = result {
                        tracing::warn!(
                            session = %endpoints.session(),
                            question = %entry.question_id,
                            error = %err,
                            "autosave failed"
                        );
                    }
                }
            }
        });
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = self.progress();
        f.debug_struct("SessionController")
            .field("session", &self.session())
            .field("phase", &progress.phase)
            .field("position", &progress.position)
            .field("total", &progress.total)
            .field("answered", &progress.answered)
            .finish_non_exhaustive()
    }
}
