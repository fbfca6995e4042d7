//! Terminal front end for a timed session.

use std::error::Error;
use std::io::{self, IsTerminal as _, Write as _};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use prep_core::model::{Answer, OptionId, Question, SessionResult, UserProfile};
use prep_core::{SessionPhase, SubmitTrigger, format_clock};
use services::{Progress, SessionController, SubmitFailure};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;

/// Line-oriented stdin.
pub struct Input {
    lines: Lines<BufReader<Stdin>>,
}

impl Input {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next line; `None` at end of input. Cancel safe.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.lines.next_line().await
    }

    /// Print `label` and read one trimmed line (empty at end of input).
    pub async fn ask(&mut self, label: &str) -> io::Result<String> {
        print!("{label}");
        io::stdout().flush()?;
        Ok(self
            .next_line()
            .await?
            .map(|line| line.trim().to_owned())
            .unwrap_or_default())
    }

    /// Like [`Self::ask`], but typed characters are not echoed when stdin is
    /// a terminal. Piped input is read as a plain line.
    pub async fn ask_secret(&mut self, label: &str) -> io::Result<String> {
        if !io::stdin().is_terminal() {
            return self.ask(label).await;
        }
        print!("{label}");
        io::stdout().flush()?;
        let secret = tokio::task::spawn_blocking(read_hidden)
            .await
            .map_err(io::Error::other)??;
        println!();
        Ok(secret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Done,
    Cancelled,
}

fn read_hidden() -> io::Result<String> {
    terminal::enable_raw_mode()?;
    let secret = read_keys();
    terminal::disable_raw_mode()?;
    secret
}

fn read_keys() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match secret_key(&mut secret, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Done => return Ok(secret),
            KeyOutcome::Cancelled => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "input cancelled"));
            }
        }
    }
}

fn secret_key(secret: &mut String, key: KeyEvent) -> KeyOutcome {
    if key.kind == KeyEventKind::Release {
        return KeyOutcome::Continue;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => KeyOutcome::Done,
        KeyCode::Esc => KeyOutcome::Cancelled,
        KeyCode::Char('c' | 'd') if ctrl => KeyOutcome::Cancelled,
        KeyCode::Backspace => {
            secret.pop();
            KeyOutcome::Continue
        }
        KeyCode::Char(c) if !ctrl => {
            secret.push(c);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Show,
    Next,
    Previous,
    GoTo(usize),
    Toggle(Vec<OptionId>),
    Write(String),
    Clear,
    List,
    Submit,
    Quit,
    Help,
    Unknown(String),
}

impl Action {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));
        match word {
            "" => Self::Show,
            "n" | "next" => Self::Next,
            "p" | "prev" | "previous" => Self::Previous,
            "g" | "go" => match rest.parse::<usize>() {
                Ok(number) if number > 0 => Self::GoTo(number - 1),
                _ => Self::Unknown(line.to_owned()),
            },
            "o" | "opt" | "option" if !rest.is_empty() => Self::Toggle(
                rest.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|s| !s.is_empty())
                    .map(OptionId::new)
                    .collect(),
            ),
            "w" | "write" => Self::Write(rest.to_owned()),
            "c" | "clear" => Self::Clear,
            "l" | "list" => Self::List,
            "s" | "submit" => Self::Submit,
            "q" | "quit" => Self::Quit,
            "h" | "help" | "?" => Self::Help,
            _ => Self::Unknown(line.to_owned()),
        }
    }
}

fn print_help() {
    println!("  n / p            next / previous question");
    println!("  g <number>       go to question");
    println!("  o <id> [<id>..]  select (or toggle, for multiple choice) options");
    println!("  w <text>         write a text answer");
    println!("  c                clear this answer");
    println!("  l                list all questions");
    println!("  s                submit");
    println!("  q                leave without submitting");
}

/// Load the session and drive it from stdin until it is submitted or left.
///
/// Answers are saved as they change, so leaving keeps them on the server for
/// a later `resume`.
pub async fn run_session(
    controller: SessionController,
    input: &mut Input,
) -> Result<Option<SessionResult>, Box<dyn Error>> {
    let progress = controller.load().await.map_err(|e| e.user_message())?;
    if let Some(meta) = controller.meta() {
        println!("== {} ==", meta.title);
    }
    match progress.clock() {
        Some(clock) => println!("{} questions, {clock} left.", progress.total),
        None => println!("{} questions, no time limit.", progress.total),
    }
    println!("Type `h` for help.");
    show_current(&controller);

    let mut phase_rx = controller.watch_phase();
    let mut remaining_rx = controller.watch_remaining();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                controller.teardown();
                println!();
                println!("Left the session; saved answers are kept.");
                return Ok(None);
            }
            changed = phase_rx.changed() => {
                if changed.is_err() {
                    return Ok(None);
                }
                let phase = *phase_rx.borrow_and_update();
                match phase {
                    SessionPhase::Submitting(SubmitTrigger::Timer) => {
                        println!();
                        println!("Time is up. Submitting your answers...");
                    }
                    SessionPhase::InProgress => {
                        let failure = controller.take_submit_failure();
                        if let Some(notice) = failure.as_ref().and_then(failure_notice) {
                            println!("{notice}");
                        }
                    }
                    SessionPhase::Submitted => {
                        let result = controller.result();
                        if let Some(result) = &result {
                            print_result(result);
                        }
                        return Ok(result);
                    }
                    _ => {}
                }
            }
            left = next_tick(&mut remaining_rx) => announce(left),
            line = input.next_line() => {
                let Some(line) = line? else {
                    controller.teardown();
                    return Ok(None);
                };
                match Action::parse(&line) {
                    Action::Submit => {
                        if let Some(result) = submit(&controller, input).await? {
                            print_result(&result);
                            return Ok(Some(result));
                        }
                    }
                    Action::Quit => {
                        controller.teardown();
                        println!("Left the session; saved answers are kept.");
                        return Ok(None);
                    }
                    action => apply(&controller, action),
                }
            }
        }
    }
}

async fn submit(
    controller: &SessionController,
    input: &mut Input,
) -> Result<Option<SessionResult>, Box<dyn Error>> {
    let unanswered = controller.progress().unanswered();
    if unanswered > 0 {
        let confirm = input
            .ask(&format!("{unanswered} unanswered. Submit anyway? [y/N] "))
            .await?;
        if !confirm.eq_ignore_ascii_case("y") {
            return Ok(None);
        }
    }
    match controller.submit(SubmitTrigger::User).await {
        Ok(result) => Ok(Some(result)),
        Err(err) => {
            println!("{} Your answers are kept; type `s` to retry.", err.user_message());
            Ok(None)
        }
    }
}

/// Message for a submit nobody was waiting on; user submits report their own.
fn failure_notice(failure: &SubmitFailure) -> Option<String> {
    match failure.trigger {
        SubmitTrigger::Timer => Some(format!(
            "Automatic submit failed: {} Your answers are kept; type `s` to retry.",
            failure.message
        )),
        SubmitTrigger::User => None,
    }
}

fn apply(controller: &SessionController, action: Action) {
    let outcome = match action {
        Action::Show => Ok(()),
        Action::Next => controller.next().map(drop),
        Action::Previous => controller.previous().map(drop),
        Action::GoTo(index) => controller.go_to(index).map(drop),
        Action::Toggle(options) => with_current(controller, |question| {
            options
                .into_iter()
                .try_for_each(|option| controller.toggle_option(question.id(), option).map(drop))
        }),
        Action::Write(text) => with_current(controller, |question| {
            controller.set_answer(question.id(), Answer::text(text))
        }),
        Action::Clear => with_current(controller, |question| controller.clear_answer(question.id())),
        Action::List => {
            list(controller);
            return;
        }
        Action::Help => {
            print_help();
            return;
        }
        Action::Unknown(line) => {
            println!("Unknown command `{line}`; type `h` for help.");
            return;
        }
        Action::Submit | Action::Quit => return,
    };
    match outcome {
        Ok(()) => show_current(controller),
        Err(err) => println!("{}", err.user_message()),
    }
}

fn with_current<T>(
    controller: &SessionController,
    f: impl FnOnce(&Question) -> Result<T, services::SessionError>,
) -> Result<T, services::SessionError> {
    match controller.current() {
        Some((_, question)) => f(&question),
        None => Err(services::SessionError::Empty),
    }
}

async fn next_tick(slot: &mut Option<watch::Receiver<u32>>) -> u32 {
    loop {
        let Some(rx) = slot.as_mut() else {
            return std::future::pending().await;
        };
        if rx.changed().await.is_ok() {
            return *rx.borrow_and_update();
        }
        *slot = None;
    }
}

fn announce(left: u32) {
    if matches!(left, 300 | 60 | 10) {
        println!("({} left)", format_clock(left));
    }
}

//
// ─── RENDERING ────────────────────────────────────────────────────────────────
//

fn header(progress: &Progress, question: &Question) -> String {
    let mut line = format!(
        "Question {}/{} | {} | {} pts",
        progress.position + 1,
        progress.total,
        question.kind().label(),
        question.points()
    );
    if let Some(clock) = progress.clock() {
        line.push_str(&format!(" | {clock} left"));
    }
    line
}

fn show_current(controller: &SessionController) {
    let Some((_, question)) = controller.current() else {
        return;
    };
    let progress = controller.progress();
    let answer = controller.answer(question.id());

    println!();
    println!("{}", header(&progress, &question));
    println!("{}", question.prompt());
    if question.kind().is_choice() {
        let selected = answer.as_ref().and_then(Answer::selected);
        for option in question.options() {
            let mark = if selected.is_some_and(|s| s.contains(&option.id)) {
                "x"
            } else {
                " "
            };
            println!("  [{mark}] {}  {}", option.id.as_str(), option.text);
        }
    } else {
        match answer.as_ref().and_then(Answer::as_text) {
            Some(text) => println!("  Your answer: {text}"),
            None => println!("  (no answer yet; use `w <text>`)"),
        }
    }
}

fn list(controller: &SessionController) {
    let progress = controller.progress();
    for (index, question) in controller.questions().iter().enumerate() {
        let marker = if index == progress.position { ">" } else { " " };
        let done = if controller.answer(question.id()).is_some() {
            "answered"
        } else {
            "-"
        };
        println!("{marker}{:>3}. [{done}] {}", index + 1, question.prompt());
    }
    println!("{} of {} answered.", progress.answered, progress.total);
}

pub fn print_result(result: &SessionResult) {
    println!();
    println!("== Result ==");
    match (result.score(), result.max_score()) {
        (Some(score), Some(max)) => println!("Score:      {score} / {max}"),
        (Some(score), None) => println!("Score:      {score}"),
        _ => {}
    }
    if let Some(percentage) = result.percentage() {
        println!("Percentage: {percentage:.1}%");
    }
    if let Some(passed) = result.passed() {
        println!("Outcome:    {}", if passed { "passed" } else { "not passed" });
    }
    if let Some(feedback) = result.feedback() {
        println!("Feedback:   {feedback}");
    }
}

pub fn print_profile(user: &UserProfile) {
    println!("{} ({})", user.display_name(), user.username);
    if !user.email.is_empty() {
        println!("Email:   {}", user.email);
    }
    if !user.user_type.is_empty() {
        println!("Type:    {}", user.user_type);
    }
    println!("Plan:    {}", if user.is_premium { "premium" } else { "free" });
}
