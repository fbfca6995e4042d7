mod console;

use std::error::Error;
use std::fmt;

use prep_core::model::{AttemptId, ExamId, InterviewId, TemplateId};
use services::api::dto::{DashboardSummary, ProfileUpdate, Registration};
use services::{AppServices, Clock, ClientConfig, InterviewScope, TrendPeriod};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::console::Input;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidId { what: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidPeriod { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidId { what, raw } => write!(f, "invalid {what} id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPeriod { raw } => {
                write!(f, "invalid period: {raw} (expected daily, weekly or monthly)")
            }
        }
    }
}

impl Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    what: &'static str,
) -> Result<T, ArgsError> {
    let raw = args.next().ok_or(ArgsError::MissingArgument { name: what })?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidId { what, raw: raw.clone() })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  prep [--api <url>] [--db <sqlite_url>] <command> [args]");
    eprintln!();
    eprintln!("Account:");
    eprintln!("  login <username> [--password <pw>]  (prompted without echo if omitted)");
    eprintln!("  register --username <u> --email <e> [--first-name <n>] [--last-name <n>] [--user-type <t>]");
    eprintln!("  logout | whoami | password");
    eprintln!("  profile [--first-name <n>] [--last-name <n>] [--bio <b>] [--phone <p>] [--organization <o>]");
    eprintln!();
    eprintln!("Practice:");
    eprintln!("  exams | interviews [--mine] | templates");
    eprintln!("  use-template <template_id> [--role <r>] [--company <c>]");
    eprintln!("  take-exam <exam_id> | resume <attempt_id> | take-interview <interview_id>");
    eprintln!();
    eprintln!("Insights:");
    eprintln!("  results exam <attempt_id> | results interview <interview_id>");
    eprintln!("  dashboard | stats exams | stats interviews | trends [daily|weekly|monthly]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PREP_API_URL, PREP_DB_URL, PREP_HTTP_TIMEOUT_SECS, PREP_AUTOSAVE, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultsTarget {
    Exam(AttemptId),
    Interview(InterviewId),
}

#[derive(Debug)]
enum Command {
    Login { username: String, password: Option<String> },
    Register(Registration),
    Logout,
    Whoami,
    Profile(ProfileUpdate),
    Password,
    Exams,
    Interviews { scope: InterviewScope },
    Templates,
    UseTemplate { id: TemplateId, job_role: String, company: String },
    TakeExam(ExamId),
    Resume(AttemptId),
    TakeInterview(InterviewId),
    Results(ResultsTarget),
    Dashboard,
    Stats { interviews: bool },
    Trends(TrendPeriod),
}

impl Command {
    fn parse(name: &str, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let cmd = match name {
            "login" => {
                let username = args
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "username" })?;
                let mut password = None;
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--password" => password = Some(require_value(args, "--password")?),
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Self::Login { username, password }
            }
            "register" => {
                let mut registration = Registration::default();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--username" => registration.username = require_value(args, "--username")?,
                        "--email" => registration.email = require_value(args, "--email")?,
                        "--first-name" => {
                            registration.first_name = require_value(args, "--first-name")?;
                        }
                        "--last-name" => {
                            registration.last_name = require_value(args, "--last-name")?;
                        }
                        "--user-type" => {
                            registration.user_type = require_value(args, "--user-type")?;
                        }
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Self::Register(registration)
            }
            "logout" => Self::Logout,
            "whoami" => Self::Whoami,
            "profile" => {
                let mut update = ProfileUpdate::default();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--first-name" => {
                            update.first_name = Some(require_value(args, "--first-name")?);
                        }
                        "--last-name" => {
                            update.last_name = Some(require_value(args, "--last-name")?);
                        }
                        "--bio" => update.bio = Some(require_value(args, "--bio")?),
                        "--phone" => update.phone_number = Some(require_value(args, "--phone")?),
                        "--organization" => {
                            update.organization = Some(require_value(args, "--organization")?);
                        }
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Self::Profile(update)
            }
            "password" => Self::Password,
            "exams" => Self::Exams,
            "interviews" => {
                let mut scope = InterviewScope::All;
                for arg in args.by_ref() {
                    match arg.as_str() {
                        "--mine" => scope = InterviewScope::Mine,
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Self::Interviews { scope }
            }
            "templates" => Self::Templates,
            "use-template" => {
                let id = require_id(args, "template")?;
                let mut job_role = String::new();
                let mut company = String::new();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--role" => job_role = require_value(args, "--role")?,
                        "--company" => company = require_value(args, "--company")?,
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                Self::UseTemplate {
                    id,
                    job_role,
                    company,
                }
            }
            "take-exam" => Self::TakeExam(require_id(args, "exam")?),
            "resume" => Self::Resume(require_id(args, "attempt")?),
            "take-interview" => Self::TakeInterview(require_id(args, "interview")?),
            "results" => match args.next().as_deref() {
                Some("exam") => Self::Results(ResultsTarget::Exam(require_id(args, "attempt")?)),
                Some("interview") => {
                    Self::Results(ResultsTarget::Interview(require_id(args, "interview")?))
                }
                Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
                None => return Err(ArgsError::MissingArgument { name: "exam|interview" }),
            },
            "dashboard" => Self::Dashboard,
            "stats" => match args.next().as_deref() {
                Some("exams") | None => Self::Stats { interviews: false },
                Some("interviews") => Self::Stats { interviews: true },
                Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
            },
            "trends" => {
                let period = match args.next() {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidPeriod { raw: raw.clone() })?,
                    None => TrendPeriod::default(),
                };
                Self::Trends(period)
            }
            other => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };

        if let Some(extra) = args.next() {
            return Err(ArgsError::UnknownArg(extra));
        }
        Ok(cmd)
    }
}

struct Args {
    api_url: Option<String>,
    db_url: Option<String>,
    command: Command,
}

impl Args {
    /// Global flags may appear anywhere; the first other word names the command.
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut api_url = None;
        let mut db_url = None;
        let mut rest = Vec::new();

        let mut iter = argv.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--api" => api_url = Some(require_value(&mut iter, "--api")?),
                "--db" => {
                    let value = require_value(&mut iter, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--help" | "-h" => return Ok(None),
                _ => rest.push(arg),
            }
        }

        let mut rest = rest.into_iter();
        let Some(name) = rest.next() else {
            return Ok(None);
        };
        let command = Command::parse(&name, &mut rest)?;
        Ok(Some(Self {
            api_url,
            db_url,
            command,
        }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    let mut config = ClientConfig::from_env()?;
    if let Some(api) = parsed.api_url.as_deref() {
        config = config.with_api_base(api)?;
    }
    if let Some(db) = parsed.db_url {
        config = config.with_db_url(db);
    }
    config.db_url = normalize_sqlite_url(config.db_url);

    // Open + migrate SQLite at startup; services stay storage-agnostic.
    prepare_sqlite_file(&config.db_url)?;
    tracing::debug!(api = %config.api_base(), db = %config.db_url, "starting");
    let services = AppServices::new_sqlite(config, Clock::System).await?;

    let mut input = Input::stdin();
    execute(&services, &mut input, parsed.command).await
}

async fn execute(
    services: &AppServices,
    input: &mut Input,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    let auth = services.auth();
    let catalog = services.catalog();
    let insights = services.insights();
    let sessions = services.sessions();

    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => input.ask_secret("Password: ").await?,
            };
            let user = auth
                .login(&username, &password)
                .await
                .map_err(|e| e.user_message())?;
            println!("Signed in as {}.", user.display_name());
        }
        Command::Register(mut registration) => {
            if registration.username.is_empty() {
                registration.username = input.ask("Username: ").await?;
            }
            if registration.email.is_empty() {
                registration.email = input.ask("Email: ").await?;
            }
            registration.password = input.ask_secret("Password: ").await?;
            registration.password_confirm = input.ask_secret("Confirm password: ").await?;
            let user = auth
                .register(&registration)
                .await
                .map_err(|e| e.user_message())?;
            println!("Welcome, {}! You are signed in.", user.display_name());
        }
        Command::Logout => {
            auth.logout().await.map_err(|e| e.user_message())?;
            println!("Signed out.");
        }
        Command::Whoami => {
            let user = auth.current_user().await.map_err(|e| e.user_message())?;
            console::print_profile(&user);
        }
        Command::Profile(update) => {
            let user = if update.is_empty() {
                auth.current_user().await
            } else {
                auth.update_profile(&update).await
            }
            .map_err(|e| e.user_message())?;
            console::print_profile(&user);
        }
        Command::Password => {
            let old = input.ask_secret("Current password: ").await?;
            let new = input.ask_secret("New password: ").await?;
            let confirm = input.ask_secret("Confirm new password: ").await?;
            auth.change_password(&old, &new, &confirm)
                .await
                .map_err(|e| e.user_message())?;
            println!("Password changed.");
        }
        Command::Exams => {
            let exams = catalog.list_exams().await.map_err(|e| e.user_message())?;
            if exams.is_empty() {
                println!("No exams available.");
            }
            for exam in exams {
                let premium = if exam.is_premium { " [premium]" } else { "" };
                println!(
                    "{:>5}  {}  ({} min, {}){premium}",
                    exam.id, exam.title, exam.duration_minutes, exam.difficulty
                );
            }
        }
        Command::Interviews { scope } => {
            let interviews = catalog
                .list_interviews(scope)
                .await
                .map_err(|e| e.user_message())?;
            if interviews.is_empty() {
                println!("No interviews yet. Create one with `use-template`.");
            }
            for interview in interviews {
                println!(
                    "{:>5}  {}  [{}]  ({} min)",
                    interview.id, interview.title, interview.status, interview.duration_minutes
                );
            }
        }
        Command::Templates => {
            let templates = catalog.templates().await.map_err(|e| e.user_message())?;
            for template in templates {
                println!(
                    "{:>5}  {}  ({}, {} min, used {}x)",
                    template.id,
                    template.title,
                    template.interview_type,
                    template.duration_minutes,
                    template.times_used
                );
            }
        }
        Command::UseTemplate {
            id,
            job_role,
            company,
        } => {
            let interview = catalog
                .use_template(id, &job_role, &company)
                .await
                .map_err(|e| e.user_message())?;
            println!(
                "Created interview {} ({}). Start it with `take-interview {}`.",
                interview.id, interview.title, interview.id
            );
        }
        Command::TakeExam(exam) => {
            let controller = sessions
                .start_or_resume_exam(exam)
                .await
                .map_err(|e| e.user_message())?;
            console::run_session(controller, input).await?;
        }
        Command::Resume(attempt) => {
            let controller = sessions
                .resume_attempt(attempt)
                .await
                .map_err(|e| e.user_message())?;
            console::run_session(controller, input).await?;
        }
        Command::TakeInterview(interview) => {
            console::run_session(sessions.interview(interview), input).await?;
        }
        Command::Results(target) => {
            let result = match target {
                ResultsTarget::Exam(attempt) => insights.exam_results(attempt).await,
                ResultsTarget::Interview(id) => insights.interview_results(id).await,
            }
            .map_err(|e| e.user_message())?;
            console::print_result(&result);
        }
        Command::Dashboard => {
            let summary = insights.dashboard().await.map_err(|e| e.user_message())?;
            print_dashboard(&summary);
        }
        Command::Stats { interviews } => {
            let stats = if interviews {
                insights.interview_stats().await
            } else {
                insights.exam_stats().await
            }
            .map_err(|e| e.user_message())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Trends(period) => {
            let trends = insights
                .performance_trends(period)
                .await
                .map_err(|e| e.user_message())?;
            println!("Performance ({period}):");
            println!("{}", serde_json::to_string_pretty(&trends)?);
        }
    }
    Ok(())
}

fn print_dashboard(summary: &DashboardSummary) {
    let pct = |v: Option<f64>| v.map_or_else(|| "-".to_owned(), |v| format!("{v:.1}%"));
    println!("Activities:   {}", summary.total_activities);
    println!(
        "Streak:       {} days (best {})",
        summary.current_streak, summary.longest_streak
    );
    println!(
        "Exams:        {} taken, {} passed ({} pass rate, avg {})",
        summary.total_exams,
        summary.exams_passed,
        pct(summary.exam_pass_rate),
        pct(summary.avg_exam_score)
    );
    println!(
        "Interviews:   {} total, {} completed ({} completion, avg {})",
        summary.total_interviews,
        summary.interviews_completed,
        pct(summary.interview_completion_rate),
        pct(summary.avg_interview_score)
    );
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
