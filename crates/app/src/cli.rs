use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use course_core::model::{CourseId, EnrollmentId, LearnerId, LessonId, QuestionId, QuizAnswer, QuizId};

pub const DEFAULT_DB_URL: &str = "sqlite://progress.sqlite3";
pub const DB_URL_ENV: &str = "PROGRESS_DB_URL";

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app seed        [--db <sqlite_url>]");
    eprintln!("  app import      --file <course.json>");
    eprintln!("  app enroll      --learner <id> --course <id>");
    eprintln!("  app progress    --enrollment <id>");
    eprintln!("  app complete    --enrollment <id> --lesson <id> [--seconds <n>]");
    eprintln!("  app video       --enrollment <id> --lesson <id> --fraction <0..1>");
    eprintln!("  app time        --enrollment <id> --lesson <id> --seconds <n>");
    eprintln!("  app quiz-start  --enrollment <id> --lesson <id> --quiz <id>");
    eprintln!("  app quiz        --enrollment <id> --lesson <id> --quiz <id> --answer <question>:<choice>...");
    eprintln!("  app quiz-state  --enrollment <id> --lesson <id> --quiz <id>");
    eprintln!("  app next|prev   --enrollment <id> --lesson <id>");
    eprintln!("  app resume      --enrollment <id>");
    eprintln!("  app certificate --enrollment <id>");
    eprintln!();
    eprintln!("Every command accepts --db <sqlite_url> (default {DEFAULT_DB_URL}).");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {DB_URL_ENV}, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Seed,
    Import,
    Enroll,
    Progress,
    Complete,
    Video,
    Time,
    QuizStart,
    Quiz,
    QuizState,
    Next,
    Prev,
    Resume,
    Certificate,
}

impl Command {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "import" => Some(Self::Import),
            "enroll" => Some(Self::Enroll),
            "progress" => Some(Self::Progress),
            "complete" => Some(Self::Complete),
            "video" => Some(Self::Video),
            "time" => Some(Self::Time),
            "quiz-start" => Some(Self::QuizStart),
            "quiz" => Some(Self::Quiz),
            "quiz-state" => Some(Self::QuizState),
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            "resume" => Some(Self::Resume),
            "certificate" => Some(Self::Certificate),
            _ => None,
        }
    }
}

/// Flags shared by all subcommands; each command checks the ones it needs.
#[derive(Debug)]
pub struct Args {
    pub db_url: String,
    file: Option<PathBuf>,
    learner: Option<LearnerId>,
    course: Option<CourseId>,
    enrollment: Option<EnrollmentId>,
    lesson: Option<LessonId>,
    quiz: Option<QuizId>,
    seconds: Option<u64>,
    fraction: Option<f64>,
    pub answers: Vec<QuizAnswer>,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_value<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

fn parse_answer(raw: String) -> Result<QuizAnswer, ArgsError> {
    let invalid = || ArgsError::InvalidValue {
        flag: "--answer",
        raw: raw.clone(),
    };
    let (question, choice) = raw.split_once(':').ok_or_else(invalid)?;
    let question: QuestionId = question.parse().map_err(|_| invalid())?;
    let choice: u32 = choice.trim().parse().map_err(|_| invalid())?;
    Ok(QuizAnswer::new(question, choice))
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

impl Args {
    pub fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var(DB_URL_ENV)
                .ok()
                .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url),
            file: None,
            learner: None,
            course: None,
            enrollment: None,
            lesson: None,
            quiz: None,
            seconds: None,
            fraction: None,
            answers: Vec::new(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--file" => parsed.file = Some(require_value(args, "--file")?.into()),
                "--learner" => parsed.learner = Some(parse_value(args, "--learner")?),
                "--course" => parsed.course = Some(parse_value(args, "--course")?),
                "--enrollment" => parsed.enrollment = Some(parse_value(args, "--enrollment")?),
                "--lesson" => parsed.lesson = Some(parse_value(args, "--lesson")?),
                "--quiz" => parsed.quiz = Some(parse_value(args, "--quiz")?),
                "--seconds" => parsed.seconds = Some(parse_value(args, "--seconds")?),
                "--fraction" => parsed.fraction = Some(parse_value(args, "--fraction")?),
                "--answer" => {
                    let value = require_value(args, "--answer")?;
                    parsed.answers.push(parse_answer(value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    pub fn file(&self) -> Result<&PathBuf, ArgsError> {
        required(self.file.as_ref(), "--file")
    }

    pub fn learner(&self) -> Result<LearnerId, ArgsError> {
        required(self.learner, "--learner")
    }

    pub fn course(&self) -> Result<CourseId, ArgsError> {
        required(self.course, "--course")
    }

    pub fn enrollment(&self) -> Result<EnrollmentId, ArgsError> {
        required(self.enrollment, "--enrollment")
    }

    pub fn lesson(&self) -> Result<LessonId, ArgsError> {
        required(self.lesson, "--lesson")
    }

    pub fn quiz(&self) -> Result<QuizId, ArgsError> {
        required(self.quiz, "--quiz")
    }

    pub fn seconds(&self) -> Result<u64, ArgsError> {
        required(self.seconds, "--seconds")
    }

    pub fn seconds_or_zero(&self) -> u64 {
        self.seconds.unwrap_or(0)
    }

    pub fn fraction(&self) -> Result<f64, ArgsError> {
        required(self.fraction, "--fraction")
    }
}

pub fn normalize_sqlite_url(raw: String) -> String {
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
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
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
    if let Some(parent) = path.parent() {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = argv.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn parses_ids_and_answers() {
        let args = parse(&[
            "--db",
            "sqlite::memory:",
            "--enrollment",
            "4",
            "--lesson",
            " 7 ",
            "--answer",
            "1:0",
            "--answer",
            "2:3",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.enrollment().unwrap(), EnrollmentId::new(4));
        assert_eq!(args.lesson().unwrap(), LessonId::new(7));
        assert_eq!(args.answers.len(), 2);
        assert_eq!(args.answers[1], QuizAnswer::new(QuestionId::new(2), 3));
        assert!(matches!(
            args.quiz(),
            Err(ArgsError::MissingFlag { flag: "--quiz" })
        ));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            parse(&["--answer", "nope"]),
            Err(ArgsError::InvalidValue { flag: "--answer", .. })
        ));
        assert!(matches!(
            parse(&["--lesson", "x"]),
            Err(ArgsError::InvalidValue { flag: "--lesson", .. })
        ));
        assert!(matches!(
            parse(&["--lesson"]),
            Err(ArgsError::MissingValue { flag: "--lesson" })
        ));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/progress.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/progress.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite://already.db".into()),
            "sqlite://already.db"
        );
    }
}
