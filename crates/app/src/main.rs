mod cli;
mod demo;

use serde::Serialize;
use services::{AppServices, Clock, ProgressService};
use tracing_subscriber::EnvFilter;

use cli::{Args, ArgsError, Command, prepare_sqlite_file, print_usage};

#[derive(Debug, Serialize)]
struct SeedReport {
    course_id: course_core::model::CourseId,
    enrollment_id: course_core::model::EnrollmentId,
    lessons: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    // stdout carries the JSON results, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn seed(progress: &ProgressService) -> Result<(), Box<dyn std::error::Error>> {
    let course = demo::demo_course()?;
    progress.publish_course(&course).await?;

    let learner = course_core::model::LearnerId::new(1);
    let enrollment = match progress.find_enrollment(learner, course.id()).await? {
        Some(existing) => existing,
        None => progress.enroll(learner, course.id()).await?,
    };

    print_json(&SeedReport {
        course_id: course.id(),
        enrollment_id: enrollment.id,
        lessons: course.lesson_count(),
    })
}

async fn dispatch(
    cmd: Command,
    args: &Args,
    progress: &ProgressService,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Seed => seed(progress).await,
        Command::Import => {
            let document = std::fs::read_to_string(args.file()?)?;
            let course = progress.publish_course_json(&document).await?;
            print_json(&course)
        }
        Command::Enroll => {
            let enrollment = progress.enroll(args.learner()?, args.course()?).await?;
            print_json(&enrollment)
        }
        Command::Progress => print_json(&progress.progress(args.enrollment()?).await?),
        Command::Complete => {
            let outcome = progress
                .complete_lesson(args.enrollment()?, args.lesson()?, args.seconds_or_zero())
                .await?;
            print_json(&outcome)
        }
        Command::Video => {
            let row = progress
                .update_video_progress(args.enrollment()?, args.lesson()?, args.fraction()?)
                .await?;
            print_json(&row)
        }
        Command::Time => {
            let row = progress
                .record_time_spent(args.enrollment()?, args.lesson()?, args.seconds()?)
                .await?;
            print_json(&row)
        }
        Command::QuizStart => {
            let state = progress
                .start_quiz(args.enrollment()?, args.lesson()?, args.quiz()?)
                .await?;
            print_json(&state)
        }
        Command::Quiz => {
            let submission = progress
                .submit_quiz_attempt(
                    args.enrollment()?,
                    args.lesson()?,
                    args.quiz()?,
                    &args.answers,
                )
                .await?;
            print_json(&submission)
        }
        Command::QuizState => {
            let state = progress
                .quiz_state(args.enrollment()?, args.lesson()?, args.quiz()?)
                .await?;
            print_json(&state)
        }
        Command::Next => print_json(
            &progress
                .next_lesson(args.enrollment()?, args.lesson()?)
                .await?,
        ),
        Command::Prev => print_json(
            &progress
                .previous_lesson(args.enrollment()?, args.lesson()?)
                .await?,
        ),
        Command::Resume => print_json(&progress.resume_lesson(args.enrollment()?).await?),
        Command::Certificate => print_json(&progress.certificate(args.enrollment()?).await?),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownCommand(first)
        })?,
    };

    let args = Args::parse(&mut argv).inspect_err(|_| print_usage())?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::system()).await?;
    tracing::debug!(db_url = %args.db_url, ?cmd, "storage ready");

    dispatch(cmd, &args, services.progress().as_ref()).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
