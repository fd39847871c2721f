//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{CourseError, CourseId, EnrollmentId, LessonId, QuizError, QuizId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
///
/// Completion denials are not errors; they come back as
/// `LessonCompletion::Denied`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),
    #[error("lesson {lesson} is not part of course {course}")]
    LessonNotFound { course: CourseId, lesson: LessonId },
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("lesson {lesson} has no quiz {quiz}")]
    QuizNotFound { lesson: LessonId, quiz: QuizId },
    #[error("video fraction must be within [0, 1], got {0}")]
    InvalidVideoFraction(f64),
    #[error("no attempts remaining for quiz {0}")]
    AttemptsExhausted(QuizId),
    #[error("learner is already enrolled in course {0}")]
    AlreadyEnrolled(CourseId),
    #[error("concurrent update on enrollment {0}; retry the request")]
    Conflict(EnrollmentId),
    #[error("invalid course document: {0}")]
    CourseDocument(#[from] serde_json::Error),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
