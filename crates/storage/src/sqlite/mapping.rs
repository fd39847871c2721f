use chrono::{DateTime, Utc};
use course_core::model::{
    Certificate, CertificateId, CourseId, Enrollment, EnrollmentId, LearnerId, LessonId,
    LessonProgress, QuizAttempt, QuizId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn small_from_i64<T: TryFrom<i64>>(field: &'static str, v: i64) -> Result<T, StorageError> {
    T::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn enrollment_id_from_i64(v: i64) -> Result<EnrollmentId, StorageError> {
    Ok(EnrollmentId::new(i64_to_u64("enrollment_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    let last_lesson_id = row
        .try_get::<Option<i64>, _>("last_lesson_id")
        .map_err(ser)?
        .map(lesson_id_from_i64)
        .transpose()?;

    Ok(Enrollment {
        id: enrollment_id_from_i64(row.try_get("id").map_err(ser)?)?,
        learner_id: LearnerId::new(i64_to_u64(
            "learner_id",
            row.try_get("learner_id").map_err(ser)?,
        )?),
        course_id: CourseId::new(i64_to_u64(
            "course_id",
            row.try_get("course_id").map_err(ser)?,
        )?),
        enrolled_at: row.try_get("enrolled_at").map_err(ser)?,
        overall_progress_percent: small_from_i64(
            "overall_progress_percent",
            row.try_get("overall_progress_percent").map_err(ser)?,
        )?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        last_lesson_id,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    let completed: i64 = row.try_get("is_completed").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
    Ok(LessonProgress {
        enrollment_id: enrollment_id_from_i64(row.try_get("enrollment_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_i64(row.try_get("lesson_id").map_err(ser)?)?,
        is_completed: completed != 0,
        video_watched_fraction: row.try_get("video_watched_fraction").map_err(ser)?,
        time_spent_seconds: i64_to_u64(
            "time_spent_seconds",
            row.try_get("time_spent_seconds").map_err(ser)?,
        )?,
        completed_at,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<QuizAttempt, StorageError> {
    let passed: i64 = row.try_get("passed").map_err(ser)?;
    Ok(QuizAttempt {
        enrollment_id: enrollment_id_from_i64(row.try_get("enrollment_id").map_err(ser)?)?,
        lesson_id: lesson_id_from_i64(row.try_get("lesson_id").map_err(ser)?)?,
        quiz_id: QuizId::new(i64_to_u64("quiz_id", row.try_get("quiz_id").map_err(ser)?)?),
        attempt_number: small_from_i64(
            "attempt_number",
            row.try_get("attempt_number").map_err(ser)?,
        )?,
        score: small_from_i64("score", row.try_get("score").map_err(ser)?)?,
        passed: passed != 0,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
    })
}

pub(crate) fn map_certificate_row(row: &SqliteRow) -> Result<Certificate, StorageError> {
    let raw: String = row.try_get("certificate_id").map_err(ser)?;
    Ok(Certificate {
        id: raw.parse::<CertificateId>().map_err(ser)?,
        enrollment_id: enrollment_id_from_i64(row.try_get("enrollment_id").map_err(ser)?)?,
        issued_at: row.try_get("issued_at").map_err(ser)?,
    })
}
