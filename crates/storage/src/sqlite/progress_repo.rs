use chrono::{DateTime, Utc};
use course_core::model::{EnrollmentId, LessonId, LessonProgress};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_progress_row},
    read_error, write_error,
};
use crate::repository::{LessonProgressRepository, StorageError};

const RETURNING_PROGRESS: &str = r"
    RETURNING
        enrollment_id, lesson_id, is_completed, video_watched_fraction,
        time_spent_seconds, completed_at, updated_at
";

fn seconds_i64(seconds: u64) -> Result<i64, StorageError> {
    i64::try_from(seconds)
        .map_err(|_| StorageError::Serialization("time_spent_seconds overflow".into()))
}

impl SqliteRepository {
    /// Runs one upsert statement against a progress row and returns the row.
    ///
    /// SQLite evaluates the whole `ON CONFLICT DO UPDATE` against the old row,
    /// so each call is a single atomic read-modify-write.
    async fn upsert_progress(
        &self,
        upsert: &str,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        value: ProgressValue,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let sql = format!("{upsert}\n{RETURNING_PROGRESS}");
        let query = sqlx::query(&sql)
            .bind(id_i64("enrollment_id", enrollment_id.value())?)
            .bind(id_i64("lesson_id", lesson_id.value())?);
        let query = match value {
            ProgressValue::Seconds(s) => query.bind(seconds_i64(s)?),
            ProgressValue::Fraction(f) => query.bind(f),
        };

        let row = query
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        map_progress_row(&row)
    }
}

enum ProgressValue {
    Seconds(u64),
    Fraction(f64),
}

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn mark_completed(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        time_spent_seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.upsert_progress(
            r"
            INSERT INTO lesson_progress (
                enrollment_id, lesson_id, is_completed, video_watched_fraction,
                time_spent_seconds, completed_at, updated_at
            )
            VALUES (?1, ?2, 1, 0, ?3, ?4, ?4)
            ON CONFLICT(enrollment_id, lesson_id) DO UPDATE SET
                time_spent_seconds = CASE WHEN lesson_progress.is_completed = 1
                    THEN lesson_progress.time_spent_seconds
                    ELSE lesson_progress.time_spent_seconds + excluded.time_spent_seconds END,
                completed_at = CASE WHEN lesson_progress.is_completed = 1
                    THEN lesson_progress.completed_at
                    ELSE excluded.completed_at END,
                updated_at = CASE WHEN lesson_progress.is_completed = 1
                    THEN lesson_progress.updated_at
                    ELSE excluded.updated_at END,
                is_completed = 1
            ",
            enrollment_id,
            lesson_id,
            ProgressValue::Seconds(time_spent_seconds),
            at,
        )
        .await
    }

    async fn raise_video_fraction(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        fraction: f64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.upsert_progress(
            r"
            INSERT INTO lesson_progress (
                enrollment_id, lesson_id, is_completed, video_watched_fraction,
                time_spent_seconds, completed_at, updated_at
            )
            VALUES (?1, ?2, 0, ?3, 0, NULL, ?4)
            ON CONFLICT(enrollment_id, lesson_id) DO UPDATE SET
                updated_at = CASE WHEN excluded.video_watched_fraction > lesson_progress.video_watched_fraction
                    THEN excluded.updated_at
                    ELSE lesson_progress.updated_at END,
                video_watched_fraction = MAX(lesson_progress.video_watched_fraction, excluded.video_watched_fraction)
            ",
            enrollment_id,
            lesson_id,
            ProgressValue::Fraction(fraction),
            at,
        )
        .await
    }

    async fn add_time_spent(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.upsert_progress(
            r"
            INSERT INTO lesson_progress (
                enrollment_id, lesson_id, is_completed, video_watched_fraction,
                time_spent_seconds, completed_at, updated_at
            )
            VALUES (?1, ?2, 0, 0, ?3, NULL, ?4)
            ON CONFLICT(enrollment_id, lesson_id) DO UPDATE SET
                time_spent_seconds = lesson_progress.time_spent_seconds + excluded.time_spent_seconds,
                updated_at = excluded.updated_at
            ",
            enrollment_id,
            lesson_id,
            ProgressValue::Seconds(seconds),
            at,
        )
        .await
    }

    async fn lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    enrollment_id, lesson_id, is_completed, video_watched_fraction,
                    time_spent_seconds, completed_at, updated_at
                FROM lesson_progress
                WHERE enrollment_id = ?1
                ORDER BY lesson_id ASC
            ",
        )
        .bind(id_i64("enrollment_id", enrollment_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}
