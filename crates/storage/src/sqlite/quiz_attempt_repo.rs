use course_core::model::{EnrollmentId, QuizAttempt};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_attempt_row},
    read_error, write_error,
};
use crate::repository::{AppendAttempt, NewQuizAttempt, QuizAttemptRepository, StorageError};

#[async_trait::async_trait]
impl QuizAttemptRepository for SqliteRepository {
    async fn append_attempt(
        &self,
        attempt: NewQuizAttempt,
        max_attempts: Option<u32>,
    ) -> Result<AppendAttempt, StorageError> {
        // Numbering and the cap check share one statement, so two writers
        // can never both take the last allowed slot.
        let row = sqlx::query(
            r"
                INSERT INTO quiz_attempts (
                    enrollment_id, lesson_id, quiz_id, attempt_number,
                    score, passed, submitted_at
                )
                SELECT ?1, ?2, ?3, stats.next_number, ?4, ?5, ?6
                FROM (
                    SELECT
                        COALESCE(MAX(attempt_number), 0) + 1 AS next_number,
                        COUNT(*) AS used
                    FROM quiz_attempts
                    WHERE enrollment_id = ?1 AND lesson_id = ?2 AND quiz_id = ?3
                ) AS stats
                WHERE ?7 IS NULL OR stats.used < ?7
                RETURNING
                    enrollment_id, lesson_id, quiz_id, attempt_number,
                    score, passed, submitted_at
            ",
        )
        .bind(id_i64("enrollment_id", attempt.enrollment_id.value())?)
        .bind(id_i64("lesson_id", attempt.lesson_id.value())?)
        .bind(id_i64("quiz_id", attempt.quiz_id.value())?)
        .bind(i64::from(attempt.score))
        .bind(i64::from(attempt.passed))
        .bind(attempt.submitted_at)
        .bind(max_attempts.map(i64::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;

        match row {
            Some(row) => Ok(AppendAttempt::Appended(map_attempt_row(&row)?)),
            None => Ok(AppendAttempt::LimitReached),
        }
    }

    async fn attempts(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    enrollment_id, lesson_id, quiz_id, attempt_number,
                    score, passed, submitted_at
                FROM quiz_attempts
                WHERE enrollment_id = ?1
                ORDER BY lesson_id ASC, quiz_id ASC, attempt_number ASC
            ",
        )
        .bind(id_i64("enrollment_id", enrollment_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        rows.iter().map(map_attempt_row).collect()
    }
}
