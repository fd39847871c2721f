use chrono::{DateTime, Utc};
use course_core::model::{CourseId, Enrollment, EnrollmentId, LearnerId, LessonId};

use super::{
    SqliteRepository,
    mapping::{enrollment_id_from_i64, id_i64, map_enrollment_row},
    read_error, write_error,
};
use crate::repository::{EnrollmentRepository, NewEnrollmentRecord, StorageError};

const SELECT_ENROLLMENT: &str = r"
    SELECT
        id, learner_id, course_id, enrolled_at, overall_progress_percent,
        completed_at, last_lesson_id
    FROM enrollments
";

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn insert_new_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO enrollments (learner_id, course_id, enrolled_at)
                VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id_i64("learner_id", record.learner_id.value())?)
        .bind(id_i64("course_id", record.course_id.value())?)
        .bind(record.enrolled_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        enrollment_id_from_i64(res.last_insert_rowid())
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError> {
        let sql = format!("{SELECT_ENROLLMENT} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("enrollment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn find_enrollment(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let sql = format!("{SELECT_ENROLLMENT} WHERE learner_id = ?1 AND course_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner_id.value())?)
            .bind(id_i64("course_id", course_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn record_progress_cache(
        &self,
        id: EnrollmentId,
        percent: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE enrollments SET
                    overall_progress_percent = ?2,
                    -- first observed completion wins
                    completed_at = COALESCE(completed_at, ?3)
                WHERE id = ?1
            ",
        )
        .bind(id_i64("enrollment_id", id.value())?)
        .bind(i64::from(percent))
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_lesson(
        &self,
        id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE enrollments SET last_lesson_id = ?2 WHERE id = ?1")
            .bind(id_i64("enrollment_id", id.value())?)
            .bind(id_i64("lesson_id", lesson_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM enrollments WHERE id = ?1")
            .bind(id_i64("enrollment_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
