use chrono::Utc;
use course_core::model::{Course, CourseId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{id_i64, ser},
    read_error, write_error,
};
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let tree = serde_json::to_string(course).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title, tree_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                tree_json = excluded.tree_json,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(tree)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query("SELECT tree_json FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tree: String = row.try_get("tree_json").map_err(ser)?;
        let course: Course = serde_json::from_str(&tree).map_err(ser)?;
        Ok(Some(course))
    }
}
