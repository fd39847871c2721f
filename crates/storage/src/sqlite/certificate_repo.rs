use course_core::model::{Certificate, EnrollmentId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_certificate_row},
    read_error, write_error,
};
use crate::repository::{CertificateRepository, StorageError};

const SELECT_CERTIFICATE: &str = r"
    SELECT enrollment_id, certificate_id, issued_at
    FROM certificates
    WHERE enrollment_id = ?1
";

#[async_trait::async_trait]
impl CertificateRepository for SqliteRepository {
    async fn issue_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<Certificate, StorageError> {
        let enrollment_id = id_i64("enrollment_id", certificate.enrollment_id.value())?;
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        sqlx::query(
            r"
                INSERT INTO certificates (enrollment_id, certificate_id, issued_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(enrollment_id) DO NOTHING
            ",
        )
        .bind(enrollment_id)
        .bind(certificate.id.to_string())
        .bind(certificate.issued_at)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        let row = sqlx::query(SELECT_CERTIFICATE)
            .bind(enrollment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(read_error)?;
        let stored = map_certificate_row(&row)?;

        tx.commit().await.map_err(write_error)?;
        Ok(stored)
    }

    async fn get_certificate(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(SELECT_CERTIFICATE)
            .bind(id_i64("enrollment_id", enrollment_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;

        row.as_ref().map(map_certificate_row).transpose()
    }
}
