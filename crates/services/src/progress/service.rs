use std::sync::Arc;

use course_core::aggregate::CourseProgressSnapshot;
use course_core::model::{
    Certificate, Course, CourseId, Enrollment, EnrollmentId, LearnerId, Lesson, LessonId,
    ProgressSnapshot,
};
use storage::repository::{
    CertificateRepository, CourseRepository, EnrollmentRepository, LessonProgressRepository,
    NewEnrollmentRecord, QuizAttemptRepository, Storage, StorageError,
};

use super::outcome::CertificateStatus;
use crate::Clock;
use crate::error::ProgressError;

/// Tracks learners through a course: completion, video and quiz events,
/// aggregation, navigation and certificate issuance.
///
/// Lock state and percentages are recomputed from stored rows on every call.
#[derive(Clone)]
pub struct ProgressService {
    pub(super) clock: Clock,
    pub(super) courses: Arc<dyn CourseRepository>,
    pub(super) enrollments: Arc<dyn EnrollmentRepository>,
    pub(super) progress: Arc<dyn LessonProgressRepository>,
    pub(super) attempts: Arc<dyn QuizAttemptRepository>,
    pub(super) certificates: Arc<dyn CertificateRepository>,
}

/// An enrollment together with the course tree it points at.
pub(super) struct Enrolled {
    pub(super) enrollment: Enrollment,
    pub(super) course: Course,
}

impl Enrolled {
    pub(super) fn lesson(&self, lesson_id: LessonId) -> Result<&Lesson, ProgressError> {
        self.course
            .lesson(lesson_id)
            .ok_or(ProgressError::LessonNotFound {
                course: self.course.id(),
                lesson: lesson_id,
            })
    }
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn LessonProgressRepository>,
        attempts: Arc<dyn QuizAttemptRepository>,
        certificates: Arc<dyn CertificateRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
            progress,
            attempts,
            certificates,
        }
    }

    /// Wire the service to every repository of a `Storage`.
    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.quiz_attempts),
            Arc::clone(&storage.certificates),
        )
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    //
    // ─── CATALOG & ENROLLMENT ──────────────────────────────────────────────────
    //

    /// Store a content tree handed over by the catalog, replacing any previous
    /// version. Existing progress rows are kept.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if persistence fails.
    pub async fn publish_course(&self, course: &Course) -> Result<(), ProgressError> {
        self.courses.upsert_course(course).await?;
        tracing::info!(
            course_id = %course.id(),
            lessons = course.lesson_count(),
            "course published"
        );
        Ok(())
    }

    /// Parse a JSON content tree, validate it and publish it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseDocument` for malformed or invalid trees.
    /// Returns `ProgressError::Storage` if persistence fails.
    pub async fn publish_course_json(&self, document: &str) -> Result<Course, ProgressError> {
        let course: Course = serde_json::from_str(document)?;
        self.publish_course(&course).await?;
        Ok(course)
    }

    /// Enroll a learner in a published course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` for unknown courses and
    /// `ProgressError::AlreadyEnrolled` for a second enrollment.
    pub async fn enroll(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Enrollment, ProgressError> {
        if self.courses.get_course(course_id).await?.is_none() {
            return Err(ProgressError::CourseNotFound(course_id));
        }

        let id = self
            .enrollments
            .insert_new_enrollment(NewEnrollmentRecord {
                learner_id,
                course_id,
                enrolled_at: self.clock.now(),
            })
            .await
            .map_err(|e| match e {
                StorageError::Conflict => ProgressError::AlreadyEnrolled(course_id),
                StorageError::NotFound => ProgressError::CourseNotFound(course_id),
                other => ProgressError::Storage(other),
            })?;

        tracing::info!(enrollment_id = %id, learner_id = %learner_id, course_id = %course_id, "learner enrolled");
        self.enrollments
            .get_enrollment(id)
            .await?
            .ok_or(ProgressError::EnrollmentNotFound(id))
    }

    /// Look up the enrollment of a learner in a course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn find_enrollment(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, ProgressError> {
        Ok(self.enrollments.find_enrollment(learner_id, course_id).await?)
    }

    /// Remove an enrollment with all of its progress, attempts and certificate.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` for unknown enrollments.
    pub async fn withdraw(&self, enrollment_id: EnrollmentId) -> Result<(), ProgressError> {
        self.enrollments
            .delete_enrollment(enrollment_id)
            .await
            .map_err(|e| not_found_as(e, enrollment_id))?;
        tracing::info!(enrollment_id = %enrollment_id, "enrollment withdrawn");
        Ok(())
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// Fresh aggregate for an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `ProgressError::CourseNotFound`
    /// when the enrollment or its course is missing.
    pub async fn progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<CourseProgressSnapshot, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let snapshot = self.snapshot(enrollment_id).await?;
        self.view(&enrolled, &snapshot).await
    }

    /// The certificate of an enrollment, if one has been issued.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` for unknown enrollments.
    pub async fn certificate(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<CertificateStatus, ProgressError> {
        if self.enrollments.get_enrollment(enrollment_id).await?.is_none() {
            return Err(ProgressError::EnrollmentNotFound(enrollment_id));
        }
        Ok(self
            .certificates
            .get_certificate(enrollment_id)
            .await?
            .map_or(CertificateStatus::NotIssuedYet, CertificateStatus::Issued))
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    pub(super) async fn load(&self, enrollment_id: EnrollmentId) -> Result<Enrolled, ProgressError> {
        let enrollment = self
            .enrollments
            .get_enrollment(enrollment_id)
            .await?
            .ok_or(ProgressError::EnrollmentNotFound(enrollment_id))?;
        let course = self
            .courses
            .get_course(enrollment.course_id)
            .await?
            .ok_or(ProgressError::CourseNotFound(enrollment.course_id))?;
        Ok(Enrolled { enrollment, course })
    }

    pub(super) async fn snapshot(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<ProgressSnapshot, ProgressError> {
        let lessons = self.progress.lesson_progress(enrollment_id).await?;
        let attempts = self.attempts.attempts(enrollment_id).await?;
        Ok(ProgressSnapshot::new(lessons, attempts))
    }

    /// Builds the aggregate without writing anything.
    pub(super) async fn view(
        &self,
        enrolled: &Enrolled,
        snapshot: &ProgressSnapshot,
    ) -> Result<CourseProgressSnapshot, ProgressError> {
        let issued = self
            .certificates
            .get_certificate(enrolled.enrollment.id)
            .await?
            .is_some();
        Ok(CourseProgressSnapshot::build(
            enrolled.enrollment.id,
            &enrolled.course,
            snapshot,
            issued,
        ))
    }

    /// Recomputes after a write: refreshes the cached percentage and issues the
    /// certificate the first time the course is observed at 100%.
    ///
    /// Rows are re-read from storage so concurrent completions are counted.
    /// The cache is rewritten until a read taken after the write agrees with it.
    pub(super) async fn settle(
        &self,
        enrolled: &Enrolled,
    ) -> Result<CourseProgressSnapshot, ProgressError> {
        let enrollment_id = enrolled.enrollment.id;
        let snapshot = self.snapshot(enrollment_id).await?;
        let mut view = CourseProgressSnapshot::build(enrollment_id, &enrolled.course, &snapshot, false);

        loop {
            let complete = view.progress.is_complete();
            tracing::debug!(
                enrollment_id = %enrollment_id,
                percent = view.overall_progress_percent(),
                "progress recomputed"
            );
            self.enrollments
                .record_progress_cache(
                    enrollment_id,
                    view.overall_progress_percent(),
                    complete.then(|| self.clock.now()),
                )
                .await
                .map_err(|e| not_found_as(e, enrollment_id))?;

            let latest = self.snapshot(enrollment_id).await?;
            let fresh = CourseProgressSnapshot::build(enrollment_id, &enrolled.course, &latest, false);
            if fresh.overall_progress_percent() == view.overall_progress_percent()
                && fresh.progress.is_complete() == complete
            {
                view = fresh;
                break;
            }
            view = fresh;
        }

        view.certificate_issued = if view.progress.is_complete() {
            let candidate = Certificate::issue(enrollment_id, self.clock.now());
            let issued = self
                .certificates
                .issue_certificate(&candidate)
                .await
                .map_err(|e| not_found_as(e, enrollment_id))?;
            if issued.id == candidate.id {
                tracing::info!(
                    enrollment_id = %enrollment_id,
                    certificate_id = %issued.id,
                    "certificate issued"
                );
            }
            true
        } else {
            self.certificates
                .get_certificate(enrollment_id)
                .await?
                .is_some()
        };

        Ok(view)
    }
}

/// Maps a storage `NotFound` raised while writing under an enrollment.
pub(super) fn not_found_as(e: StorageError, enrollment_id: EnrollmentId) -> ProgressError {
    match e {
        StorageError::NotFound => ProgressError::EnrollmentNotFound(enrollment_id),
        StorageError::Conflict => ProgressError::Conflict(enrollment_id),
        other => ProgressError::Storage(other),
    }
}
