use course_core::model::{EnrollmentId, Lesson, LessonId};
use course_core::navigation::{self, NextLesson, PreviousLesson};

use super::service::ProgressService;
use crate::error::ProgressError;

impl ProgressService {
    /// The lesson after `current`, skipping modules that are still locked.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LessonNotFound` if `current` is not in the course.
    pub async fn next_lesson(
        &self,
        enrollment_id: EnrollmentId,
        current: LessonId,
    ) -> Result<NextLesson, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let snapshot = self.snapshot(enrollment_id).await?;
        navigation::next_lesson(&enrolled.course, current, &snapshot).ok_or(
            ProgressError::LessonNotFound {
                course: enrolled.course.id(),
                lesson: current,
            },
        )
    }

    /// The lesson before `current`. Going back is never locked.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LessonNotFound` if `current` is not in the course.
    pub async fn previous_lesson(
        &self,
        enrollment_id: EnrollmentId,
        current: LessonId,
    ) -> Result<PreviousLesson, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        navigation::previous_lesson(&enrolled.course, current).ok_or(
            ProgressError::LessonNotFound {
                course: enrolled.course.id(),
                lesson: current,
            },
        )
    }

    /// Where the learner should pick up; `None` once everything is done.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` for unknown enrollments.
    pub async fn resume_lesson(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Lesson>, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let snapshot = self.snapshot(enrollment_id).await?;
        Ok(navigation::resume_lesson(&enrolled.course, &snapshot).cloned())
    }
}
