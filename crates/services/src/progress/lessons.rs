use course_core::gating::can_complete_lesson;
use course_core::model::{EnrollmentId, LessonId, LessonProgress};

use super::outcome::LessonCompletion;
use super::service::{ProgressService, not_found_as};
use crate::error::ProgressError;

impl ProgressService {
    /// Mark a lesson complete and recompute the aggregate.
    ///
    /// Completing an already completed lesson changes nothing and returns the
    /// same snapshot. Quiz lessons are refused until an attempt has passed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `ProgressError::LessonNotFound`
    /// for unknown ids. Returns `ProgressError::Storage` if persistence fails.
    pub async fn complete_lesson(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        time_spent_seconds: u64,
    ) -> Result<LessonCompletion, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let lesson = enrolled.lesson(lesson_id)?;
        let snapshot = self.snapshot(enrollment_id).await?;

        if let Err(reason) = can_complete_lesson(lesson, &snapshot) {
            tracing::warn!(
                enrollment_id = %enrollment_id,
                lesson_id = %lesson_id,
                reason = reason.as_str(),
                "lesson completion denied"
            );
            let snapshot = self.view(&enrolled, &snapshot).await?;
            return Ok(LessonCompletion::Denied { reason, snapshot });
        }

        let row = self
            .progress
            .mark_completed(enrollment_id, lesson_id, time_spent_seconds, self.clock.now())
            .await
            .map_err(|e| not_found_as(e, enrollment_id))?;
        tracing::info!(
            enrollment_id = %enrollment_id,
            lesson_id = %lesson_id,
            time_spent_seconds = row.time_spent_seconds,
            "lesson completed"
        );
        self.touch(enrollment_id, lesson_id).await?;

        let snapshot = self.settle(&enrolled).await?;
        Ok(LessonCompletion::Completed { snapshot })
    }

    /// Record how far into a video the learner got.
    ///
    /// The stored fraction only ever grows and never completes the lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidVideoFraction` for values outside `[0, 1]`,
    /// and the not-found variants for unknown ids.
    pub async fn update_video_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        fraction: f64,
    ) -> Result<LessonProgress, ProgressError> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(ProgressError::InvalidVideoFraction(fraction));
        }
        let enrolled = self.load(enrollment_id).await?;
        enrolled.lesson(lesson_id)?;

        let row = self
            .progress
            .raise_video_fraction(enrollment_id, lesson_id, fraction, self.clock.now())
            .await
            .map_err(|e| not_found_as(e, enrollment_id))?;
        tracing::debug!(
            enrollment_id = %enrollment_id,
            lesson_id = %lesson_id,
            fraction = row.video_watched_fraction,
            "video progress recorded"
        );
        self.touch(enrollment_id, lesson_id).await?;
        Ok(row)
    }

    /// Accumulate time spent on a lesson without completing it.
    ///
    /// # Errors
    ///
    /// Returns the not-found variants for unknown ids and
    /// `ProgressError::Storage` if persistence fails.
    pub async fn record_time_spent(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        seconds: u64,
    ) -> Result<LessonProgress, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        enrolled.lesson(lesson_id)?;

        let row = self
            .progress
            .add_time_spent(enrollment_id, lesson_id, seconds, self.clock.now())
            .await
            .map_err(|e| not_found_as(e, enrollment_id))?;
        self.touch(enrollment_id, lesson_id).await?;
        Ok(row)
    }

    pub(super) async fn touch(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<(), ProgressError> {
        self.enrollments
            .touch_last_lesson(enrollment_id, lesson_id)
            .await
            .map_err(|e| not_found_as(e, enrollment_id))
    }
}
