use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{EnrollmentId, LessonId};
use crate::model::quiz::QuizAttempt;

/// Per (enrollment, lesson) progress row.
///
/// Rows are created lazily on first interaction and never deleted.
/// `is_completed` flips to true at most once; `video_watched_fraction` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub is_completed: bool,
    pub video_watched_fraction: f64,
    pub time_spent_seconds: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LessonProgress {
    /// Fresh row for a lesson that has not been touched yet.
    #[must_use]
    pub fn untouched(enrollment_id: EnrollmentId, lesson_id: LessonId, at: DateTime<Utc>) -> Self {
        Self {
            enrollment_id,
            lesson_id,
            is_completed: false,
            video_watched_fraction: 0.0,
            time_spent_seconds: 0,
            completed_at: None,
            updated_at: at,
        }
    }

    /// Marks the lesson complete, adding `time_spent_seconds` on the first call.
    ///
    /// Returns `false` (and leaves the row untouched) when already complete.
    pub fn complete(&mut self, time_spent_seconds: u64, at: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(at);
        self.time_spent_seconds = self.time_spent_seconds.saturating_add(time_spent_seconds);
        self.updated_at = at;
        true
    }

    /// Raises the watched fraction; lower values are ignored.
    ///
    /// Returns `true` if the stored fraction changed.
    pub fn watch(&mut self, fraction: f64, at: DateTime<Utc>) -> bool {
        if fraction <= self.video_watched_fraction {
            return false;
        }
        self.video_watched_fraction = fraction;
        self.updated_at = at;
        true
    }

    pub fn add_time(&mut self, seconds: u64, at: DateTime<Utc>) {
        self.time_spent_seconds = self.time_spent_seconds.saturating_add(seconds);
        self.updated_at = at;
    }
}

/// Read-only view of everything recorded for one enrollment.
///
/// This is the input to gating, aggregation and navigation. Rows for lessons
/// that are no longer part of the course are kept but never counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    lessons: HashMap<LessonId, LessonProgress>,
    attempts: HashMap<LessonId, Vec<QuizAttempt>>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(
        lessons: impl IntoIterator<Item = LessonProgress>,
        attempts: impl IntoIterator<Item = QuizAttempt>,
    ) -> Self {
        let lessons = lessons.into_iter().map(|p| (p.lesson_id, p)).collect();
        let mut by_lesson: HashMap<LessonId, Vec<QuizAttempt>> = HashMap::new();
        for attempt in attempts {
            by_lesson.entry(attempt.lesson_id).or_default().push(attempt);
        }
        for list in by_lesson.values_mut() {
            list.sort_by_key(|a| (a.quiz_id, a.attempt_number));
        }
        Self {
            lessons,
            attempts: by_lesson,
        }
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&LessonProgress> {
        self.lessons.get(&id)
    }

    #[must_use]
    pub fn is_completed(&self, id: LessonId) -> bool {
        self.lessons.get(&id).is_some_and(|p| p.is_completed)
    }

    /// Attempts for a lesson ordered by quiz and attempt number.
    #[must_use]
    pub fn attempts(&self, lesson: LessonId) -> &[QuizAttempt] {
        self.attempts.get(&lesson).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has_passing_attempt(&self, lesson: LessonId) -> bool {
        self.attempts(lesson).iter().any(|a| a.passed)
    }
}
