use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CertificateId, CourseId, EnrollmentId, LearnerId, LessonId};

/// A learner's registration in one course.
///
/// `overall_progress_percent` is a cache of the last recomputation and is never
/// used for decisions; `completed_at` records the first time 100% was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub overall_progress_percent: u8,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_lesson_id: Option<LessonId>,
}

impl Enrollment {
    #[must_use]
    pub fn new(
        id: EnrollmentId,
        learner_id: LearnerId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            course_id,
            enrolled_at,
            overall_progress_percent: 0,
            completed_at: None,
            last_lesson_id: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Proof of course completion. At most one exists per enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub enrollment_id: EnrollmentId,
    pub issued_at: DateTime<Utc>,
}

impl Certificate {
    #[must_use]
    pub fn issue(enrollment_id: EnrollmentId, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: CertificateId::generate(),
            enrollment_id,
            issued_at,
        }
    }
}
