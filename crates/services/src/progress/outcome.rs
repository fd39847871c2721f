use serde::{Deserialize, Serialize};

use course_core::aggregate::CourseProgressSnapshot;
use course_core::gating::DeniedReason;
use course_core::model::{Certificate, QuizState};

/// Result of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LessonCompletion {
    Completed {
        snapshot: CourseProgressSnapshot,
    },
    /// Nothing was written; `snapshot` is the unchanged progress.
    Denied {
        reason: DeniedReason,
        snapshot: CourseProgressSnapshot,
    },
}

impl LessonCompletion {
    #[must_use]
    pub fn snapshot(&self) -> &CourseProgressSnapshot {
        match self {
            Self::Completed { snapshot } | Self::Denied { snapshot, .. } => snapshot,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn denied_reason(&self) -> Option<DeniedReason> {
        match self {
            Self::Denied { reason, .. } => Some(*reason),
            Self::Completed { .. } => None,
        }
    }
}

/// Result of a graded quiz submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub passed: bool,
    pub score: u8,
    pub attempt_number: u32,
    /// `None` when the quiz allows unlimited attempts.
    pub attempts_remaining: Option<u32>,
    pub state: QuizState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "certificate")]
pub enum CertificateStatus {
    Issued(Certificate),
    NotIssuedYet,
}

impl CertificateStatus {
    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            Self::Issued(certificate) => Some(certificate),
            Self::NotIssuedYet => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::EnrollmentId;
    use course_core::time::fixed_now;

    #[test]
    fn certificate_status_serializes_with_status_tag() {
        let pending = serde_json::to_value(CertificateStatus::NotIssuedYet).unwrap();
        assert_eq!(pending, serde_json::json!({ "status": "not_issued_yet" }));

        let issued = CertificateStatus::Issued(Certificate::issue(EnrollmentId::new(3), fixed_now()));
        let value = serde_json::to_value(&issued).unwrap();
        assert_eq!(value["status"], "issued");
        assert_eq!(value["certificate"]["enrollment_id"], 3);
    }

    #[test]
    fn quiz_submission_carries_state_tag() {
        let submission = QuizSubmission {
            passed: false,
            score: 40,
            attempt_number: 2,
            attempts_remaining: Some(0),
            state: QuizState::FailedExhausted,
        };
        let value = serde_json::to_value(submission).unwrap();
        assert_eq!(value["state"]["state"], "failed_exhausted");
        assert_eq!(value["attempts_remaining"], 0);
    }
}
