use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::rounded_percent;
use crate::model::ids::{EnrollmentId, LessonId, QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz {quiz} has no questions")]
    NoQuestions { quiz: QuizId },

    #[error("quiz {quiz} passing score must be <= 100, got {score}")]
    PassingScoreOutOfRange { quiz: QuizId, score: u8 },

    #[error("quiz {quiz} must allow at least one attempt")]
    ZeroAttemptsAllowed { quiz: QuizId },

    #[error("quiz {quiz} repeats question {question}")]
    DuplicateQuestion { quiz: QuizId, question: QuestionId },

    #[error("no attempts remaining for this quiz")]
    AttemptsExhausted,

    #[error("quiz attempt is not in progress")]
    NotInProgress,
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// A single-choice question; `correct_choice` is the index of the right option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub correct_choice: u32,
}

/// A learner's answer to one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: QuestionId,
    pub choice: u32,
}

impl QuizAnswer {
    #[must_use]
    pub fn new(question_id: QuestionId, choice: u32) -> Self {
        Self {
            question_id,
            choice,
        }
    }
}

/// Quiz embedded in a lesson.
///
/// Scores are whole percentages. `allowed_attempts == None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub id: QuizId,
    pub passing_score: u8,
    #[serde(default)]
    pub allowed_attempts: Option<u32>,
    pub questions: Vec<QuizQuestion>,
}

impl QuizDefinition {
    /// Checks the authoring constraints on a quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` when the quiz has no questions, repeats a question,
    /// has a passing score above 100, or allows zero attempts.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions { quiz: self.id });
        }
        if self.passing_score > 100 {
            return Err(QuizError::PassingScoreOutOfRange {
                quiz: self.id,
                score: self.passing_score,
            });
        }
        if self.allowed_attempts == Some(0) {
            return Err(QuizError::ZeroAttemptsAllowed { quiz: self.id });
        }
        let mut seen = HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            if !seen.insert(question.id) {
                return Err(QuizError::DuplicateQuestion {
                    quiz: self.id,
                    question: question.id,
                });
            }
        }
        Ok(())
    }

    /// Scores a set of answers as a rounded percentage of correct questions.
    ///
    /// Unanswered questions and answers to unknown questions count as wrong.
    /// When a question is answered more than once, the first answer counts.
    #[must_use]
    pub fn grade(&self, answers: &[QuizAnswer]) -> u8 {
        let mut chosen: HashMap<QuestionId, u32> = HashMap::with_capacity(answers.len());
        for answer in answers {
            chosen.entry(answer.question_id).or_insert(answer.choice);
        }

        let correct = self
            .questions
            .iter()
            .filter(|q| chosen.get(&q.id) == Some(&q.correct_choice))
            .count();

        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let correct = u32::try_from(correct).unwrap_or(u32::MAX);
        rounded_percent(correct, total)
    }

    #[must_use]
    pub fn is_passing(&self, score: u8) -> bool {
        score >= self.passing_score
    }

    /// Attempts left after `used` attempts; `None` when unlimited.
    #[must_use]
    pub fn attempts_remaining(&self, used: u32) -> Option<u32> {
        self.allowed_attempts.map(|cap| cap.saturating_sub(used))
    }
}

//
// ─── ATTEMPTS ──────────────────────────────────────────────────────────────────
//

/// One graded submission of a quiz. Attempt numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub quiz_id: QuizId,
    pub attempt_number: u32,
    pub score: u8,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Per (enrollment, quiz) gating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum QuizState {
    NotAttempted,
    /// A learner is taking the quiz. `passed_before` keeps an earlier pass alive.
    InProgress { passed_before: bool },
    Passed,
    FailedRetryable,
    FailedExhausted,
}

impl QuizState {
    /// Derives the resting state of a quiz from its attempt history.
    ///
    /// Attempts belonging to other quizzes are ignored.
    #[must_use]
    pub fn derive<'a>(
        quiz: &QuizDefinition,
        attempts: impl IntoIterator<Item = &'a QuizAttempt>,
    ) -> Self {
        let mut used: u32 = 0;
        let mut passed = false;
        for attempt in attempts.into_iter().filter(|a| a.quiz_id == quiz.id) {
            used = used.saturating_add(1);
            passed |= attempt.passed;
        }

        if passed {
            Self::Passed
        } else if used == 0 {
            Self::NotAttempted
        } else if quiz.attempts_remaining(used) == Some(0) {
            Self::FailedExhausted
        } else {
            Self::FailedRetryable
        }
    }

    /// Begins a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AttemptsExhausted` from `FailedExhausted`, and
    /// `QuizError::NotInProgress` if an attempt is already running.
    pub fn start(self) -> Result<Self, QuizError> {
        match self {
            Self::NotAttempted | Self::FailedRetryable => Ok(Self::InProgress {
                passed_before: false,
            }),
            Self::Passed => Ok(Self::InProgress {
                passed_before: true,
            }),
            Self::FailedExhausted => Err(QuizError::AttemptsExhausted),
            Self::InProgress { .. } => Err(QuizError::NotInProgress),
        }
    }

    /// Finishes the running attempt with `score`; `attempts_used` includes it.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotInProgress` unless the state is `InProgress`.
    pub fn finish(
        self,
        quiz: &QuizDefinition,
        score: u8,
        attempts_used: u32,
    ) -> Result<Self, QuizError> {
        let Self::InProgress { passed_before } = self else {
            return Err(QuizError::NotInProgress);
        };

        if passed_before || quiz.is_passing(score) {
            Ok(Self::Passed)
        } else if quiz.attempts_remaining(attempts_used) == Some(0) {
            Ok(Self::FailedExhausted)
        } else {
            Ok(Self::FailedRetryable)
        }
    }

    /// True when the quiz no longer blocks lesson completion.
    #[must_use]
    pub fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn quiz(passing: u8, cap: Option<u32>) -> QuizDefinition {
        QuizDefinition {
            id: QuizId::new(1),
            passing_score: passing,
            allowed_attempts: cap,
            questions: (1..=4)
                .map(|i| QuizQuestion {
                    id: QuestionId::new(i),
                    correct_choice: 0,
                })
                .collect(),
        }
    }

    fn attempt(number: u32, passed: bool) -> QuizAttempt {
        QuizAttempt {
            enrollment_id: EnrollmentId::new(1),
            lesson_id: LessonId::new(1),
            quiz_id: QuizId::new(1),
            attempt_number: number,
            score: if passed { 100 } else { 0 },
            passed,
            submitted_at: fixed_now(),
        }
    }

    #[test]
    fn grade_counts_first_answer_and_ignores_unknown_questions() {
        let q = quiz(70, None);
        let answers = [
            QuizAnswer::new(QuestionId::new(1), 0),
            QuizAnswer::new(QuestionId::new(1), 3),
            QuizAnswer::new(QuestionId::new(2), 0),
            QuizAnswer::new(QuestionId::new(3), 1),
            QuizAnswer::new(QuestionId::new(99), 0),
        ];
        assert_eq!(q.grade(&answers), 50);
        assert_eq!(q.grade(&[]), 0);
    }

    #[test]
    fn grade_rounds_to_nearest_percent() {
        let mut q = quiz(0, None);
        q.questions.truncate(3);
        let answers = [
            QuizAnswer::new(QuestionId::new(1), 0),
            QuizAnswer::new(QuestionId::new(2), 0),
        ];
        assert_eq!(q.grade(&answers), 67);
    }

    #[test]
    fn validate_rejects_bad_definitions() {
        let mut q = quiz(101, None);
        assert!(matches!(
            q.validate(),
            Err(QuizError::PassingScoreOutOfRange { .. })
        ));
        q.passing_score = 80;
        q.allowed_attempts = Some(0);
        assert!(matches!(
            q.validate(),
            Err(QuizError::ZeroAttemptsAllowed { .. })
        ));
        q.allowed_attempts = None;
        q.questions.push(q.questions[0].clone());
        assert!(matches!(
            q.validate(),
            Err(QuizError::DuplicateQuestion { .. })
        ));
        q.questions.clear();
        assert!(matches!(q.validate(), Err(QuizError::NoQuestions { .. })));
    }

    #[test]
    fn derive_tracks_pass_and_exhaustion() {
        let q = quiz(80, Some(2));
        assert_eq!(QuizState::derive(&q, []), QuizState::NotAttempted);

        let one_fail = [attempt(1, false)];
        assert_eq!(QuizState::derive(&q, &one_fail), QuizState::FailedRetryable);

        let two_fail = [attempt(1, false), attempt(2, false)];
        assert_eq!(QuizState::derive(&q, &two_fail), QuizState::FailedExhausted);

        let pass_then_fail = [attempt(1, true), attempt(2, false)];
        assert_eq!(QuizState::derive(&q, &pass_then_fail), QuizState::Passed);
    }

    #[test]
    fn unlimited_quiz_never_exhausts() {
        let q = quiz(80, None);
        let many: Vec<_> = (1..=50).map(|n| attempt(n, false)).collect();
        assert_eq!(QuizState::derive(&q, &many), QuizState::FailedRetryable);
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        let q = quiz(75, Some(2));

        let running = QuizState::NotAttempted.start().unwrap();
        let after_fail = running.finish(&q, 50, 1).unwrap();
        assert_eq!(after_fail, QuizState::FailedRetryable);

        let running = after_fail.start().unwrap();
        let exhausted = running.finish(&q, 50, 2).unwrap();
        assert_eq!(exhausted, QuizState::FailedExhausted);
        assert_eq!(exhausted.start(), Err(QuizError::AttemptsExhausted));
    }

    #[test]
    fn pass_is_not_revoked_by_later_failure() {
        let q = quiz(75, None);
        let passed = QuizState::NotAttempted
            .start()
            .unwrap()
            .finish(&q, 100, 1)
            .unwrap();
        assert!(passed.is_passed());

        let retake = passed.start().unwrap();
        assert_eq!(
            retake,
            QuizState::InProgress {
                passed_before: true
            }
        );
        assert_eq!(retake.finish(&q, 0, 2).unwrap(), QuizState::Passed);
    }

    #[test]
    fn finish_requires_running_attempt() {
        let q = quiz(75, None);
        assert_eq!(
            QuizState::NotAttempted.finish(&q, 100, 1),
            Err(QuizError::NotInProgress)
        );
    }
}
