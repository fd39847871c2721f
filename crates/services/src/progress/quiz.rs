use course_core::model::{
    EnrollmentId, LessonId, QuizAnswer, QuizDefinition, QuizError, QuizId, QuizState,
};
use storage::repository::{AppendAttempt, NewQuizAttempt};

use super::outcome::QuizSubmission;
use super::service::{Enrolled, ProgressService, not_found_as};
use crate::error::ProgressError;

fn quiz_of(
    enrolled: &Enrolled,
    lesson_id: LessonId,
    quiz_id: QuizId,
) -> Result<&QuizDefinition, ProgressError> {
    enrolled
        .lesson(lesson_id)?
        .quiz(quiz_id)
        .ok_or(ProgressError::QuizNotFound {
            lesson: lesson_id,
            quiz: quiz_id,
        })
}

fn exhausted(quiz_id: QuizId) -> impl FnOnce(QuizError) -> ProgressError {
    move |e| match e {
        QuizError::AttemptsExhausted => ProgressError::AttemptsExhausted(quiz_id),
        other => ProgressError::Quiz(other),
    }
}

impl ProgressService {
    /// Resting state of a quiz, derived from the attempt history.
    ///
    /// # Errors
    ///
    /// Returns the not-found variants for unknown enrollments, lessons or quizzes.
    pub async fn quiz_state(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        quiz_id: QuizId,
    ) -> Result<QuizState, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let quiz = quiz_of(&enrolled, lesson_id, quiz_id)?;
        let snapshot = self.snapshot(enrollment_id).await?;
        Ok(QuizState::derive(quiz, snapshot.attempts(lesson_id)))
    }

    /// Open a new attempt. Nothing is persisted until the answers come in.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::AttemptsExhausted` once every allowed attempt
    /// has been used without a pass.
    pub async fn start_quiz(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        quiz_id: QuizId,
    ) -> Result<QuizState, ProgressError> {
        self.quiz_state(enrollment_id, lesson_id, quiz_id)
            .await?
            .start()
            .map_err(exhausted(quiz_id))
    }

    /// Grade and record an attempt.
    ///
    /// The attempt number and the attempt cap are settled by storage in one
    /// step. A pass unlocks completion of the lesson; later failures never
    /// revoke it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::AttemptsExhausted` when no attempt is left,
    /// `ProgressError::Conflict` if a concurrent submission took the same
    /// attempt number, and the not-found variants for unknown ids.
    pub async fn submit_quiz_attempt(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        quiz_id: QuizId,
        answers: &[QuizAnswer],
    ) -> Result<QuizSubmission, ProgressError> {
        let enrolled = self.load(enrollment_id).await?;
        let quiz = quiz_of(&enrolled, lesson_id, quiz_id)?;
        let snapshot = self.snapshot(enrollment_id).await?;

        let running = QuizState::derive(quiz, snapshot.attempts(lesson_id))
            .start()
            .map_err(exhausted(quiz_id))
            .inspect_err(|_| {
                tracing::warn!(
                    enrollment_id = %enrollment_id,
                    quiz_id = %quiz_id,
                    "quiz submission refused: attempts exhausted"
                );
            })?;

        let score = quiz.grade(answers);
        let passed = quiz.is_passing(score);
        let appended = self
            .attempts
            .append_attempt(
                NewQuizAttempt {
                    enrollment_id,
                    lesson_id,
                    quiz_id,
                    score,
                    passed,
                    submitted_at: self.clock.now(),
                },
                quiz.allowed_attempts,
            )
            .await
            .map_err(|e| not_found_as(e, enrollment_id))?;

        let attempt = match appended {
            AppendAttempt::Appended(attempt) => attempt,
            AppendAttempt::LimitReached => {
                tracing::warn!(
                    enrollment_id = %enrollment_id,
                    quiz_id = %quiz_id,
                    "quiz submission refused: attempt cap reached"
                );
                return Err(ProgressError::AttemptsExhausted(quiz_id));
            }
        };

        let state = running
            .finish(quiz, score, attempt.attempt_number)
            .map_err(ProgressError::Quiz)?;
        tracing::info!(
            enrollment_id = %enrollment_id,
            quiz_id = %quiz_id,
            attempt_number = attempt.attempt_number,
            score,
            passed,
            "quiz attempt recorded"
        );
        self.touch(enrollment_id, lesson_id).await?;

        Ok(QuizSubmission {
            passed,
            score,
            attempt_number: attempt.attempt_number,
            attempts_remaining: quiz.attempts_remaining(attempt.attempt_number),
            state,
        })
    }
}
