use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Certificate, Course, CourseId, Enrollment, EnrollmentId, LearnerId, LessonId, LessonProgress,
    QuizAttempt, QuizId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Insert shape for an enrollment; the id is assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewEnrollmentRecord {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
}

/// A graded submission waiting for its attempt number.
#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub quiz_id: QuizId,
    pub score: u8,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

impl NewQuizAttempt {
    fn numbered(self, attempt_number: u32) -> QuizAttempt {
        QuizAttempt {
            enrollment_id: self.enrollment_id,
            lesson_id: self.lesson_id,
            quiz_id: self.quiz_id,
            attempt_number,
            score: self.score,
            passed: self.passed,
            submitted_at: self.submitted_at,
        }
    }
}

/// Outcome of appending an attempt under an optional cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendAttempt {
    Appended(QuizAttempt),
    LimitReached,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read-only content trees published by the catalog.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Store (or replace) a course tree.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course tree by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Create an enrollment and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the learner is already enrolled in the
    /// course, `StorageError::NotFound` if the course is unknown.
    async fn insert_new_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_enrollment(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Refresh the cached percentage. `completed_at` is only written if unset.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown enrollments.
    async fn record_progress_cache(
        &self,
        id: EnrollmentId,
        percent: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    /// Remember the last lesson the learner interacted with.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown enrollments.
    async fn touch_last_lesson(
        &self,
        id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError>;

    /// Delete an enrollment together with all its progress, attempts and certificate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown enrollments.
    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<(), StorageError>;
}

/// Per (enrollment, lesson) rows. Every method is a single atomic
/// read-modify-write of one row, creating it on first touch.
#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// Mark a lesson complete. Re-completing leaves the row untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn mark_completed(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        time_spent_seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// Raise the watched fraction; a lower value leaves the stored one in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn raise_video_fraction(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        fraction: f64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn add_time_spent(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// All rows for an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError>;
}

#[async_trait]
pub trait QuizAttemptRepository: Send + Sync {
    /// Number and store an attempt, unless `max_attempts` are already used.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a concurrent writer took the same
    /// attempt number, `StorageError::NotFound` for unknown enrollments.
    async fn append_attempt(
        &self,
        attempt: NewQuizAttempt,
        max_attempts: Option<u32>,
    ) -> Result<AppendAttempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn attempts(&self, enrollment_id: EnrollmentId)
    -> Result<Vec<QuizAttempt>, StorageError>;
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Store `certificate` unless one already exists; returns the stored one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn issue_certificate(&self, certificate: &Certificate)
    -> Result<Certificate, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_certificate(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

type Shared<T> = Arc<Mutex<T>>;

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Each table sits behind its own mutex, so a row update is atomic with
/// respect to every other write on that table.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Shared<HashMap<CourseId, Course>>,
    enrollments: Shared<HashMap<EnrollmentId, Enrollment>>,
    next_enrollment_id: Shared<u64>,
    progress: Shared<HashMap<EnrollmentId, HashMap<LessonId, LessonProgress>>>,
    attempts: Shared<HashMap<EnrollmentId, Vec<QuizAttempt>>>,
    certificates: Shared<HashMap<EnrollmentId, Certificate>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the enrollment table after checking `id` exists.
    ///
    /// Writers keep the guard while touching child tables so a concurrent
    /// `delete_enrollment` cannot leave orphan rows behind.
    fn lock_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<MutexGuard<'_, HashMap<EnrollmentId, Enrollment>>, StorageError> {
        let guard = lock(&self.enrollments)?;
        if guard.contains_key(&id) {
            Ok(guard)
        } else {
            Err(StorageError::NotFound)
        }
    }

    fn update_row(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut LessonProgress),
    ) -> Result<LessonProgress, StorageError> {
        let _enrollments = self.lock_enrollment(enrollment_id)?;
        let mut guard = lock(&self.progress)?;
        let row = guard
            .entry(enrollment_id)
            .or_default()
            .entry(lesson_id)
            .or_insert_with(|| LessonProgress::untouched(enrollment_id, lesson_id, at));
        apply(row);
        Ok(row.clone())
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        lock(&self.courses)?.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(lock(&self.courses)?.get(&id).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn insert_new_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError> {
        if !lock(&self.courses)?.contains_key(&record.course_id) {
            return Err(StorageError::NotFound);
        }
        let mut guard = lock(&self.enrollments)?;
        if guard
            .values()
            .any(|e| e.learner_id == record.learner_id && e.course_id == record.course_id)
        {
            return Err(StorageError::Conflict);
        }
        let mut next = lock(&self.next_enrollment_id)?;
        *next += 1;
        let id = EnrollmentId::new(*next);
        guard.insert(
            id,
            Enrollment::new(id, record.learner_id, record.course_id, record.enrolled_at),
        );
        Ok(id)
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError> {
        Ok(lock(&self.enrollments)?.get(&id).cloned())
    }

    async fn find_enrollment(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(lock(&self.enrollments)?
            .values()
            .find(|e| e.learner_id == learner_id && e.course_id == course_id)
            .cloned())
    }

    async fn record_progress_cache(
        &self,
        id: EnrollmentId,
        percent: u8,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.enrollments)?;
        let enrollment = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        enrollment.overall_progress_percent = percent;
        if enrollment.completed_at.is_none() {
            enrollment.completed_at = completed_at;
        }
        Ok(())
    }

    async fn touch_last_lesson(
        &self,
        id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.enrollments)?;
        let enrollment = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        enrollment.last_lesson_id = Some(lesson_id);
        Ok(())
    }

    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<(), StorageError> {
        let mut enrollments = lock(&self.enrollments)?;
        enrollments.remove(&id).ok_or(StorageError::NotFound)?;
        lock(&self.progress)?.remove(&id);
        lock(&self.attempts)?.remove(&id);
        lock(&self.certificates)?.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn mark_completed(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        time_spent_seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.update_row(enrollment_id, lesson_id, at, |row| {
            row.complete(time_spent_seconds, at);
        })
    }

    async fn raise_video_fraction(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        fraction: f64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.update_row(enrollment_id, lesson_id, at, |row| {
            row.watch(fraction, at);
        })
    }

    async fn add_time_spent(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        seconds: u64,
        at: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        self.update_row(enrollment_id, lesson_id, at, |row| row.add_time(seconds, at))
    }

    async fn lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = lock(&self.progress)?;
        let mut rows: Vec<LessonProgress> = guard
            .get(&enrollment_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.lesson_id);
        Ok(rows)
    }
}

#[async_trait]
impl QuizAttemptRepository for InMemoryRepository {
    async fn append_attempt(
        &self,
        attempt: NewQuizAttempt,
        max_attempts: Option<u32>,
    ) -> Result<AppendAttempt, StorageError> {
        let _enrollments = self.lock_enrollment(attempt.enrollment_id)?;
        let mut guard = lock(&self.attempts)?;
        let history = guard.entry(attempt.enrollment_id).or_default();
        let used = history
            .iter()
            .filter(|a| a.lesson_id == attempt.lesson_id && a.quiz_id == attempt.quiz_id)
            .count();
        let used = u32::try_from(used).map_err(|_| StorageError::Conflict)?;
        if max_attempts.is_some_and(|cap| used >= cap) {
            return Ok(AppendAttempt::LimitReached);
        }
        let stored = attempt.numbered(used + 1);
        history.push(stored.clone());
        Ok(AppendAttempt::Appended(stored))
    }

    async fn attempts(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        Ok(lock(&self.attempts)?
            .get(&enrollment_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CertificateRepository for InMemoryRepository {
    async fn issue_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<Certificate, StorageError> {
        let _enrollments = self.lock_enrollment(certificate.enrollment_id)?;
        let mut guard = lock(&self.certificates)?;
        Ok(guard
            .entry(certificate.enrollment_id)
            .or_insert_with(|| certificate.clone())
            .clone())
    }

    async fn get_certificate(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError> {
        Ok(lock(&self.certificates)?.get(&enrollment_id).cloned())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn LessonProgressRepository>,
    pub quiz_attempts: Arc<dyn QuizAttemptRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository slot to the same backend.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CourseRepository
            + EnrollmentRepository
            + LessonProgressRepository
            + QuizAttemptRepository
            + CertificateRepository
            + Clone
            + 'static,
    {
        Self {
            courses: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            quiz_attempts: Arc::new(repo.clone()),
            certificates: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ContentType, Lesson, Module, ModuleId};
    use course_core::time::fixed_now;

    fn course() -> Course {
        Course::new(
            CourseId::new(1),
            "Course",
            vec![Module::new(
                ModuleId::new(1),
                0,
                vec![Lesson::new(LessonId::new(1), 0, ContentType::Video)],
            )],
        )
        .unwrap()
    }

    async fn enrolled(repo: &InMemoryRepository) -> EnrollmentId {
        repo.upsert_course(&course()).await.unwrap();
        repo.insert_new_enrollment(NewEnrollmentRecord {
            learner_id: LearnerId::new(5),
            course_id: CourseId::new(1),
            enrolled_at: fixed_now(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_enrollment_conflicts() {
        let repo = InMemoryRepository::new();
        enrolled(&repo).await;
        let err = repo
            .insert_new_enrollment(NewEnrollmentRecord {
                learner_id: LearnerId::new(5),
                course_id: CourseId::new(1),
                enrolled_at: fixed_now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn progress_rows_are_created_lazily_and_monotonic() {
        let repo = InMemoryRepository::new();
        let id = enrolled(&repo).await;
        let lesson = LessonId::new(1);

        assert!(repo.lesson_progress(id).await.unwrap().is_empty());
        repo.raise_video_fraction(id, lesson, 0.8, fixed_now())
            .await
            .unwrap();
        let row = repo
            .raise_video_fraction(id, lesson, 0.3, fixed_now())
            .await
            .unwrap();
        assert!((row.video_watched_fraction - 0.8).abs() < f64::EPSILON);

        let first = repo.mark_completed(id, lesson, 60, fixed_now()).await.unwrap();
        let again = repo.mark_completed(id, lesson, 60, fixed_now()).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(again.time_spent_seconds, 60);
    }

    #[tokio::test]
    async fn writes_for_unknown_enrollment_fail() {
        let repo = InMemoryRepository::new();
        let err = repo
            .mark_completed(EnrollmentId::new(9), LessonId::new(1), 0, fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn attempts_respect_cap() {
        let repo = InMemoryRepository::new();
        let id = enrolled(&repo).await;
        let new = || NewQuizAttempt {
            enrollment_id: id,
            lesson_id: LessonId::new(1),
            quiz_id: QuizId::new(1),
            score: 10,
            passed: false,
            submitted_at: fixed_now(),
        };

        let first = repo.append_attempt(new(), Some(2)).await.unwrap();
        assert!(matches!(first, AppendAttempt::Appended(ref a) if a.attempt_number == 1));
        let second = repo.append_attempt(new(), Some(2)).await.unwrap();
        assert!(matches!(second, AppendAttempt::Appended(ref a) if a.attempt_number == 2));
        assert_eq!(
            repo.append_attempt(new(), Some(2)).await.unwrap(),
            AppendAttempt::LimitReached
        );
        assert_eq!(repo.attempts(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn certificate_first_issue_wins_and_delete_cascades() {
        let repo = InMemoryRepository::new();
        let id = enrolled(&repo).await;

        let first = repo
            .issue_certificate(&Certificate::issue(id, fixed_now()))
            .await
            .unwrap();
        let second = repo
            .issue_certificate(&Certificate::issue(id, fixed_now()))
            .await
            .unwrap();
        assert_eq!(first, second);

        repo.mark_completed(id, LessonId::new(1), 0, fixed_now())
            .await
            .unwrap();
        repo.delete_enrollment(id).await.unwrap();
        assert!(repo.get_certificate(id).await.unwrap().is_none());
        assert!(repo.lesson_progress(id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_racing_a_delete_leave_no_orphans() {
        for _ in 0..50 {
            let repo = InMemoryRepository::new();
            let id = enrolled(&repo).await;

            let mut writers = Vec::new();
            for lesson in 1..=8 {
                let repo = repo.clone();
                writers.push(tokio::spawn(async move {
                    let _ = repo
                        .mark_completed(id, LessonId::new(lesson), 5, fixed_now())
                        .await;
                    let _ = repo
                        .issue_certificate(&Certificate::issue(id, fixed_now()))
                        .await;
                }));
            }
            let deleter = {
                let repo = repo.clone();
                tokio::spawn(async move { repo.delete_enrollment(id).await })
            };

            deleter.await.unwrap().unwrap();
            for writer in writers {
                writer.await.unwrap();
            }
            assert!(repo.lesson_progress(id).await.unwrap().is_empty());
            assert!(repo.get_certificate(id).await.unwrap().is_none());
        }
    }
}
