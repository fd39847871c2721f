//! Completion percentages, recomputed from raw lesson rows on every call.

use serde::{Deserialize, Serialize};

use crate::gating::{is_module_complete, is_module_unlocked};
use crate::model::{CourseId, Course, EnrollmentId, LessonId, Module, ModuleId, ProgressSnapshot};
use crate::navigation::resume_lesson;

/// `round(100 * part / whole)` with halves rounded up, in integer arithmetic.
///
/// An empty whole counts as fully done.
#[must_use]
pub fn rounded_percent(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 100;
    }
    let part = u64::from(part.min(whole));
    let whole = u64::from(whole);
    let pct = (200 * part + whole) / (2 * whole);
    u8::try_from(pct).unwrap_or(100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub unlocked: bool,
    pub completed_required_lessons: u32,
    pub total_required_lessons: u32,
    pub percent: u8,
    pub is_complete: bool,
    pub has_certificate_checkpoint: bool,
}

/// Aggregate over one course for one enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub overall_progress_percent: u8,
    pub completed_required_lessons: u32,
    pub total_required_lessons: u32,
    pub per_module: Vec<ModuleProgress>,
    pub certificate_checkpoints_complete: bool,
}

impl CourseProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.overall_progress_percent == 100
    }
}

fn count_required(module: &Module, snapshot: &ProgressSnapshot) -> (u32, u32) {
    let mut done: u32 = 0;
    let mut total: u32 = 0;
    for lesson in module.required_lessons() {
        total = total.saturating_add(1);
        if snapshot.is_completed(lesson.id) {
            done = done.saturating_add(1);
        }
    }
    (done, total)
}

/// Computes module and course completion. Optional lessons are ignored.
#[must_use]
pub fn course_progress(course: &Course, snapshot: &ProgressSnapshot) -> CourseProgress {
    let mut per_module = Vec::with_capacity(course.modules().len());
    let mut completed: u32 = 0;
    let mut total: u32 = 0;

    for module in course.modules() {
        let (done, required) = count_required(module, snapshot);
        completed = completed.saturating_add(done);
        total = total.saturating_add(required);
        per_module.push(ModuleProgress {
            module_id: module.id,
            unlocked: is_module_unlocked(course, module, snapshot),
            completed_required_lessons: done,
            total_required_lessons: required,
            percent: rounded_percent(done, required),
            is_complete: is_module_complete(module, snapshot),
            has_certificate_checkpoint: module.has_certificate_checkpoint,
        });
    }

    let certificate_checkpoints_complete = per_module
        .iter()
        .filter(|m| m.has_certificate_checkpoint)
        .all(|m| m.is_complete);

    CourseProgress {
        overall_progress_percent: rounded_percent(completed, total),
        completed_required_lessons: completed,
        total_required_lessons: total,
        per_module,
        certificate_checkpoints_complete,
    }
}

/// What the API layer returns for an enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgressSnapshot {
    pub enrollment_id: EnrollmentId,
    pub course_id: CourseId,
    #[serde(flatten)]
    pub progress: CourseProgress,
    /// First incomplete lesson the learner can open, if any.
    pub next_lesson: Option<LessonId>,
    pub certificate_issued: bool,
}

impl CourseProgressSnapshot {
    #[must_use]
    pub fn build(
        enrollment_id: EnrollmentId,
        course: &Course,
        snapshot: &ProgressSnapshot,
        certificate_issued: bool,
    ) -> Self {
        Self {
            enrollment_id,
            course_id: course.id(),
            progress: course_progress(course, snapshot),
            next_lesson: resume_lesson(course, snapshot).map(|l| l.id),
            certificate_issued,
        }
    }

    #[must_use]
    pub fn overall_progress_percent(&self) -> u8 {
        self.progress.overall_progress_percent
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&ModuleProgress> {
        self.progress.per_module.iter().find(|m| m.module_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentType, Lesson, LessonProgress};
    use crate::time::fixed_now;
    use proptest::prelude::*;

    fn done(lesson: u64) -> LessonProgress {
        let mut p =
            LessonProgress::untouched(EnrollmentId::new(1), LessonId::new(lesson), fixed_now());
        p.complete(0, fixed_now());
        p
    }

    fn text(id: u64, order: u32) -> Lesson {
        Lesson::new(LessonId::new(id), order, ContentType::Text)
    }

    fn two_module_course() -> Course {
        Course::new(
            CourseId::new(7),
            "Scenario",
            vec![
                Module::new(ModuleId::new(1), 0, vec![text(1, 0), text(2, 1)]),
                Module::new(ModuleId::new(2), 1, vec![text(3, 0)])
                    .requires(ModuleId::new(1))
                    .certificate_checkpoint(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rounding_matches_expectations() {
        assert_eq!(rounded_percent(0, 3), 0);
        assert_eq!(rounded_percent(1, 3), 33);
        assert_eq!(rounded_percent(2, 3), 67);
        assert_eq!(rounded_percent(1, 8), 13);
        assert_eq!(rounded_percent(3, 3), 100);
        assert_eq!(rounded_percent(0, 0), 100);
        assert_eq!(rounded_percent(5, 3), 100);
    }

    #[test]
    fn scenario_two_of_three() {
        let course = two_module_course();
        let snapshot = ProgressSnapshot::new([done(1), done(2)], []);
        let progress = course_progress(&course, &snapshot);

        assert_eq!(progress.overall_progress_percent, 67);
        assert!(progress.per_module[0].is_complete);
        assert!(progress.per_module[1].unlocked);
        assert!(!progress.certificate_checkpoints_complete);
        assert!(!progress.is_complete());

        let snapshot = ProgressSnapshot::new([done(1), done(2), done(3)], []);
        let progress = course_progress(&course, &snapshot);
        assert!(progress.is_complete());
        assert!(progress.certificate_checkpoints_complete);
    }

    #[test]
    fn optional_and_foreign_rows_are_ignored() {
        let course = Course::new(
            CourseId::new(1),
            "Optional",
            vec![Module::new(
                ModuleId::new(1),
                0,
                vec![text(1, 0), text(2, 1).optional()],
            )],
        )
        .unwrap();

        // lesson 42 was removed from the catalog after it was completed
        let snapshot = ProgressSnapshot::new([done(2), done(42)], []);
        let progress = course_progress(&course, &snapshot);
        assert_eq!(progress.total_required_lessons, 1);
        assert_eq!(progress.completed_required_lessons, 0);
        assert_eq!(progress.overall_progress_percent, 0);
    }

    #[test]
    fn snapshot_reports_resume_point() {
        let course = two_module_course();
        let snapshot = ProgressSnapshot::new([done(1)], []);
        let view = CourseProgressSnapshot::build(EnrollmentId::new(3), &course, &snapshot, false);
        assert_eq!(view.next_lesson, Some(LessonId::new(2)));
        assert_eq!(view.overall_progress_percent(), 33);
        assert!(!view.module(ModuleId::new(2)).unwrap().unlocked);
    }

    proptest! {
        #[test]
        fn percent_matches_rounded_ratio(n in 1_u64..40, picks in proptest::collection::vec(any::<bool>(), 40)) {
            let lessons: Vec<Lesson> = (1..=n).map(|i| text(i, u32::try_from(i).unwrap())).collect();
            let course = Course::new(
                CourseId::new(1),
                "Prop",
                vec![Module::new(ModuleId::new(1), 0, lessons)],
            ).unwrap();

            let completed: Vec<LessonProgress> = (1..=n)
                .filter(|i| picks[usize::try_from(*i - 1).unwrap()])
                .map(done)
                .collect();
            let k = completed.len() as f64;
            let expected = (100.0 * k / n as f64).round() as u8;

            let progress = course_progress(&course, &ProgressSnapshot::new(completed, []));
            prop_assert_eq!(progress.overall_progress_percent, expected);
        }
    }
}
