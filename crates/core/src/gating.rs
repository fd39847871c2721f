//! Access rules over a content tree and a progress snapshot.
//!
//! Everything here is a pure function: lock state is derived on demand and
//! never stored.

use serde::{Deserialize, Serialize};

use crate::model::{ContentType, Course, Lesson, LessonId, Module, ModuleId, ProgressSnapshot};

/// Marker returned when a lesson may be marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowed;

/// Why a completion request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeniedReason {
    /// Quiz lessons need at least one passing attempt.
    QuizNotPassed,
}

impl DeniedReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeniedReason::QuizNotPassed => "quiz_not_passed",
        }
    }

    /// Message suitable for showing to the learner.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            DeniedReason::QuizNotPassed => "cannot complete lesson: quiz not passed",
        }
    }
}

/// True when every required lesson in `module` is complete.
///
/// A module without required lessons counts as complete.
#[must_use]
pub fn is_module_complete(module: &Module, snapshot: &ProgressSnapshot) -> bool {
    module
        .required_lessons()
        .all(|lesson| snapshot.is_completed(lesson.id))
}

/// A module is unlocked iff each of its prerequisites is complete.
///
/// Prerequisites that are missing from the tree (for example after the catalog
/// removed a module) do not block.
#[must_use]
pub fn is_module_unlocked(course: &Course, module: &Module, snapshot: &ProgressSnapshot) -> bool {
    module.prerequisite_module_ids.iter().all(|id| {
        course
            .module(*id)
            .is_none_or(|prerequisite| is_module_complete(prerequisite, snapshot))
    })
}

/// Ids of all modules currently unlocked, in course order.
#[must_use]
pub fn unlocked_modules(course: &Course, snapshot: &ProgressSnapshot) -> Vec<ModuleId> {
    course
        .modules()
        .iter()
        .filter(|m| is_module_unlocked(course, m, snapshot))
        .map(|m| m.id)
        .collect()
}

/// A lesson can be opened when its module is unlocked; order inside the module
/// does not matter. Unknown lessons are never reachable.
#[must_use]
pub fn is_lesson_reachable(course: &Course, lesson: LessonId, snapshot: &ProgressSnapshot) -> bool {
    course
        .lesson_with_module(lesson)
        .is_some_and(|(module, _)| is_module_unlocked(course, module, snapshot))
}

/// Decides whether `lesson` may be marked complete.
///
/// # Errors
///
/// Returns `DeniedReason::QuizNotPassed` for a quiz lesson without a passing attempt.
pub fn can_complete_lesson(
    lesson: &Lesson,
    snapshot: &ProgressSnapshot,
) -> Result<Allowed, DeniedReason> {
    match lesson.content_type {
        ContentType::Quiz => {
            if snapshot.has_passing_attempt(lesson.id) {
                Ok(Allowed)
            } else {
                Err(DeniedReason::QuizNotPassed)
            }
        }
        // Self-reported; no minimum watch fraction is enforced.
        ContentType::Video | ContentType::Text | ContentType::Exercise | ContentType::Document => {
            Ok(Allowed)
        }
    }
}
