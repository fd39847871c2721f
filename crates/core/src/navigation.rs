//! Next/previous lesson across module boundaries.

use serde::{Deserialize, Serialize};

use crate::gating::is_module_unlocked;
use crate::model::{Course, Lesson, LessonId, ProgressSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "lesson")]
pub enum NextLesson {
    Lesson(Lesson),
    EndOfCourse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "lesson")]
pub enum PreviousLesson {
    Lesson(Lesson),
    StartOfCourse,
}

/// First lesson after `current` whose module is unlocked.
///
/// Returns `None` if `current` is not part of the course.
#[must_use]
pub fn next_lesson(
    course: &Course,
    current: LessonId,
    snapshot: &ProgressSnapshot,
) -> Option<NextLesson> {
    let position = course.linear_position(current)?;
    let next = course
        .linear_lessons()
        .skip(position + 1)
        .find(|(module, _)| is_module_unlocked(course, module, snapshot))
        .map(|(_, lesson)| lesson.clone());

    Some(next.map_or(NextLesson::EndOfCourse, NextLesson::Lesson))
}

/// Lesson immediately before `current`. Earlier material is never locked out.
///
/// Returns `None` if `current` is not part of the course.
#[must_use]
pub fn previous_lesson(course: &Course, current: LessonId) -> Option<PreviousLesson> {
    let position = course.linear_position(current)?;
    let previous = position
        .checked_sub(1)
        .and_then(|idx| course.linear_lessons().nth(idx))
        .map(|(_, lesson)| lesson.clone());

    Some(previous.map_or(PreviousLesson::StartOfCourse, PreviousLesson::Lesson))
}

/// Where a learner should pick up: the first incomplete lesson in an unlocked module.
#[must_use]
pub fn resume_lesson<'a>(course: &'a Course, snapshot: &ProgressSnapshot) -> Option<&'a Lesson> {
    course
        .linear_lessons()
        .filter(|(_, lesson)| !snapshot.is_completed(lesson.id))
        .find(|(module, _)| is_module_unlocked(course, module, snapshot))
        .map(|(_, lesson)| lesson)
}
