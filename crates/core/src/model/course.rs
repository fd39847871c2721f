use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, ModuleId, QuizId};
use crate::model::quiz::{QuizDefinition, QuizError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("module {0} appears more than once")]
    DuplicateModule(ModuleId),

    #[error("lesson {0} appears more than once")]
    DuplicateLesson(LessonId),

    #[error("module {module} requires unknown module {prerequisite}")]
    UnknownPrerequisite {
        module: ModuleId,
        prerequisite: ModuleId,
    },

    #[error("module {0} lists itself as a prerequisite")]
    SelfPrerequisite(ModuleId),

    #[error("prerequisites form a cycle through module {0}")]
    PrerequisiteCycle(ModuleId),

    #[error("quiz lesson {0} has no quiz definition")]
    QuizLessonWithoutQuiz(LessonId),

    #[error("invalid quiz in lesson {lesson}: {source}")]
    InvalidQuiz {
        lesson: LessonId,
        #[source]
        source: QuizError,
    },
}

//
// ─── LESSONS ───────────────────────────────────────────────────────────────────
//

/// Kind of material a lesson delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Text,
    Quiz,
    Exercise,
    Document,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Text => "text",
            ContentType::Quiz => "quiz",
            ContentType::Exercise => "exercise",
            ContentType::Document => "document",
        }
    }
}

/// Opaque pointer to supplementary material owned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub order_index: u32,
    #[serde(default)]
    pub title: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default = "default_required")]
    pub is_required: bool,
    #[serde(default)]
    pub quizzes: Vec<QuizDefinition>,
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
}

fn default_required() -> bool {
    true
}

impl Lesson {
    /// Builds a required lesson with no quizzes or resources.
    #[must_use]
    pub fn new(id: LessonId, order_index: u32, content_type: ContentType) -> Self {
        Self {
            id,
            order_index,
            title: String::new(),
            content_type,
            duration_seconds: 0,
            is_required: true,
            quizzes: Vec::new(),
            resources: Vec::new(),
        }
    }

    #[must_use]
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_quiz(mut self, quiz: QuizDefinition) -> Self {
        self.quizzes.push(quiz);
        self
    }

    #[must_use]
    pub fn quiz(&self, id: QuizId) -> Option<&QuizDefinition> {
        self.quizzes.iter().find(|q| q.id == id)
    }
}

//
// ─── MODULES ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub order_index: u32,
    #[serde(default)]
    pub title: String,
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub prerequisite_module_ids: BTreeSet<ModuleId>,
    #[serde(default)]
    pub has_certificate_checkpoint: bool,
}

impl Module {
    #[must_use]
    pub fn new(id: ModuleId, order_index: u32, lessons: Vec<Lesson>) -> Self {
        Self {
            id,
            order_index,
            title: String::new(),
            lessons,
            prerequisite_module_ids: BTreeSet::new(),
            has_certificate_checkpoint: false,
        }
    }

    #[must_use]
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn requires(mut self, prerequisite: ModuleId) -> Self {
        self.prerequisite_module_ids.insert(prerequisite);
        self
    }

    #[must_use]
    pub fn certificate_checkpoint(mut self) -> Self {
        self.has_certificate_checkpoint = true;
        self
    }

    pub fn required_lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.lessons.iter().filter(|l| l.is_required)
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Unvalidated course shape as it arrives from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub id: CourseId,
    pub title: String,
    pub modules: Vec<Module>,
}

/// Validated, ordered content tree.
///
/// Modules are sorted by `order_index`, and lessons inside each module likewise.
/// The tree is read-only once built; progress never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CourseDraft", into = "CourseDraft")]
pub struct Course {
    id: CourseId,
    title: String,
    modules: Vec<Module>,
    lesson_index: HashMap<LessonId, (usize, usize)>,
}

impl Course {
    /// Validates and orders a content tree.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` for empty titles, duplicate ids, dangling or cyclic
    /// prerequisites, and malformed quizzes.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        mut modules: Vec<Module>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        modules.sort_by_key(|m| (m.order_index, m.id));
        for module in &mut modules {
            module.lessons.sort_by_key(|l| (l.order_index, l.id));
        }

        let mut module_ids = HashSet::with_capacity(modules.len());
        for module in &modules {
            if !module_ids.insert(module.id) {
                return Err(CourseError::DuplicateModule(module.id));
            }
        }

        let mut lesson_index = HashMap::new();
        for (mi, module) in modules.iter().enumerate() {
            for prerequisite in &module.prerequisite_module_ids {
                if *prerequisite == module.id {
                    return Err(CourseError::SelfPrerequisite(module.id));
                }
                if !module_ids.contains(prerequisite) {
                    return Err(CourseError::UnknownPrerequisite {
                        module: module.id,
                        prerequisite: *prerequisite,
                    });
                }
            }

            for (li, lesson) in module.lessons.iter().enumerate() {
                if lesson_index.insert(lesson.id, (mi, li)).is_some() {
                    return Err(CourseError::DuplicateLesson(lesson.id));
                }
                validate_lesson(lesson)?;
            }
        }

        check_acyclic(&modules)?;

        Ok(Self {
            id,
            title,
            modules,
            lesson_index,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.lesson_with_module(id).map(|(_, lesson)| lesson)
    }

    /// Looks up a lesson together with the module that owns it.
    #[must_use]
    pub fn lesson_with_module(&self, id: LessonId) -> Option<(&Module, &Lesson)> {
        let (mi, li) = *self.lesson_index.get(&id)?;
        let module = self.modules.get(mi)?;
        Some((module, module.lessons.get(li)?))
    }

    #[must_use]
    pub fn contains_lesson(&self, id: LessonId) -> bool {
        self.lesson_index.contains_key(&id)
    }

    /// All lessons in (module order, lesson order), paired with their module.
    pub fn linear_lessons(&self) -> impl DoubleEndedIterator<Item = (&Module, &Lesson)> {
        self.modules
            .iter()
            .flat_map(|m| m.lessons.iter().map(move |l| (m, l)))
    }

    /// Position of a lesson in the linear order.
    #[must_use]
    pub fn linear_position(&self, id: LessonId) -> Option<usize> {
        self.linear_lessons().position(|(_, l)| l.id == id)
    }

    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.lesson_index.len()
    }
}

impl TryFrom<CourseDraft> for Course {
    type Error = CourseError;

    fn try_from(draft: CourseDraft) -> Result<Self, Self::Error> {
        Course::new(draft.id, draft.title, draft.modules)
    }
}

impl From<Course> for CourseDraft {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            title: course.title,
            modules: course.modules,
        }
    }
}

fn validate_lesson(lesson: &Lesson) -> Result<(), CourseError> {
    match lesson.content_type {
        ContentType::Quiz if lesson.quizzes.is_empty() => {
            return Err(CourseError::QuizLessonWithoutQuiz(lesson.id));
        }
        ContentType::Quiz
        | ContentType::Video
        | ContentType::Text
        | ContentType::Exercise
        | ContentType::Document => {}
    }

    for quiz in &lesson.quizzes {
        quiz.validate().map_err(|source| CourseError::InvalidQuiz {
            lesson: lesson.id,
            source,
        })?;
    }
    Ok(())
}

/// Depth-first search over prerequisite edges; any back edge is a cycle.
fn check_acyclic(modules: &[Module]) -> Result<(), CourseError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        id: ModuleId,
        by_id: &HashMap<ModuleId, &Module>,
        marks: &mut HashMap<ModuleId, Mark>,
    ) -> Result<(), CourseError> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(CourseError::PrerequisiteCycle(id)),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(module) = by_id.get(&id) {
            for prerequisite in &module.prerequisite_module_ids {
                visit(*prerequisite, by_id, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let by_id: HashMap<ModuleId, &Module> = modules.iter().map(|m| (m.id, m)).collect();
    let mut marks = HashMap::with_capacity(modules.len());
    for module in modules {
        visit(module.id, &by_id, &mut marks)?;
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionId, QuizQuestion};

    fn lesson(id: u64, order: u32) -> Lesson {
        Lesson::new(LessonId::new(id), order, ContentType::Text)
    }

    fn quiz() -> QuizDefinition {
        QuizDefinition {
            id: QuizId::new(1),
            passing_score: 60,
            allowed_attempts: None,
            questions: vec![QuizQuestion {
                id: QuestionId::new(1),
                correct_choice: 2,
            }],
        }
    }

    #[test]
    fn orders_modules_and_lessons() {
        let course = Course::new(
            CourseId::new(1),
            "Rust",
            vec![
                Module::new(ModuleId::new(2), 1, vec![lesson(4, 1), lesson(3, 0)]),
                Module::new(ModuleId::new(1), 0, vec![lesson(2, 5), lesson(1, 2)]),
            ],
        )
        .unwrap();

        let order: Vec<u64> = course.linear_lessons().map(|(_, l)| l.id.value()).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(course.linear_position(LessonId::new(3)), Some(2));
        let (module, _) = course.lesson_with_module(LessonId::new(4)).unwrap();
        assert_eq!(module.id, ModuleId::new(2));
    }

    #[test]
    fn rejects_duplicate_lessons_across_modules() {
        let err = Course::new(
            CourseId::new(1),
            "Rust",
            vec![
                Module::new(ModuleId::new(1), 0, vec![lesson(1, 0)]),
                Module::new(ModuleId::new(2), 1, vec![lesson(1, 0)]),
            ],
        )
        .unwrap_err();
        assert_eq!(err, CourseError::DuplicateLesson(LessonId::new(1)));
    }

    #[test]
    fn rejects_bad_prerequisites() {
        let unknown = Course::new(
            CourseId::new(1),
            "Rust",
            vec![Module::new(ModuleId::new(1), 0, vec![]).requires(ModuleId::new(9))],
        )
        .unwrap_err();
        assert!(matches!(unknown, CourseError::UnknownPrerequisite { .. }));

        let own = Course::new(
            CourseId::new(1),
            "Rust",
            vec![Module::new(ModuleId::new(1), 0, vec![]).requires(ModuleId::new(1))],
        )
        .unwrap_err();
        assert_eq!(own, CourseError::SelfPrerequisite(ModuleId::new(1)));

        let cycle = Course::new(
            CourseId::new(1),
            "Rust",
            vec![
                Module::new(ModuleId::new(1), 0, vec![]).requires(ModuleId::new(2)),
                Module::new(ModuleId::new(2), 1, vec![]).requires(ModuleId::new(1)),
            ],
        )
        .unwrap_err();
        assert!(matches!(cycle, CourseError::PrerequisiteCycle(_)));
    }

    #[test]
    fn quiz_lessons_need_a_quiz() {
        let bare = Lesson::new(LessonId::new(1), 0, ContentType::Quiz);
        let err = Course::new(
            CourseId::new(1),
            "Rust",
            vec![Module::new(ModuleId::new(1), 0, vec![bare.clone()])],
        )
        .unwrap_err();
        assert_eq!(err, CourseError::QuizLessonWithoutQuiz(LessonId::new(1)));

        let course = Course::new(
            CourseId::new(1),
            "Rust",
            vec![Module::new(ModuleId::new(1), 0, vec![bare.with_quiz(quiz())])],
        )
        .unwrap();
        let lesson = course.lesson(LessonId::new(1)).unwrap();
        assert!(lesson.quiz(QuizId::new(1)).is_some());
    }

    #[test]
    fn rejects_empty_title() {
        let err = Course::new(CourseId::new(1), "  ", vec![]).unwrap_err();
        assert_eq!(err, CourseError::EmptyTitle);
    }
}
