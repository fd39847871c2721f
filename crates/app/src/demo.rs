use course_core::model::{
    ContentType, Course, CourseError, CourseId, Lesson, LessonId, Module, ModuleId, QuestionId,
    QuizDefinition, QuizId, QuizQuestion, ResourceRef,
};

pub const DEMO_COURSE_ID: CourseId = CourseId::new(1);

/// Small two-module course used by `app seed`.
pub fn demo_course() -> Result<Course, CourseError> {
    let checkpoint_quiz = QuizDefinition {
        id: QuizId::new(1),
        passing_score: 70,
        allowed_attempts: Some(3),
        questions: vec![
            QuizQuestion {
                id: QuestionId::new(1),
                correct_choice: 1,
            },
            QuizQuestion {
                id: QuestionId::new(2),
                correct_choice: 0,
            },
            QuizQuestion {
                id: QuestionId::new(3),
                correct_choice: 2,
            },
        ],
    };

    let mut cheat_sheet = Lesson::new(LessonId::new(4), 2, ContentType::Document)
        .titled("Ownership cheat sheet")
        .optional();
    cheat_sheet.resources.push(ResourceRef {
        id: "ownership-cheatsheet.pdf".into(),
        title: Some("Cheat sheet".into()),
    });

    Course::new(
        DEMO_COURSE_ID,
        "Rust Foundations",
        vec![
            Module::new(
                ModuleId::new(1),
                0,
                vec![
                    Lesson::new(LessonId::new(1), 0, ContentType::Video)
                        .titled("Why Rust")
                        .with_duration(540),
                    Lesson::new(LessonId::new(2), 1, ContentType::Text)
                        .titled("Installing the toolchain"),
                    Lesson::new(LessonId::new(3), 2, ContentType::Quiz)
                        .titled("Checkpoint quiz")
                        .with_quiz(checkpoint_quiz),
                ],
            )
            .titled("Getting started"),
            Module::new(
                ModuleId::new(2),
                1,
                vec![
                    Lesson::new(LessonId::new(5), 0, ContentType::Video)
                        .titled("Moves and borrows")
                        .with_duration(900),
                    Lesson::new(LessonId::new(6), 1, ContentType::Exercise)
                        .titled("Fix the borrow checker"),
                    cheat_sheet,
                ],
            )
            .titled("Ownership")
            .requires(ModuleId::new(1))
            .certificate_checkpoint(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_course_is_valid_and_ordered() {
        let course = demo_course().unwrap();
        let order: Vec<u64> = course
            .linear_lessons()
            .map(|(_, lesson)| lesson.id.value())
            .collect();
        assert_eq!(order, vec![1, 2, 3, 5, 6, 4]);
    }
}
