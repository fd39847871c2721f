use course_core::model::{
    ContentType, Course, CourseId, LearnerId, Lesson, LessonId, Module, ModuleId, QuestionId,
    QuizAnswer, QuizDefinition, QuizId, QuizQuestion, QuizState,
};
use course_core::time::fixed_now;
use services::{AppServices, CertificateStatus, Clock, LessonCompletion};

fn course() -> Course {
    let quiz = QuizDefinition {
        id: QuizId::new(5),
        passing_score: 100,
        allowed_attempts: Some(3),
        questions: vec![QuizQuestion {
            id: QuestionId::new(1),
            correct_choice: 2,
        }],
    };
    Course::new(
        CourseId::new(3),
        "Ownership",
        vec![
            Module::new(
                ModuleId::new(1),
                0,
                vec![
                    Lesson::new(LessonId::new(1), 0, ContentType::Video).with_duration(600),
                    Lesson::new(LessonId::new(2), 1, ContentType::Quiz).with_quiz(quiz),
                ],
            ),
            Module::new(
                ModuleId::new(2),
                1,
                vec![Lesson::new(LessonId::new(3), 0, ContentType::Text)],
            )
            .requires(ModuleId::new(1))
            .certificate_checkpoint(),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_backed_course_runs_to_certificate() {
    let services = AppServices::new_sqlite(
        "sqlite:file:memdb_services_flow?mode=memory&cache=shared",
        Clock::fixed(fixed_now()),
    )
    .await
    .expect("sqlite services");
    let progress = services.progress();

    progress.publish_course(&course()).await.unwrap();
    let enrollment = progress
        .enroll(LearnerId::new(1), CourseId::new(3))
        .await
        .unwrap();
    let id = enrollment.id;

    progress
        .update_video_progress(id, LessonId::new(1), 0.5)
        .await
        .unwrap();
    progress
        .complete_lesson(id, LessonId::new(1), 600)
        .await
        .unwrap();

    let denied = progress
        .complete_lesson(id, LessonId::new(2), 0)
        .await
        .unwrap();
    assert!(matches!(denied, LessonCompletion::Denied { .. }));

    let wrong = progress
        .submit_quiz_attempt(
            id,
            LessonId::new(2),
            QuizId::new(5),
            &[QuizAnswer::new(QuestionId::new(1), 0)],
        )
        .await
        .unwrap();
    assert_eq!(wrong.state, QuizState::FailedRetryable);
    assert_eq!(wrong.attempts_remaining, Some(2));

    let right = progress
        .submit_quiz_attempt(
            id,
            LessonId::new(2),
            QuizId::new(5),
            &[QuizAnswer::new(QuestionId::new(1), 2)],
        )
        .await
        .unwrap();
    assert!(right.passed);
    assert_eq!(right.attempt_number, 2);

    let after_quiz = progress
        .complete_lesson(id, LessonId::new(2), 0)
        .await
        .unwrap();
    assert_eq!(after_quiz.snapshot().overall_progress_percent(), 67);
    assert!(!after_quiz.snapshot().progress.certificate_checkpoints_complete);

    let done = progress
        .complete_lesson(id, LessonId::new(3), 0)
        .await
        .unwrap();
    assert!(done.snapshot().certificate_issued);
    assert!(done.snapshot().progress.certificate_checkpoints_complete);

    let enrollment = progress
        .find_enrollment(LearnerId::new(1), CourseId::new(3))
        .await
        .unwrap()
        .expect("enrollment");
    assert_eq!(enrollment.overall_progress_percent, 100);
    assert_eq!(enrollment.completed_at, Some(fixed_now()));
    assert_eq!(enrollment.last_lesson_id, Some(LessonId::new(3)));

    assert!(matches!(
        progress.certificate(id).await.unwrap(),
        CertificateStatus::Issued(_)
    ));
}

#[tokio::test]
async fn course_document_is_validated_on_import() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()));
    let progress = services.progress();

    let document = serde_json::to_string(&course()).unwrap();
    let imported = progress.publish_course_json(&document).await.unwrap();
    assert_eq!(imported, course());

    let cyclic = r#"{
        "id": 9,
        "title": "Loop",
        "modules": [
            {"id": 1, "order_index": 0, "title": "", "lessons": [], "prerequisite_module_ids": [2]},
            {"id": 2, "order_index": 1, "title": "", "lessons": [], "prerequisite_module_ids": [1]}
        ]
    }"#;
    assert!(matches!(
        progress.publish_course_json(cyclic).await.unwrap_err(),
        services::ProgressError::CourseDocument(_)
    ));
}
