mod course;
mod enrollment;
mod ids;
mod progress;
mod quiz;

pub use ids::{
    CertificateId, CourseId, EnrollmentId, LearnerId, LessonId, ModuleId, ParseIdError,
    QuestionId, QuizId,
};

pub use course::{ContentType, Course, CourseDraft, CourseError, Lesson, Module, ResourceRef};
pub use enrollment::{Certificate, Enrollment};
pub use progress::{LessonProgress, ProgressSnapshot};
pub use quiz::{QuizAnswer, QuizAttempt, QuizDefinition, QuizError, QuizQuestion, QuizState};
