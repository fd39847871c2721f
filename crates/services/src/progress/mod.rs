mod lessons;
mod navigation;
mod outcome;
mod quiz;
mod service;

pub use outcome::{CertificateStatus, LessonCompletion, QuizSubmission};
pub use service::ProgressService;
