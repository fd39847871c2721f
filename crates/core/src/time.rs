use chrono::{DateTime, Duration, Utc};

/// Where services read the current time from.
///
/// Enrollment, completion and certificate timestamps all come from the
/// injected clock; tests pin it with `Clock::Fixed`.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }
}

/// Seconds since the epoch of the pinned test instant, 2024-03-01T09:00:00Z.
pub const FIXED_TEST_TIMESTAMP: i64 = 1_709_283_600;

/// The pinned test instant.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(FIXED_TEST_TIMESTAMP)
}
