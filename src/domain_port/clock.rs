use chrono::{DateTime, FixedOffset};

/// Current time in the reference timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}
