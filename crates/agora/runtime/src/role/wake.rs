use crate::services::Mailbox;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// When a sleeping role resumes
#[derive(Clone)]
pub enum WakeCondition {
    At(Instant),
    /// As soon as the mailbox holds a message
    MessageArrival,
    When(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl WakeCondition {
    pub fn after(delay: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600));
        WakeCondition::At(deadline)
    }

    pub fn when(predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        WakeCondition::When(Arc::new(predicate))
    }

    pub fn is_satisfied(&self, mailbox: &dyn Mailbox) -> bool {
        match self {
            WakeCondition::At(deadline) => Instant::now() >= *deadline,
            WakeCondition::MessageArrival => {
                mailbox.synchronize();
                !mailbox.is_empty()
            }
            WakeCondition::When(predicate) => predicate(),
        }
    }
}

impl fmt::Debug for WakeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeCondition::At(deadline) => f.debug_tuple("At").field(deadline).finish(),
            WakeCondition::MessageArrival => f.write_str("MessageArrival"),
            WakeCondition::When(_) => f.write_str("When(..)"),
        }
    }
}
