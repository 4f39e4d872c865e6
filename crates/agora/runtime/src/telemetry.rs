//! Logging setup and kernel counters

use crate::config::LoggingConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns false if a subscriber
/// was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    }
}

const ROLES_OBTAINED: &str = "roles_obtained";
const ROLES_REFUSED: &str = "roles_refused";
const ROLES_RELEASED: &str = "roles_released";
const MESSAGES_DELIVERED: &str = "messages_delivered";
const MESSAGES_FORWARDED: &str = "messages_forwarded";
const GROUPS_CREATED: &str = "groups_created";
const GROUPS_REMOVED: &str = "groups_removed";

/// Kernel counters
///
/// Shared by every group of a kernel context.
#[derive(Default)]
pub struct KernelTelemetry {
    counters: RwLock<HashMap<&'static str, u64>>,
}

impl KernelTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role_obtained(&self) {
        self.increment(ROLES_OBTAINED);
    }

    pub fn role_refused(&self) {
        self.increment(ROLES_REFUSED);
    }

    pub fn role_released(&self) {
        self.increment(ROLES_RELEASED);
    }

    pub fn message_delivered(&self) {
        self.increment(MESSAGES_DELIVERED);
    }

    pub fn message_forwarded(&self) {
        self.increment(MESSAGES_FORWARDED);
    }

    pub fn group_created(&self) {
        self.increment(GROUPS_CREATED);
    }

    pub fn group_removed(&self) {
        self.increment(GROUPS_REMOVED);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let counters = self.counters.read();
        let get = |name: &str| counters.get(name).copied().unwrap_or(0);
        TelemetrySnapshot {
            roles_obtained: get(ROLES_OBTAINED),
            roles_refused: get(ROLES_REFUSED),
            roles_released: get(ROLES_RELEASED),
            messages_delivered: get(MESSAGES_DELIVERED),
            messages_forwarded: get(MESSAGES_FORWARDED),
            groups_created: get(GROUPS_CREATED),
            groups_removed: get(GROUPS_REMOVED),
        }
    }

    fn increment(&self, metric: &'static str) {
        *self.counters.write().entry(metric).or_insert(0) += 1;
    }
}

/// Point-in-time copy of the kernel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub roles_obtained: u64,
    pub roles_refused: u64,
    pub roles_released: u64,
    pub messages_delivered: u64,
    pub messages_forwarded: u64,
    pub groups_created: u64,
    pub groups_removed: u64,
}
