//! Cooperative scheduling of a player's roles

use crate::role::{CycleOutcome, RoleInstance};
use parking_lot::Mutex;
use std::ops::AddAssign;
use std::sync::Arc;

/// Counts of what one scheduling pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub ran: usize,
    pub sleeping: usize,
    pub cancelled: usize,
    pub ended: usize,
}

impl ActivationReport {
    pub fn total(&self) -> usize {
        self.ran + self.sleeping + self.cancelled + self.ended
    }
}

impl AddAssign for ActivationReport {
    fn add_assign(&mut self, other: Self) {
        self.ran += other.ran;
        self.sleeping += other.sleeping;
        self.cancelled += other.cancelled;
        self.ended += other.ended;
    }
}

/// Runs the roles of one player, one cycle each per pass
#[derive(Default)]
pub struct RoleActivator {
    roles: Mutex<Vec<Arc<RoleInstance>>>,
}

impl RoleActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, role: Arc<RoleInstance>) {
        self.roles.lock().push(role);
    }

    pub fn len(&self) -> usize {
        self.roles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.lock().is_empty()
    }

    /// One pass over the scheduled roles, yielding after each one. Roles
    /// whose `end` has run are dropped from the schedule.
    pub async fn run_once(&self) -> ActivationReport {
        let roles: Vec<Arc<RoleInstance>> = self.roles.lock().clone();
        let mut report = ActivationReport::default();

        for role in roles {
            match role.cycle().await {
                CycleOutcome::Ran => report.ran += 1,
                CycleOutcome::Sleeping => report.sleeping += 1,
                CycleOutcome::Cancelled => report.cancelled += 1,
                CycleOutcome::Ended => {
                    report.ended += 1;
                    self.roles.lock().retain(|r| !Arc::ptr_eq(r, &role));
                }
            }
            tokio::task::yield_now().await;
        }
        report
    }
}
