//! Receiver selection for messages addressed to a role type

use agora_types::RoleAddress;
use rand::Rng;

/// Picks one receiver among candidates sorted by address
pub trait ReceiverSelector: Send + Sync {
    fn select(&self, candidates: &[RoleAddress]) -> Option<usize>;
}

/// Always the first candidate in address order
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl ReceiverSelector for FirstAvailable {
    fn select(&self, candidates: &[RoleAddress]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Uniformly random candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl ReceiverSelector for RandomSelector {
    fn select(&self, candidates: &[RoleAddress]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..candidates.len()))
    }
}
