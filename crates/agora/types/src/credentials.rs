//! Credentials presented by a role player when taking a role

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque credentials checked by a membership service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub principal: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            claims: BTreeMap::new(),
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn claim(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(String::as_str)
    }
}
