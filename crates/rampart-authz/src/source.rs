//! Policy source contract and the in-memory implementation.
//!
//! The engine never persists policies itself; an external store hands it a
//! [`ModelSnapshot`] on load and again on every reload. Change notification
//! is the embedder's concern: when the store changes, call
//! [`crate::Enforcer::reload`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::AuthzResult;

/// One `subject -> role` edge in a grouping relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingEdge {
    /// Relation the edge belongs to; almost always the primary `g`.
    #[serde(default = "default_relation")]
    pub relation: String,
    pub subject: String,
    pub role: String,
}

fn default_relation() -> String {
    "g".to_string()
}

/// Raw policy rows and grouping edges as loaded from the external store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    #[serde(default)]
    pub policies: Vec<Vec<String>>,
    #[serde(default)]
    pub groupings: Vec<GroupingEdge>,
}

impl ModelSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, values: &[&str]) -> Self {
        self.policies
            .push(values.iter().map(|value| value.to_string()).collect());
        self
    }

    /// Add a grouping edge in the primary `g` relation.
    pub fn grouping(self, subject: &str, role: &str) -> Self {
        self.grouping_in("g", subject, role)
    }

    pub fn grouping_in(mut self, relation: &str, subject: &str, role: &str) -> Self {
        self.groupings.push(GroupingEdge {
            relation: relation.to_string(),
            subject: subject.to_string(),
            role: role.to_string(),
        });
        self
    }
}

/// External policy store seen from the engine: a single load operation.
pub trait PolicySource: Send + Sync {
    fn load(&self) -> AuthzResult<ModelSnapshot>;
}

/// In-memory policy source for tests and embedders that manage policy rows
/// themselves. `replace` stages a new snapshot; it becomes visible to the
/// enforcer on its next reload.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    snapshot: Arc<Mutex<ModelSnapshot>>,
}

impl MemorySource {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    pub fn replace(&self, snapshot: ModelSnapshot) {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
    }
}

impl PolicySource for MemorySource {
    fn load(&self) -> AuthzResult<ModelSnapshot> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}
