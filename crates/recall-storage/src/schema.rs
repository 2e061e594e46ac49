//! Store lifecycle and schema versioning.
//!
//! RocksDB only gains column families when the database is (re)opened with
//! them, so every schema change is a full reopen at `version + 1`. The version
//! transition is computed here, independent of the storage engine, and applied
//! by [`DurableStore`](crate::DurableStore).

use std::collections::BTreeSet;
use std::fmt;

use crate::collections::index_cf_name;

/// Schema version written when a store is created.
pub const INITIAL_VERSION: u32 = 1;

/// Lifecycle state of a [`DurableStore`](crate::DurableStore).
///
/// `Uninitialized -> Opening -> Ready` on first use,
/// `Ready -> Upgrading -> Ready` on each schema change.
/// A failed open or upgrade lands in `Failed`; the next call retries from scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Opening,
    Ready { version: u32 },
    Upgrading { from: u32, to: u32 },
    Failed { reason: String },
}

impl StoreState {
    pub fn is_ready(&self) -> bool {
        matches!(self, StoreState::Ready { .. })
    }

    /// Version of the open connection, if any.
    pub fn version(&self) -> Option<u32> {
        match self {
            StoreState::Ready { version } => Some(*version),
            _ => None,
        }
    }
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreState::Uninitialized => write!(f, "uninitialized"),
            StoreState::Opening => write!(f, "opening"),
            StoreState::Ready { version } => write!(f, "ready (v{})", version),
            StoreState::Upgrading { from, to } => write!(f, "upgrading (v{} -> v{})", from, to),
            StoreState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// A requested structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// New collection, optionally with a secondary index over one field
    CreateCollection { name: String, index: Option<String> },
}

/// Outcome of [`plan_upgrade`]: reopen at `to` with these extra column families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    pub from: u32,
    pub to: u32,
    pub new_column_families: Vec<String>,
}

/// Compute the version transition for `change`.
///
/// Returns `None` when the change is already applied (the collection exists),
/// so creation is idempotent per collection name.
pub fn plan_upgrade(
    current: u32,
    existing: &BTreeSet<String>,
    change: &SchemaChange,
) -> Option<UpgradePlan> {
    match change {
        SchemaChange::CreateCollection { name, index } => {
            if existing.contains(name) {
                return None;
            }
            let mut new_column_families = vec![name.clone()];
            if let Some(field) = index {
                new_column_families.push(index_cf_name(name, field));
            }
            Some(UpgradePlan {
                from: current,
                to: current + 1,
                new_column_families,
            })
        }
    }
}
