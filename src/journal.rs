//! Append-only delivery log kept in an embedded sled database.
//!
//! This is an audit trail of what was handed over and when; a session never reads it back to
//! restore state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::device::CubeRole;
use crate::geometry::Pose;

const DELIVERIES_TREE: &str = "deliveries";

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("journal encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The user tapped the cube.
    Acknowledged,
    /// The session was stopped while waiting for the tap.
    Abandoned,
}

/// One cube put down in front of the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Unix seconds.
    pub timestamp: u64,
    pub cube: CubeRole,
    pub event_summary: String,
    pub target: Pose,
    pub status: DeliveryStatus,
}

pub struct DeliveryJournal {
    db: sled::Db,
}

impl std::fmt::Debug for DeliveryJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryJournal")
            .field("entries", &self.db.open_tree(DELIVERIES_TREE).map(|t| t.len()).ok())
            .finish()
    }
}

impl Drop for DeliveryJournal {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "failed to flush delivery journal");
        }
    }
}

impl DeliveryJournal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Wraps an already-open database (e.g. a temporary one).
    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    pub fn record(&self, record: &DeliveryRecord) -> Result<(), JournalError> {
        let tree = self.db.open_tree(DELIVERIES_TREE)?;
        let id = self.db.generate_id()?;

        // Zero-padded so keys sort by time.
        let key = format!("{:020}_{id}", record.timestamp);
        let value = serde_json::to_vec(record)?;

        tree.insert(key.as_bytes(), value)?;
        tree.flush()?;
        Ok(())
    }

    /// Deliveries at or after the given unix timestamp, oldest first.
    pub fn since(&self, start_ts: u64) -> Vec<DeliveryRecord> {
        let Ok(tree) = self.db.open_tree(DELIVERIES_TREE) else {
            return Vec::new();
        };

        tree.range(format!("{start_ts:020}").as_bytes()..)
            .filter_map(|res| res.ok())
            .filter_map(|(_, v)| serde_json::from_slice::<DeliveryRecord>(&v).ok())
            .collect()
    }
}
