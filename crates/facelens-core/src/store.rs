//! In-memory enrollment store: label → reference thumbnail.

use crate::thumbnail::Thumbnail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("enrollment label must not be empty")]
    InvalidLabel,
}

/// One enrolled face. Replaced wholesale on re-enrollment, never edited.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentRecord {
    pub label: String,
    #[serde(skip)]
    pub thumbnail: Thumbnail,
    pub enrolled_at: DateTime<Utc>,
}

/// Insertion-ordered mapping from label to [`EnrollmentRecord`].
///
/// Re-enrolling a label replaces its record but keeps its original position.
/// There is no removal; the store lives as long as its owning session.
#[derive(Debug, Default)]
pub struct EnrollmentStore {
    records: Vec<EnrollmentRecord>,
    index: HashMap<String, usize>,
}

impl EnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `label` (trimmed).
    pub fn enroll(&mut self, label: &str, thumbnail: Thumbnail) -> Result<&EnrollmentRecord, StoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::InvalidLabel);
        }

        let record = EnrollmentRecord {
            label: label.to_string(),
            thumbnail,
            enrolled_at: Utc::now(),
        };

        let pos = match self.index.get(label) {
            Some(&pos) => {
                tracing::debug!(label, "replacing enrolled thumbnail");
                self.records[pos] = record;
                pos
            }
            None => {
                let pos = self.records.len();
                self.index.insert(label.to_string(), pos);
                self.records.push(record);
                pos
            }
        };
        Ok(&self.records[pos])
    }

    /// Records in insertion order.
    pub fn list(&self) -> &[EnrollmentRecord] {
        &self.records
    }

    /// Owned copy of the records for iteration independent of later writes.
    /// Thumbnails share their bytes with the store.
    pub fn snapshot(&self) -> Vec<EnrollmentRecord> {
        self.records.clone()
    }

    pub fn get(&self, label: &str) -> Option<&EnrollmentRecord> {
        self.index.get(label.trim()).map(|&pos| &self.records[pos])
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
