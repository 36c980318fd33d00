use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::database_manager::{DatabaseManager, DatabaseOperation};
use crate::storage::{StorageError, StorageResult, StudyDescriptor, StudyStore};

/// Study UID -> JSON encoded [`StudyRecord`]
const STUDIES: TableDefinition<'static, &'static str, &'static str> = TableDefinition::new("studies");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub path: PathBuf,
    pub pending: bool,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

/// Study store persisted in a redb database
#[derive(Clone)]
pub struct RedbStudyStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStudyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStudyStore")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbStudyStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let manager = DatabaseManager::global();
        let db = manager.get_or_create_database(path)?;
        manager.initialize_tables(&db, &[STUDIES])?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch the full record of one study
    pub fn get(&self, study_uid: &str) -> StorageResult<Option<StudyRecord>> {
        DatabaseOperation::read(&self.db, |txn| {
            let table = txn.open_table(STUDIES).map_err(db_err)?;
            let raw = table
                .get(study_uid)
                .map_err(db_err)?
                .map(|guard| guard.value().to_string());
            raw.map(|json| decode(study_uid, &json)).transpose()
        })
    }

    /// Set or clear the pending flag; returns false if the study is unknown
    pub fn set_pending(&self, study_uid: &str, pending: bool) -> StorageResult<bool> {
        DatabaseOperation::write(&self.db, |txn| {
            let mut table = txn.open_table(STUDIES).map_err(db_err)?;
            let existing = table
                .get(study_uid)
                .map_err(db_err)?
                .map(|guard| guard.value().to_string());

            let Some(json) = existing else {
                return Ok(false);
            };

            let mut record = decode(study_uid, &json)?;
            record.pending = pending;
            record.sent_at = if pending { None } else { Some(Utc::now()) };
            let encoded = encode(study_uid, &record)?;
            table
                .insert(study_uid, encoded.as_str())
                .map_err(db_err)?;
            Ok(true)
        })
    }
}

#[async_trait]
impl StudyStore for RedbStudyStore {
    async fn enumerate(&self) -> StorageResult<Vec<StudyDescriptor>> {
        DatabaseOperation::read(&self.db, |txn| {
            let table = txn.open_table(STUDIES).map_err(db_err)?;
            let mut studies = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                let study_uid = key.value().to_string();
                let record = match decode(&study_uid, value.value()) {
                    Ok(record) => record,
                    Err(e) => {
                        // one unreadable record must not hide the rest
                        tracing::error!(study_uid = %study_uid, "Skipping study: {}", e);
                        continue;
                    }
                };
                studies.push(StudyDescriptor {
                    study_uid,
                    path: record.path,
                    pending: record.pending,
                });
            }
            Ok(studies)
        })
    }

    async fn mark_sent(&self, study_uid: &str) -> StorageResult<()> {
        if !self.set_pending(study_uid, false)? {
            tracing::warn!(study_uid = %study_uid, "mark_sent for unknown study");
        }
        Ok(())
    }

    async fn register(&self, study_uid: &str, path: PathBuf) -> StorageResult<()> {
        let record = StudyRecord {
            path,
            pending: true,
            registered_at: Utc::now(),
            sent_at: None,
        };
        let encoded = encode(study_uid, &record)?;
        DatabaseOperation::write(&self.db, |txn| {
            let mut table = txn.open_table(STUDIES).map_err(db_err)?;
            table
                .insert(study_uid, encoded.as_str())
                .map_err(db_err)?;
            Ok(())
        })
    }
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

fn decode(study_uid: &str, json: &str) -> StorageResult<StudyRecord> {
    serde_json::from_str(json).map_err(|e| StorageError::Record {
        study_uid: study_uid.to_string(),
        reason: e.to_string(),
    })
}

fn encode(study_uid: &str, record: &StudyRecord) -> StorageResult<String> {
    serde_json::to_string(record).map_err(|e| StorageError::Record {
        study_uid: study_uid.to_string(),
        reason: e.to_string(),
    })
}
