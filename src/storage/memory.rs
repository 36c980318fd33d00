use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::storage::{StorageError, StorageResult, StudyDescriptor, StudyStore};

/// Non-persistent study store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStudyStore {
    studies: Mutex<BTreeMap<String, StudyDescriptor>>,
}

impl MemoryStudyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, study: StudyDescriptor) {
        let mut map = self.studies.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(study.study_uid.clone(), study);
    }

    pub fn get(&self, study_uid: &str) -> Option<StudyDescriptor> {
        let map = self.studies.lock().unwrap_or_else(|p| p.into_inner());
        map.get(study_uid).cloned()
    }
}

#[async_trait]
impl StudyStore for MemoryStudyStore {
    async fn enumerate(&self) -> StorageResult<Vec<StudyDescriptor>> {
        let map = self
            .studies
            .lock()
            .map_err(|e| StorageError::Database(format!("Failed to lock study map: {}", e)))?;
        Ok(map.values().cloned().collect())
    }

    async fn mark_sent(&self, study_uid: &str) -> StorageResult<()> {
        let mut map = self
            .studies
            .lock()
            .map_err(|e| StorageError::Database(format!("Failed to lock study map: {}", e)))?;
        match map.get_mut(study_uid) {
            Some(study) => study.pending = false,
            None => tracing::warn!(study_uid = %study_uid, "mark_sent for unknown study"),
        }
        Ok(())
    }

    async fn register(&self, study_uid: &str, path: PathBuf) -> StorageResult<()> {
        self.insert(StudyDescriptor {
            study_uid: study_uid.to_string(),
            path,
            pending: true,
        });
        Ok(())
    }
}
