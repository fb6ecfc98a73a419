//! JSON file store backend.
//!
//! Keeps the full store in memory and rewrites `<path>` as pretty JSON after
//! every write, so instances, audit trails and appeals survive between CLI
//! invocations. The file is reloaded when the store is opened.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::memory::MemoryStore;
use super::{AppealStore, AuditRecorder, InstanceStore, StoreData};
use crate::error::StoreError;
use crate::workflow::{Appeal, AuditStepRecord, Context, InstanceStatus, WorkflowInstance};

/// Store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Opens the store at `path`, loading existing state if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let data: StoreData = serde_json::from_str(&content)?;
            info!("Loaded store state from {}", path.display());
            data
        } else {
            info!("Starting fresh store at {}", path.display());
            StoreData::default()
        };

        Ok(Self {
            path,
            inner: MemoryStore::from_data(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the state, saves the copy, then swaps it
    /// in. A failed change or a failed save leaves the state untouched.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self.inner.write()?;
        let mut next = data.clone();
        let value = change(&mut next)?;
        self.write_snapshot(&next)?;
        *data = next;
        Ok(value)
    }

    /// Goes through a temporary file and a rename so a crash mid-write never
    /// leaves a truncated store behind. Callers hold the state write lock.
    fn write_snapshot(&self, data: &StoreData) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(data)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Saved store state to {}", self.path.display());
        Ok(())
    }
}

impl InstanceStore for FileStore {
    fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.commit(|data| data.create_instance(instance))
    }

    fn finish(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        outputs: Option<Context>,
    ) -> Result<(), StoreError> {
        self.commit(|data| data.finish_instance(instance_id, status, outputs))
    }

    fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError> {
        self.inner.instance(instance_id)
    }
}

impl AuditRecorder for FileStore {
    fn append(&self, record: AuditStepRecord) -> Result<u64, StoreError> {
        self.commit(|data| Ok(data.append(record)))
    }

    fn trail(&self, instance_id: &str) -> Result<Vec<AuditStepRecord>, StoreError> {
        self.inner.trail(instance_id)
    }
}

impl AppealStore for FileStore {
    fn record(&self, appeal: Appeal) -> Result<(), StoreError> {
        self.commit(|data| {
            data.record_appeal(appeal);
            Ok(())
        })
    }

    fn appeal(&self, new_instance_id: &str) -> Result<Option<Appeal>, StoreError> {
        self.inner.appeal(new_instance_id)
    }

    fn appeals_for(&self, appeal_of: &str) -> Result<Vec<Appeal>, StoreError> {
        self.inner.appeals_for(appeal_of)
    }
}
