//! In-memory store backend.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use super::{AppealStore, AuditRecorder, InstanceStore, StoreData};
use crate::error::StoreError;
use crate::workflow::{Appeal, AuditStepRecord, Context, InstanceStatus, WorkflowInstance};

/// Thread-safe in-process store for instances, audit records and appeals.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_data(data: StoreData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, StoreData>, StoreError> {
        self.data.read().map_err(|_| StoreError::Poisoned)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, StoreData>, StoreError> {
        self.data.write().map_err(|_| StoreError::Poisoned)
    }
}

impl InstanceStore for MemoryStore {
    fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.write()?.create_instance(instance)?;
        debug!(
            "Created instance {} (template '{}')",
            instance.instance_id, instance.template_id
        );
        Ok(())
    }

    fn finish(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        outputs: Option<Context>,
    ) -> Result<(), StoreError> {
        self.write()?.finish_instance(instance_id, status, outputs)?;
        debug!("Instance {} finished: {}", instance_id, status);
        Ok(())
    }

    fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError> {
        self.read()?.instance(instance_id)
    }
}

impl AuditRecorder for MemoryStore {
    fn append(&self, record: AuditStepRecord) -> Result<u64, StoreError> {
        let sequence = self.write()?.append(record);
        Ok(sequence)
    }

    fn trail(&self, instance_id: &str) -> Result<Vec<AuditStepRecord>, StoreError> {
        Ok(self.read()?.trail(instance_id))
    }
}

impl AppealStore for MemoryStore {
    fn record(&self, appeal: Appeal) -> Result<(), StoreError> {
        debug!(
            "Recording appeal of {} -> {} ({})",
            appeal.appeal_of, appeal.new_instance_id, appeal.outcome
        );
        self.write()?.record_appeal(appeal);
        Ok(())
    }

    fn appeal(&self, new_instance_id: &str) -> Result<Option<Appeal>, StoreError> {
        Ok(self.read()?.appeal(new_instance_id))
    }

    fn appeals_for(&self, appeal_of: &str) -> Result<Vec<Appeal>, StoreError> {
        Ok(self.read()?.appeals_for(appeal_of))
    }
}
