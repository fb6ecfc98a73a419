//! Persistence Interfaces
//!
//! The engine talks to storage through three narrow traits so any backend
//! can sit behind it:
//!
//! - [`InstanceStore`]: create an instance, finish it once, read it back
//! - [`AuditRecorder`]: append-only per-step audit records
//! - [`AppealStore`]: appeal rows linking an original instance to its re-run
//!
//! Writes are independent operations. Nothing here is transactional across
//! steps, so a crash between a step and its audit write leaves partial state.
//!
//! Two backends implement all three traits:
//! - [`MemoryStore`]: in-process, for tests and one-shot runs
//! - [`FileStore`]: the same semantics, saved to a JSON file after each write

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::workflow::{
    Appeal, AuditStepRecord, Context, InstanceStatus, WorkflowInstance,
};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Workflow instance persistence.
pub trait InstanceStore: Send + Sync {
    /// Persists a new instance in `running` status.
    fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    /// Sets the terminal status. Fails if the instance is already terminal.
    fn finish(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        outputs: Option<Context>,
    ) -> Result<(), StoreError>;

    fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError>;
}

/// Append-only audit trail.
pub trait AuditRecorder: Send + Sync {
    /// Appends a record and returns the sequence number it was given.
    fn append(&self, record: AuditStepRecord) -> Result<u64, StoreError>;

    /// Returns the records of one instance in insertion order.
    fn trail(&self, instance_id: &str) -> Result<Vec<AuditStepRecord>, StoreError>;
}

/// Appeal persistence.
pub trait AppealStore: Send + Sync {
    /// Inserts an appeal, or updates the outcome of the appeal already
    /// recorded for the same re-evaluation instance.
    fn record(&self, appeal: Appeal) -> Result<(), StoreError>;

    fn appeal(&self, new_instance_id: &str) -> Result<Option<Appeal>, StoreError>;

    fn appeals_for(&self, appeal_of: &str) -> Result<Vec<Appeal>, StoreError>;
}

/// Handles to the three stores, shared by the engine and the tasks that
/// need persistence.
#[derive(Clone)]
pub struct Stores {
    pub instances: Arc<dyn InstanceStore>,
    pub audit: Arc<dyn AuditRecorder>,
    pub appeals: Arc<dyn AppealStore>,
}

impl Stores {
    /// Uses a single backend for all three concerns.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: InstanceStore + AuditRecorder + AppealStore + 'static,
    {
        Self {
            instances: store.clone(),
            audit: store.clone(),
            appeals: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::shared(Arc::new(MemoryStore::new()))
    }
}

/// Everything a store holds. Shared by both backends so they keep the same
/// semantics; [`FileStore`] serializes it as is.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub(crate) struct StoreData {
    instances: HashMap<String, WorkflowInstance>,
    audit: Vec<AuditStepRecord>,
    appeals: Vec<Appeal>,
    next_sequence: u64,
}

impl StoreData {
    fn create_instance(&mut self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        if self.instances.contains_key(&instance.instance_id) {
            return Err(StoreError::DuplicateInstance(instance.instance_id.clone()));
        }
        self.instances
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    fn finish_instance(
        &mut self,
        instance_id: &str,
        status: InstanceStatus,
        outputs: Option<Context>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTerminalStatus(status.to_string()));
        }

        let instance = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;

        if instance.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal(instance_id.to_string()));
        }

        instance.finish(status, outputs);
        Ok(())
    }

    fn instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError> {
        self.instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    fn append(&mut self, mut record: AuditStepRecord) -> u64 {
        self.next_sequence += 1;
        record.sequence = self.next_sequence;
        self.audit.push(record);
        self.next_sequence
    }

    fn trail(&self, instance_id: &str) -> Vec<AuditStepRecord> {
        self.audit
            .iter()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect()
    }

    fn record_appeal(&mut self, appeal: Appeal) {
        match self
            .appeals
            .iter_mut()
            .find(|a| a.new_instance_id == appeal.new_instance_id)
        {
            Some(existing) => existing.outcome = appeal.outcome,
            None => self.appeals.push(appeal),
        }
    }

    fn appeal(&self, new_instance_id: &str) -> Option<Appeal> {
        self.appeals
            .iter()
            .find(|a| a.new_instance_id == new_instance_id)
            .cloned()
    }

    fn appeals_for(&self, appeal_of: &str) -> Vec<Appeal> {
        self.appeals
            .iter()
            .filter(|a| a.appeal_of == appeal_of)
            .cloned()
            .collect()
    }
}
