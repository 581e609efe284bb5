//! Task Registry - the single owner of task records
//!
//! One `RwLock` over the whole map. Locks are never held across `.await`;
//! readers get cloned snapshots.

use crate::error::{Result, TaskError};
use crate::state::TaskStatus;
use crate::task::{TaskId, TaskRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Concurrency-safe mapping from task id to record
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record
    pub fn create(&self, id: TaskId, record: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            return Err(TaskError::AlreadyExists(id));
        }
        debug!(task_id = %id, filename = %record.filename, "Task created");
        tasks.insert(id, record);
        Ok(())
    }

    /// Snapshot of a record
    pub fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.tasks
            .read()
            .get(id)
            .map(|r| r.status)
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Move a task to `status`, enforcing the state machine.
    /// Returns the previous status.
    pub fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<TaskStatus> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        apply_transition(id, record, status)
    }

    /// Atomically claim a task for execution (`Pending|Failed -> Running`)
    pub fn begin_execution(&self, id: &TaskId) -> Result<TaskRecord> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        if !record.status.can_start() {
            return Err(TaskError::AlreadyRunning(id.clone()));
        }
        apply_transition(id, record, TaskStatus::Running)?;
        Ok(record.clone())
    }

    /// Record the outcome of an execution in one write
    pub fn finish_execution(
        &self,
        id: &TaskId,
        status: TaskStatus,
        exit_code: Option<u32>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        apply_transition(id, record, status)?;
        record.exit_code = exit_code;
        record.expires_at = expires_at;
        Ok(())
    }

    pub fn extend_expiry(&self, id: &TaskId, expires_at: DateTime<Utc>) -> Result<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        record.expires_at = expires_at;
        Ok(())
    }

    pub fn delete(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.write().remove(id)
    }

    /// Remove the record only if it is still expired at `now` and not running
    pub fn delete_if_expired(&self, id: &TaskId, now: DateTime<Utc>) -> Option<TaskRecord> {
        let mut tasks = self.tasks.write();
        match tasks.get(id) {
            Some(record) if is_reclaimable(record, now) => tasks.remove(id),
            _ => None,
        }
    }

    /// Visit every record under the read lock; order is unspecified
    pub fn for_each(&self, mut visit: impl FnMut(&TaskId, &TaskRecord)) {
        for (id, record) in self.tasks.read().iter() {
            visit(id, record);
        }
    }

    /// Ids of records whose expiry is before `now`, skipping running tasks
    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut ids = Vec::new();
        self.for_each(|id, record| {
            if is_reclaimable(record, now) {
                ids.push(id.clone());
            }
        });
        ids
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

/// A running task is re-stamped when it finishes, so its expiry is ignored until then
fn is_reclaimable(record: &TaskRecord, now: DateTime<Utc>) -> bool {
    record.status != TaskStatus::Running && record.is_expired(now)
}

fn apply_transition(id: &TaskId, record: &mut TaskRecord, next: TaskStatus) -> Result<TaskStatus> {
    let previous = record.status;
    if !previous.can_transition_to(next) {
        return Err(TaskError::InvalidTransition {
            id: id.clone(),
            from: previous,
            to: next,
        });
    }

    record.status = next;
    let now = Utc::now();
    if next == TaskStatus::Running {
        record.started_at = Some(now);
        record.finished_at = None;
    } else if next.is_terminal() {
        record.finished_at = Some(now);
    }
    debug!(task_id = %id, from = %previous, to = %next, "Task status changed");
    Ok(previous)
}
