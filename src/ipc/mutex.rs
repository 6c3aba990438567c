//! Priority-inheriting mutexes.
//!
//! Inheritance here is dynamic, not the static priority-ceiling protocol
//! `r3_kernel`'s `mutex.rs` implements: locking never raises the owner's
//! priority by itself, but a *blocking* attempt by a higher-priority task
//! does, for as long as that task waits. Unlocking restores whatever
//! priority the owner held before the boost.
use std::collections::VecDeque;

use crate::error::{KernelError, ProtocolError};
use crate::kernel::KernelState;
use crate::task::TaskId;

/// Opaque handle to a mutex. Stable for the mutex's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub(crate) usize);

pub(crate) struct MutexObj {
    pub(crate) owner: Option<TaskId>,
    /// Priority the owner held immediately before any inheritance boost
    /// from this mutex. Restored on unlock.
    pub(crate) owner_base_priority: u8,
    pub(crate) waiters: VecDeque<TaskId>,
}

pub(crate) enum LockOutcome {
    Acquired,
    WouldBlock,
}

impl KernelState {
    pub(crate) fn mutex(&self, id: MutexId) -> Result<&MutexObj, KernelError> {
        self.mutexes.get(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn mutex_mut(&mut self, id: MutexId) -> Result<&mut MutexObj, KernelError> {
        self.mutexes.get_mut(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn mutex_create(&mut self) -> Result<MutexId, KernelError> {
        if self.mutexes.len() >= self.config.max_semaphores {
            return Err(KernelError::Capacity);
        }
        let idx = self.mutexes.insert(MutexObj {
            owner: None,
            owner_base_priority: 0,
            waiters: VecDeque::new(),
        });
        Ok(MutexId(idx))
    }

    /// Non-blocking attempt. On failure, boosts the current owner's
    /// priority to the caller's if the caller is strictly higher.
    pub(crate) fn mutex_try_lock(&mut self, id: MutexId, caller: TaskId) -> Result<LockOutcome, KernelError> {
        let caller_priority = self.task(caller)?.priority;
        let m = self.mutex_mut(id)?;
        match m.owner {
            None => {
                m.owner = Some(caller);
                m.owner_base_priority = caller_priority;
                Ok(LockOutcome::Acquired)
            }
            Some(owner) if owner == caller => Err(KernelError::Protocol(ProtocolError::AlreadyOwned)),
            Some(owner) => {
                let owner_current = self.task(owner)?.priority;
                if caller_priority < owner_current {
                    let owner_task = self.task_mut(owner)?;
                    owner_task.priority = caller_priority;
                    self.bump_ready_queue(owner);
                }
                Ok(LockOutcome::WouldBlock)
            }
        }
    }

    /// Move `task` to the front of the ready queue matching its (possibly
    /// just-boosted) priority, if it is currently ready there. No-op for a
    /// task that is running, blocked, or suspended — its position is
    /// re-derived from `priority` the next time it is queued.
    fn bump_ready_queue(&mut self, task: TaskId) {
        if let Ok(t) = self.task(task) {
            if t.state == crate::task::TaskState::Ready {
                let priority = t.priority;
                self.remove_from_all_lists(task);
                self.task_mut(task).unwrap().state = crate::task::TaskState::Ready;
                self.ready_queue_for(priority).push_front(task);
            }
        }
    }

    pub(crate) fn mutex_enqueue_waiter(&mut self, id: MutexId, task: TaskId) -> Result<(), KernelError> {
        let m = self.mutex_mut(id)?;
        if !m.waiters.contains(&task) {
            m.waiters.push_back(task);
        }
        Ok(())
    }

    pub(crate) fn mutex_remove_waiter(&mut self, id: MutexId, task: TaskId) {
        if let Ok(m) = self.mutex_mut(id) {
            m.waiters.retain(|&t| t != task);
        }
    }

    /// `unlock(mtx)`: restore the caller's base priority, then hand the
    /// mutex directly to the highest-priority waiter (if any).
    pub(crate) fn mutex_unlock(&mut self, id: MutexId, caller: TaskId) -> Result<Option<TaskId>, KernelError> {
        let base_priority = {
            let m = self.mutex(id)?;
            match m.owner {
                Some(owner) if owner == caller => m.owner_base_priority,
                Some(_) => return Err(KernelError::Protocol(ProtocolError::NotOwner)),
                None => return Err(KernelError::Protocol(ProtocolError::NotOwner)),
            }
        };
        if let Ok(task) = self.task_mut(caller) {
            task.priority = base_priority;
        }

        let waiters: Vec<TaskId> = self.mutex(id)?.waiters.iter().copied().collect();
        let winner = waiters
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|(_, t)| self.tasks.get(t.0).map(|task| task.priority).unwrap_or(u8::MAX))
            .map(|(idx, t)| (idx, t));

        if let Some((idx, winner)) = winner {
            let winner_priority = self.tasks.get(winner.0).map(|t| t.priority).unwrap_or(base_priority);
            let m = self.mutex_mut(id)?;
            m.waiters.remove(idx);
            m.owner = Some(winner);
            m.owner_base_priority = winner_priority;
            Ok(Some(winner))
        } else {
            self.mutex_mut(id)?.owner = None;
            Ok(None)
        }
    }

    pub(crate) fn mutex_is_locked(&self, id: MutexId) -> Result<bool, KernelError> {
        Ok(self.mutex(id)?.owner.is_some())
    }

    /// `delete(mtx)`: unblock every waiter; if the owner was boosted,
    /// restore its base priority first.
    pub(crate) fn mutex_delete(&mut self, id: MutexId) -> Result<Vec<TaskId>, KernelError> {
        if !self.mutexes.contains(id.0) {
            return Err(KernelError::BadId);
        }
        let m = self.mutexes.remove(id.0);
        if let Some(owner) = m.owner {
            if let Ok(task) = self.task_mut(owner) {
                task.priority = m.owner_base_priority;
            }
        }
        Ok(m.waiters.into_iter().collect())
    }
}
