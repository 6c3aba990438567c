//! Counting semaphores.
use std::collections::VecDeque;

use crate::error::{KernelError, ProtocolError};
use crate::kernel::KernelState;
use crate::task::TaskId;

/// Opaque handle to a semaphore. Stable for the semaphore's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId(pub(crate) usize);

pub(crate) struct SemaphoreObj {
    pub(crate) count: u32,
    pub(crate) max_count: u32,
    pub(crate) waiters: VecDeque<TaskId>,
}

/// Outcome of a non-blocking attempt to take the semaphore, used by the
/// blocking wrapper in `kernel.rs` to decide whether to park the caller.
pub(crate) enum TakeOutcome {
    Acquired,
    WouldBlock,
}

impl KernelState {
    pub(crate) fn semaphore(&self, id: SemaphoreId) -> Result<&SemaphoreObj, KernelError> {
        self.semaphores.get(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn semaphore_mut(&mut self, id: SemaphoreId) -> Result<&mut SemaphoreObj, KernelError> {
        self.semaphores.get_mut(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn semaphore_create(&mut self, initial: u32, max: u32) -> Result<SemaphoreId, KernelError> {
        if max == 0 || initial > max {
            return Err(KernelError::InvalidArgument);
        }
        if self.semaphores.len() >= self.config.max_semaphores {
            return Err(KernelError::Capacity);
        }
        let idx = self.semaphores.insert(SemaphoreObj {
            count: initial,
            max_count: max,
            waiters: VecDeque::new(),
        });
        Ok(SemaphoreId(idx))
    }

    /// Non-blocking attempt: decrement if `count > 0`.
    pub(crate) fn semaphore_try_take(&mut self, id: SemaphoreId) -> Result<TakeOutcome, KernelError> {
        let sem = self.semaphore_mut(id)?;
        if sem.count > 0 {
            sem.count -= 1;
            Ok(TakeOutcome::Acquired)
        } else {
            Ok(TakeOutcome::WouldBlock)
        }
    }

    /// `give(sem)`: wake a waiter (count/decrement cancel each other) or
    /// increment.
    pub(crate) fn semaphore_give(&mut self, id: SemaphoreId) -> Result<Option<TaskId>, KernelError> {
        let sem = self.semaphore_mut(id)?;
        if let Some(waiter) = sem.waiters.pop_front() {
            return Ok(Some(waiter));
        }
        if sem.count < sem.max_count {
            sem.count += 1;
            Ok(None)
        } else {
            Err(KernelError::Protocol(ProtocolError::AtMaxCount))
        }
    }

    pub(crate) fn semaphore_enqueue_waiter(&mut self, id: SemaphoreId, task: TaskId) -> Result<(), KernelError> {
        self.semaphore_mut(id)?.waiters.push_back(task);
        Ok(())
    }

    pub(crate) fn semaphore_remove_waiter(&mut self, id: SemaphoreId, task: TaskId) {
        if let Ok(sem) = self.semaphore_mut(id) {
            sem.waiters.retain(|&t| t != task);
        }
    }

    pub(crate) fn semaphore_count(&self, id: SemaphoreId) -> Result<u32, KernelError> {
        Ok(self.semaphore(id)?.count)
    }

    /// `delete(sem)`: unblock every waiter with a timeout-like wake.
    pub(crate) fn semaphore_delete(&mut self, id: SemaphoreId) -> Result<Vec<TaskId>, KernelError> {
        if !self.semaphores.contains(id.0) {
            return Err(KernelError::BadId);
        }
        let sem = self.semaphores.remove(id.0);
        Ok(sem.waiters.into_iter().collect())
    }
}
