//! Event flag groups: 32 independent bits with ALL/ANY wait semantics and
//! an optional auto-clear-on-wait option.
use std::collections::VecDeque;

use bitflags::bitflags;

use crate::error::KernelError;
use crate::kernel::KernelState;
use crate::task::TaskId;

/// Opaque handle to an event flag group. Stable for the group's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventGroupId(pub(crate) usize);

bitflags! {
    /// Wait-mode options for `event_wait`: ALL vs ANY, optionally combined
    /// with CLEAR-on-success.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u8 {
        /// Wait for every requested bit (logical AND). Absent means ANY
        /// (logical OR) — the two are mutually exclusive wait modes, not
        /// combinable, so this is modeled as a single bit rather than two.
        const ALL = 0b01;
        /// Clear the satisfied bits atomically with the wait succeeding.
        const CLEAR = 0b10;
    }
}

pub(crate) struct EventGroupObj {
    pub(crate) flags: u32,
    pub(crate) waiters: VecDeque<TaskId>,
}

impl KernelState {
    pub(crate) fn event_group(&self, id: EventGroupId) -> Result<&EventGroupObj, KernelError> {
        self.event_groups.get(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn event_group_mut(&mut self, id: EventGroupId) -> Result<&mut EventGroupObj, KernelError> {
        self.event_groups.get_mut(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn event_group_create(&mut self, initial: u32) -> Result<EventGroupId, KernelError> {
        if self.event_groups.len() >= self.config.max_semaphores {
            return Err(KernelError::Capacity);
        }
        let idx = self.event_groups.insert(EventGroupObj {
            flags: initial,
            waiters: VecDeque::new(),
        });
        Ok(EventGroupId(idx))
    }

    /// `set(group, mask)`: OR `mask` into the group's flags. Returns the
    /// tasks parked on this group whose wait condition is now satisfied, so
    /// the caller can unblock them and (per their own `clear` option)
    /// consume the bits.
    pub(crate) fn event_group_set(&mut self, id: EventGroupId, mask: u32) -> Result<Vec<TaskId>, KernelError> {
        self.event_group_mut(id)?.flags |= mask;
        let waiters: Vec<TaskId> = self.event_group(id)?.waiters.iter().copied().collect();
        let mut satisfied = Vec::new();
        for waiter in waiters {
            let (w_mask, all, clear) = match self.task(waiter).map(|t| t.block_object) {
                Ok(crate::task::BlockObject::Event { mask, all, clear, .. }) => (mask, all, clear),
                _ => continue,
            };
            let g = self.event_group_mut(id)?;
            if Self::event_condition_met(g.flags, w_mask, all) {
                let observed = g.flags & w_mask;
                if clear {
                    g.flags &= !w_mask;
                }
                self.task_mut(waiter).unwrap().pending_event_flags = Some(observed);
                satisfied.push(waiter);
            }
        }
        Ok(satisfied)
    }

    pub(crate) fn event_group_clear(&mut self, id: EventGroupId, mask: u32) -> Result<(), KernelError> {
        self.event_group_mut(id)?.flags &= !mask;
        Ok(())
    }

    pub(crate) fn event_group_get(&self, id: EventGroupId) -> Result<u32, KernelError> {
        Ok(self.event_group(id)?.flags)
    }

    fn event_condition_met(flags: u32, mask: u32, all: bool) -> bool {
        if all {
            flags & mask == mask
        } else {
            flags & mask != 0
        }
    }

    /// Non-blocking check. On success, and if `clear` was requested, the
    /// satisfied bits are consumed atomically with the check.
    pub(crate) fn event_group_try_wait(
        &mut self,
        id: EventGroupId,
        mask: u32,
        all: bool,
        clear: bool,
    ) -> Result<Option<u32>, KernelError> {
        let g = self.event_group_mut(id)?;
        if Self::event_condition_met(g.flags, mask, all) {
            let observed = g.flags & mask;
            if clear {
                g.flags &= !mask;
            }
            Ok(Some(observed))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn event_group_enqueue_waiter(&mut self, id: EventGroupId, task: TaskId) -> Result<(), KernelError> {
        self.event_group_mut(id)?.waiters.push_back(task);
        Ok(())
    }

    pub(crate) fn event_group_remove_waiter(&mut self, id: EventGroupId, task: TaskId) {
        if let Ok(g) = self.event_group_mut(id) {
            g.waiters.retain(|&t| t != task);
        }
    }

    /// `delete(group)`: unblock every waiter.
    pub(crate) fn event_group_delete(&mut self, id: EventGroupId) -> Result<Vec<TaskId>, KernelError> {
        if !self.event_groups.contains(id.0) {
            return Err(KernelError::BadId);
        }
        let g = self.event_groups.remove(id.0);
        Ok(g.waiters.into_iter().collect())
    }
}
