//! Tasks: the TCB, the registry, and every `task_*` operation.
//! Registry operations are implemented as methods on
//! [`crate::kernel::KernelState`], the way `r3_kernel`'s `task.rs` implements
//! task operations as methods on the shared `System<Traits>` type.
use std::collections::VecDeque;

use arrayvec::ArrayString;

use crate::error::{KernelError, ProtocolError};
use crate::ipc::{EventGroupId, MutexId, QueueId, SemaphoreId};
use crate::kernel::KernelState;
use crate::time::Tick;

/// Opaque, stable handle to a task. Valid for the TCB's lifetime; a handle
/// outliving `task_delete` simply fails the next lookup with
/// [`KernelError::BadId`] — the registry checks slot occupancy, not just
/// the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) TaskId);

/// Internal slab index. Not exposed directly; callers only ever see
/// [`TaskHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TaskId(pub(crate) usize);

/// The task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Suspended,
    Terminated,
}

/// Why a task is `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockReason {
    None,
    Delay,
    Semaphore,
    QueueFull,
    QueueEmpty,
    Event,
    Mutex,
}

/// Why a blocked task was last woken, set by whichever kernel operation did
/// the waking and read (and reset to `None`) by the blocking call's own
/// thread once it regains control. Lets one generic wait loop serve every
/// blocking primitive instead of each growing its own ad hoc wake path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeReason {
    None,
    /// The resource was handed to this task, or its delay simply elapsed.
    Given,
    /// The bounded wait's deadline passed before the resource arrived.
    TimedOut,
    /// The object being waited on was deleted.
    Destroyed,
}

/// `block_object`, as a tagged union rather than a pointer-packed field.
/// The source this kernel is modeled on bit-packs a 24-bit mask and 8-bit
/// options into a pointer-sized slot; this reimplementation spends a few
/// more bytes per TCB for a variant that reads directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockObject {
    None,
    Semaphore(SemaphoreId),
    Mutex(MutexId),
    Queue(QueueId),
    Event {
        group: EventGroupId,
        mask: u32,
        all: bool,
        clear: bool,
    },
}

/// Options controlling a new task, beyond its name and priority.
#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub priority: u8,
    /// `0` means "use the kernel's configured default."
    pub stack_size: usize,
}

impl TaskOptions {
    pub fn new(priority: u8) -> Self {
        Self {
            priority,
            stack_size: 0,
        }
    }
}

/// Runtime statistics tracked per task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStats {
    pub runtime_ticks: u64,
    pub last_start: Tick,
    pub activations: u32,
    pub deadline_misses: u32,
    pub max_burst_ticks: u32,
}

pub(crate) const NAME_CAP: usize = 16;

/// The task control block.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: ArrayString<NAME_CAP>,
    pub(crate) state: TaskState,
    pub(crate) priority: u8,
    pub(crate) original_priority: u8,
    pub(crate) time_slice: u32,
    pub(crate) slice_remaining: u32,
    pub(crate) entry: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) block_reason: BlockReason,
    pub(crate) block_object: BlockObject,
    /// Message bytes a sender blocked with reason `QueueFull` is carrying;
    /// picked up directly by a receiver per the rendezvous fast-path.
    pub(crate) pending_msg: Option<Vec<u8>>,
    /// Flag value observed at the moment an event-group wait was satisfied,
    /// after this waiter's own `clear` (if any) was applied. Read back by
    /// the woken call instead of re-querying the group, which may have
    /// changed again before the waiter's thread resumes.
    pub(crate) pending_event_flags: Option<u32>,
    /// Tick at which a bounded wait (delay, or a timed-out `take`/`lock`/
    /// `receive`/`wait`) expires. `None` while not in such a wait.
    pub(crate) wait_deadline: Option<Tick>,
    pub(crate) wake_reason: WakeReason,
    pub(crate) period: Tick,
    pub(crate) deadline: Tick,
    pub(crate) next_release: Tick,
    pub(crate) absolute_deadline: Tick,
    pub(crate) job_outstanding: bool,
    pub(crate) stats: TaskStats,
    pub(crate) is_idle: bool,
    pub(crate) burst_start: Tick,
    pub(crate) thread: Option<std::thread::JoinHandle<()>>,
}

impl Task {
    pub(crate) fn effective_priority(&self) -> u8 {
        self.priority
    }
}

impl KernelState {
    pub(crate) fn task_by_name(&self, name: &str) -> Option<TaskId> {
        self.tasks
            .iter()
            .find(|(_, t)| t.name.as_str() == name)
            .map(|(i, _)| TaskId(i))
    }

    pub(crate) fn task(&self, id: TaskId) -> Result<&Task, KernelError> {
        self.tasks.get(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, KernelError> {
        self.tasks.get_mut(id.0).ok_or(KernelError::BadId)
    }

    /// Allocate a fresh TCB in `Ready` state and enqueue it. Does not spawn
    /// the backing OS thread — that happens in `Kernel::task_create` once
    /// the slot (and thus `TaskId`) is known, since the thread body needs
    /// to know its own id.
    pub(crate) fn insert_task(
        &mut self,
        name: &str,
        priority: u8,
        time_slice: u32,
        is_idle: bool,
        entry: Box<dyn FnOnce() + Send>,
    ) -> Result<TaskId, KernelError> {
        if priority >= self.config.p_max {
            return Err(KernelError::InvalidArgument);
        }
        if self.tasks.len() >= self.config.max_tasks {
            return Err(KernelError::Capacity);
        }
        let mut truncated = ArrayString::<NAME_CAP>::new();
        let cap = self.config.max_task_name_len.saturating_sub(1).min(NAME_CAP - 1);
        for ch in name.chars() {
            if truncated.len() + ch.len_utf8() > cap {
                break;
            }
            truncated.push(ch);
        }
        let task = Task {
            id: TaskId(0),
            name: truncated,
            state: TaskState::Ready,
            priority,
            original_priority: priority,
            time_slice,
            slice_remaining: time_slice,
            entry: Some(entry),
            block_reason: BlockReason::None,
            block_object: BlockObject::None,
            pending_msg: None,
            pending_event_flags: None,
            wait_deadline: None,
            wake_reason: WakeReason::None,
            period: 0,
            deadline: 0,
            next_release: 0,
            absolute_deadline: 0,
            job_outstanding: false,
            stats: TaskStats::default(),
            is_idle,
            burst_start: 0,
            thread: None,
        };
        let idx = self.tasks.insert(task);
        let id = TaskId(idx);
        self.tasks[idx].id = id;
        self.ready_queue_for(priority).push_back(id);
        Ok(id)
    }

    /// `task_delete`: refuses the current task and the idle task.
    pub(crate) fn delete_task(&mut self, id: TaskId) -> Result<std::thread::JoinHandle<()>, KernelError> {
        if Some(id) == self.sched.current || self.task(id)?.is_idle {
            return Err(KernelError::Protocol(ProtocolError::CurrentOrIdleTask));
        }
        self.remove_from_all_lists(id);
        let task = self.tasks.remove(id.0);
        Ok(task.thread.expect("deleted task never spawned"))
    }

    /// Remove `id` from whichever single list it currently occupies,
    /// per I1 ("a task is in a list iff its state requires it... never
    /// more than one").
    pub(crate) fn remove_from_all_lists(&mut self, id: TaskId) {
        for q in self.sched.ready.iter_mut() {
            q.retain(|&t| t != id);
        }
        self.sched.blocked.retain(|&t| t != id);
        self.sched.suspended.retain(|&t| t != id);
        self.remove_from_waiter_lists(id);
    }

    fn remove_from_waiter_lists(&mut self, id: TaskId) {
        for s in self.semaphores.iter_mut() {
            s.1.waiters.retain(|&t| t != id);
        }
        for m in self.mutexes.iter_mut() {
            m.1.waiters.retain(|&t| t != id);
        }
        for q in self.queues.iter_mut() {
            q.1.waiting_send.retain(|&t| t != id);
            q.1.waiting_recv.retain(|&t| t != id);
        }
        for e in self.event_groups.iter_mut() {
            e.1.waiters.retain(|&t| t != id);
        }
    }

    pub(crate) fn ready_queue_for(&mut self, priority: u8) -> &mut VecDeque<TaskId> {
        &mut self.sched.ready[priority as usize]
    }

    pub(crate) fn set_priority(&mut self, id: TaskId, priority: u8) -> Result<(), KernelError> {
        if priority >= self.config.p_max {
            return Err(KernelError::InvalidArgument);
        }
        let was_ready;
        {
            let task = self.task_mut(id)?;
            task.priority = priority;
            task.original_priority = priority;
            was_ready = task.state == TaskState::Ready;
        }
        if was_ready {
            self.remove_from_all_lists(id);
            self.task_mut(id)?.state = TaskState::Ready;
            self.ready_queue_for(priority).push_back(id);
        }
        Ok(())
    }

    pub(crate) fn suspend_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let task = self.task(id)?;
        if task.is_idle {
            return Err(KernelError::Protocol(ProtocolError::IdleTaskNotSuspendable));
        }
        if task.state == TaskState::Terminated {
            return Err(KernelError::Protocol(ProtocolError::NotSuspended));
        }
        self.remove_from_all_lists(id);
        self.task_mut(id)?.state = TaskState::Suspended;
        self.sched.suspended.push_back(id);
        Ok(())
    }

    pub(crate) fn resume_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let task = self.task(id)?;
        if task.state != TaskState::Suspended {
            return Err(KernelError::Protocol(ProtocolError::NotSuspended));
        }
        let priority = task.priority;
        self.sched.suspended.retain(|&t| t != id);
        self.task_mut(id)?.state = TaskState::Ready;
        self.ready_queue_for(priority).push_back(id);
        Ok(())
    }

    /// Remove a blocked task from whichever single IPC waiter list its
    /// `block_object` names, tag why it was woken, and move it to `Ready`.
    /// The shared exit path for every blocking primitive's wakeup, whether
    /// the cause was a signal, a timeout, or the object being deleted.
    pub(crate) fn wake_blocked(&mut self, id: TaskId, reason: WakeReason) {
        if let Ok(task) = self.task(id) {
            match task.block_object {
                BlockObject::Semaphore(sid) => self.semaphore_remove_waiter(sid, id),
                BlockObject::Mutex(mid) => self.mutex_remove_waiter(mid, id),
                BlockObject::Queue(qid) => {
                    self.queue_remove_sender(qid, id);
                    self.queue_remove_receiver(qid, id);
                }
                BlockObject::Event { group, .. } => self.event_group_remove_waiter(group, id),
                BlockObject::None => {}
            }
        }
        if let Ok(task) = self.task_mut(id) {
            task.wake_reason = reason;
            task.wait_deadline = None;
        }
        self.unblock(id);
    }
}
