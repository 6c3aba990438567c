//! The kernel value: the object pools, the turnstile, and the full public
//! API surface.
//!
//! [`KernelState`] holds every kernel data structure behind one
//! [`crate::context::Turnstile`]; [`Kernel`] is a cheap `Clone`-able handle
//! to it, the way `r3_port_std`'s hosted port hands every task thread a
//! reference to the same `System`.
use std::sync::Arc;

use slab::Slab;

use crate::config::Config;
use crate::context::{bind_current_task, current_task, Turnstile};
use crate::error::{log_and_return, KernelError, KernelResult};
use crate::ipc::event_group::EventGroupObj;
use crate::ipc::mutex::{LockOutcome, MutexObj};
use crate::ipc::queue::{QueueObj, RecvOutcome, SendOutcome};
use crate::ipc::semaphore::{SemaphoreObj, TakeOutcome};
use crate::ipc::{EventGroupId, MutexId, QueueId, SemaphoreId, WaitFlags};
use crate::scheduler::{SchedPolicy, SchedState, SchedulerStats};
use crate::task::{BlockObject, BlockReason, Task, TaskHandle, TaskId, TaskOptions, TaskState, TaskStats, WakeReason};
use crate::time::{is_infinite, wrapping_before, Tick, Timeout};

/// Every kernel data structure, guarded by one [`Turnstile`]. The source
/// this kernel is modeled on keeps its kernel objects in file-scope static
/// arrays; here they become slab pools collapsed onto a single `Kernel`
/// value instead.
pub(crate) struct KernelState {
    pub(crate) tasks: Slab<Task>,
    pub(crate) sched: SchedState,
    pub(crate) semaphores: Slab<SemaphoreObj>,
    pub(crate) mutexes: Slab<MutexObj>,
    pub(crate) queues: Slab<QueueObj>,
    pub(crate) event_groups: Slab<EventGroupObj>,
    pub(crate) config: Config,
    /// Critical-section nesting depth, for diagnostics only — see
    /// [`crate::context::Turnstile`].
    pub(crate) cs_depth: u32,
}

/// A simulated real-time kernel. Cheap to clone; every clone refers to the
/// same underlying state.
#[derive(Clone)]
pub struct Kernel {
    turnstile: Arc<Turnstile>,
}

impl Kernel {
    /// Build a kernel and its idle task. Does not start scheduling — call
    /// [`Kernel::start`] once every task you want ready at boot has been
    /// created with [`Kernel::task_create`].
    pub fn new(config: Config) -> Self {
        let state = KernelState {
            tasks: Slab::with_capacity(config.max_tasks),
            sched: SchedState::new(config.p_max, SchedPolicy::Priority),
            semaphores: Slab::with_capacity(config.max_semaphores),
            mutexes: Slab::with_capacity(config.max_semaphores),
            queues: Slab::with_capacity(config.max_queues),
            event_groups: Slab::with_capacity(config.max_semaphores),
            config,
            cs_depth: 0,
        };
        let kernel = Self {
            turnstile: Arc::new(Turnstile::new(state)),
        };

        let idle_priority = kernel.turnstile.enter().config.idle_priority();
        let idle_id = {
            let mut cs = kernel.turnstile.enter();
            cs.insert_task("idle", idle_priority, 0, true, Box::new(|| {}))
                .expect("idle task creation cannot fail: fresh kernel always has capacity")
        };
        kernel.turnstile.enter().sched.idle_task = Some(idle_id);
        let handle = kernel.spawn_task_thread(idle_id, Self::idle_loop);
        kernel.turnstile.enter().task_mut(idle_id).unwrap().thread = Some(handle);

        kernel
    }

    fn turnstile(&self) -> &Turnstile {
        &self.turnstile
    }

    fn idle_loop(kernel: Kernel, id: TaskId) {
        loop {
            let mut cs = kernel.turnstile().enter();
            cs = cs.wait_until_current(id);
            cs = cs.wait_while(|s| s.sched.current == Some(id));
            drop(cs);
        }
    }

    fn spawn_task_thread(
        &self,
        id: TaskId,
        body: fn(Kernel, TaskId),
    ) -> std::thread::JoinHandle<()> {
        let kernel = self.clone();
        std::thread::Builder::new()
            .name(format!("task-{}", id.0))
            .spawn(move || {
                bind_current_task(id);
                body(kernel, id);
            })
            .expect("failed to spawn task thread")
    }

    fn task_main(kernel: Kernel, id: TaskId) {
        {
            let cs = kernel.turnstile().enter();
            let _cs = cs.wait_until_current(id);
        }
        let entry = {
            let mut cs = kernel.turnstile().enter();
            cs.task_mut(id).ok().and_then(|t| t.entry.take())
        };
        if let Some(entry) = entry {
            entry();
        }
        kernel.task_exit(id);
    }

    fn task_exit(&self, id: TaskId) {
        let mut cs = self.turnstile().enter();
        if let Ok(task) = cs.task_mut(id) {
            task.state = TaskState::Terminated;
        }
        cs.context_switch_target();
        cs.notify_all();
    }

    /// The current value of the wrapping tick counter.
    pub fn now(&self) -> Tick {
        self.turnstile().enter().sched.time
    }

    /// Change the configured tick period, in milliseconds. Does not rescale
    /// any already-computed deadlines; affects only future `ms_to_ticks`
    /// conversions callers make against [`Kernel::config`].
    pub fn set_tick_rate(&self, ms: u32) {
        self.turnstile().enter().config.system_tick_ms = ms;
    }

    /// The kernel's current configuration, including the tick rate
    /// [`Kernel::set_tick_rate`] last set.
    pub fn config(&self) -> Config {
        self.turnstile().enter().config
    }

    /// Advance the tick counter by one and run the periodic/timeout/
    /// slice-expiry machinery. Safe to call from any thread, including one
    /// with no bound task.
    pub fn tick(&self) {
        let mut cs = self.turnstile().enter();
        let should_switch = cs.tick_internal();
        if should_switch {
            cs.context_switch_target();
        }
        cs.notify_all();
    }

    /// Begin scheduling: pick the first task to run. Deliberately returns
    /// control to the caller rather than the non-returning `start_first_task`
    /// the source models, since a function that never returns would leave
    /// nothing to drive `tick()` from this host simulation.
    pub fn start(&self) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        if cs.sched.started {
            return log_and_return(KernelError::InvalidArgument);
        }
        cs.sched.started = true;
        cs.context_switch_target();
        cs.notify_all();
        Ok(())
    }

    /// Stop scheduling. Task threads already dispatched keep running until
    /// their next blocking call; no new dispatch happens after this
    /// returns.
    pub fn stop(&self) {
        let mut cs = self.turnstile().enter();
        cs.sched.started = false;
    }

    fn current_id(&self) -> KernelResult<TaskId> {
        current_task().ok_or(KernelError::InvalidArgument)
    }

    // ---- task lifecycle -------------------------------------------------

    /// Create a task and its backing OS thread. `entry` runs once the task
    /// is first dispatched.
    pub fn task_create(
        &self,
        name: &str,
        opts: TaskOptions,
        entry: impl FnOnce() + Send + 'static,
    ) -> KernelResult<TaskHandle> {
        let id = {
            let mut cs = self.turnstile().enter();
            let time_slice = cs.config.default_time_slice;
            match cs.insert_task(name, opts.priority, time_slice, false, Box::new(entry)) {
                Ok(id) => id,
                Err(e) => return log_and_return(e),
            }
        };
        let handle = self.spawn_task_thread(id, Self::task_main);
        self.turnstile().enter().task_mut(id).unwrap().thread = Some(handle);

        let mut cs = self.turnstile().enter();
        cs.context_switch_target();
        cs.notify_all();
        Ok(TaskHandle(id))
    }

    /// Configure `task` as periodic: `period` and `relative_deadline` are in
    /// ticks. Must be called before the task is first dispatched.
    pub fn task_set_periodic(&self, task: TaskHandle, period: Tick, relative_deadline: Tick) -> KernelResult<()> {
        if period == 0 {
            return log_and_return(KernelError::InvalidArgument);
        }
        let mut cs = self.turnstile().enter();
        let now = cs.sched.time;
        let t = match cs.task_mut(task.0) {
            Ok(t) => t,
            Err(e) => return log_and_return(e),
        };
        t.period = period;
        t.deadline = if relative_deadline == 0 { period } else { relative_deadline };
        t.next_release = now.wrapping_add(period);
        t.absolute_deadline = t.next_release.wrapping_add(t.deadline);
        t.job_outstanding = false;
        Ok(())
    }

    pub fn task_delete(&self, task: TaskHandle) -> KernelResult<()> {
        let handle = {
            let mut cs = self.turnstile().enter();
            match cs.delete_task(task.0) {
                Ok(h) => h,
                Err(e) => return log_and_return(e),
            }
        };
        let mut cs = self.turnstile().enter();
        cs.context_switch_target();
        cs.notify_all();
        drop(cs);
        // Not joined: the deleted task's thread may be parked waiting for a
        // turn that will never come again (its TaskId's slab slot can be
        // reused), and Rust has no way to forcibly unwind a running thread.
        // It sits blocked on the turnstile condvar — no CPU spent — until
        // the process exits.
        drop(handle);
        Ok(())
    }

    pub fn task_set_priority(&self, task: TaskHandle, priority: u8) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.set_priority(task.0, priority) {
            Ok(()) => {
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn task_get_priority(&self, task: TaskHandle) -> KernelResult<u8> {
        let cs = self.turnstile().enter();
        match cs.task(task.0) {
            Ok(t) => Ok(t.priority),
            Err(e) => log_and_return(e),
        }
    }

    /// Suspend `task`. Suspending the calling task additionally yields:
    /// the call does not return to it until something else resumes it.
    pub fn task_suspend(&self, task: TaskHandle) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.suspend_task(task.0) {
            Ok(()) => {
                cs.context_switch_target();
                cs.notify_all();
                if current_task() == Some(task.0) {
                    cs = cs.wait_until_current(task.0);
                }
                drop(cs);
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn task_resume(&self, task: TaskHandle) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.resume_task(task.0) {
            Ok(()) => {
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn task_get_by_name(&self, name: &str) -> KernelResult<TaskHandle> {
        let cs = self.turnstile().enter();
        cs.task_by_name(name)
            .map(TaskHandle)
            .ok_or(KernelError::BadId)
            .or_else(|e| log_and_return(e))
    }

    pub fn task_current(&self) -> Option<TaskHandle> {
        current_task().map(TaskHandle)
    }

    pub fn task_get_stats(&self, task: TaskHandle) -> KernelResult<TaskStats> {
        let cs = self.turnstile().enter();
        match cs.task(task.0) {
            Ok(t) => Ok(t.stats),
            Err(e) => log_and_return(e),
        }
    }

    pub fn task_reset_stats(&self, task: TaskHandle) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.task_mut(task.0) {
            Ok(t) => {
                t.stats = TaskStats::default();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    /// Re-queue the calling task to the tail of its ready class and block
    /// until it is dispatched again. The shared body behind `task_yield`
    /// and every call that degrades into a yield (`task_delay(0)`,
    /// `task_delay_until` with a non-future tick).
    fn yield_current(&self, id: TaskId) {
        let mut cs = self.turnstile().enter();
        if let Ok(task) = cs.task_mut(id) {
            let priority = task.priority;
            let is_idle = task.is_idle;
            if task.state == TaskState::Running && !is_idle {
                task.state = TaskState::Ready;
                cs.ready_queue_for(priority).push_back(id);
            }
        }
        cs.context_switch_target();
        cs.notify_all();
        cs = cs.wait_until_current(id);
        drop(cs);
    }

    /// Voluntarily give up the CPU for the remainder of the current tick
    /// without blocking.
    pub fn task_yield(&self) -> KernelResult<()> {
        let id = self.current_id()?;
        self.yield_current(id);
        Ok(())
    }

    /// Block the calling task for `ticks`. `0` is equivalent to `task_yield`.
    pub fn task_delay(&self, ticks: Tick) -> KernelResult<()> {
        let id = self.current_id()?;
        if ticks == 0 {
            self.yield_current(id);
            return Ok(());
        }
        let mut cs = self.turnstile().enter();
        let wake_at = cs.sched.time.wrapping_add(ticks);
        if let Err(e) = cs.block_current(id, BlockReason::Delay, BlockObject::None) {
            return log_and_return(e);
        }
        cs.task_mut(id).unwrap().wait_deadline = Some(wake_at);
        cs.context_switch_target();
        cs.notify_all();
        cs = cs.wait_until_current(id);
        drop(cs);
        Ok(())
    }

    /// Block the calling task until the tick counter reaches `tick`. A
    /// `tick` at or before `now` is equivalent to `task_yield`, matching
    /// `task_delay(0)`'s contract.
    pub fn task_delay_until(&self, tick: Tick) -> KernelResult<()> {
        let id = self.current_id()?;
        let mut cs = self.turnstile().enter();
        let now = cs.sched.time;
        if !wrapping_before(now, tick) {
            drop(cs);
            self.yield_current(id);
            return Ok(());
        }
        if let Err(e) = cs.block_current(id, BlockReason::Delay, BlockObject::None) {
            return log_and_return(e);
        }
        cs.task_mut(id).unwrap().wait_deadline = Some(tick);
        cs.context_switch_target();
        cs.notify_all();
        cs = cs.wait_until_current(id);
        drop(cs);
        Ok(())
    }

    /// Block the calling periodic task until its next release, the
    /// periodic-task analogue of `task_delay_until` / self-suspend.
    pub fn task_wait_for_next_period(&self) -> KernelResult<()> {
        let id = self.current_id()?;
        let mut cs = self.turnstile().enter();
        let has_period = cs.task(id).map(|t| t.period > 0).unwrap_or(false);
        if !has_period {
            return log_and_return(KernelError::InvalidArgument);
        }
        cs.task_mut(id).unwrap().job_outstanding = false;
        if let Err(e) = cs.suspend_task(id) {
            return log_and_return(e);
        }
        cs.context_switch_target();
        cs.notify_all();
        cs = cs.wait_until_current(id);
        drop(cs);
        Ok(())
    }

    // ---- generic blocking-wait helper ------------------------------------

    /// Park the calling task (already placed on a wait list by `caller`)
    /// until woken, honoring `timeout`. Returns `Ok(())` on a normal wake,
    /// `Err(Timeout)` / `Err(Destroyed)` otherwise. Shared by every IPC
    /// primitive's blocking path.
    fn park_for(&self, id: TaskId, timeout: Timeout, mut cs: crate::context::CsGuard<'_>) -> KernelResult<()> {
        if !is_infinite(timeout) {
            let wake_at = cs.sched.time.wrapping_add(timeout);
            cs.task_mut(id).unwrap().wait_deadline = Some(wake_at);
        }
        cs.context_switch_target();
        cs.notify_all();
        cs = cs.wait_until_current(id);
        let reason = cs.task_mut(id).map(|t| std::mem::replace(&mut t.wake_reason, WakeReason::None));
        drop(cs);
        match reason {
            Ok(WakeReason::Given) | Ok(WakeReason::None) => Ok(()),
            Ok(WakeReason::TimedOut) => Err(KernelError::Timeout),
            Ok(WakeReason::Destroyed) => Err(KernelError::Destroyed),
            Err(e) => Err(e),
        }
    }

    // ---- semaphores -----------------------------------------------------

    pub fn semaphore_create(&self, initial: u32, max: u32) -> KernelResult<SemaphoreId> {
        let mut cs = self.turnstile().enter();
        cs.semaphore_create(initial, max).or_else(log_and_return)
    }

    pub fn semaphore_take(&self, sem: SemaphoreId, timeout: Timeout) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.semaphore_try_take(sem) {
            Ok(TakeOutcome::Acquired) => Ok(()),
            Ok(TakeOutcome::WouldBlock) => {
                if timeout == 0 {
                    return log_and_return(KernelError::Timeout);
                }
                let id = self.current_id()?;
                if let Err(e) = cs.semaphore_enqueue_waiter(sem, id) {
                    return log_and_return(e);
                }
                if let Err(e) = cs.block_current(id, BlockReason::Semaphore, BlockObject::Semaphore(sem)) {
                    return log_and_return(e);
                }
                self.park_for(id, timeout, cs)
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn semaphore_give(&self, sem: SemaphoreId) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.semaphore_give(sem) {
            Ok(Some(waiter)) => {
                cs.wake_blocked(waiter, WakeReason::Given);
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => log_and_return(e),
        }
    }

    pub fn semaphore_get_count(&self, sem: SemaphoreId) -> KernelResult<u32> {
        self.turnstile().enter().semaphore_count(sem).or_else(log_and_return)
    }

    pub fn semaphore_delete(&self, sem: SemaphoreId) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.semaphore_delete(sem) {
            Ok(waiters) => {
                for w in waiters {
                    cs.wake_blocked(w, WakeReason::Destroyed);
                }
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    // ---- mutexes --------------------------------------------------------

    pub fn mutex_create(&self) -> KernelResult<MutexId> {
        self.turnstile().enter().mutex_create().or_else(log_and_return)
    }

    pub fn mutex_lock(&self, mtx: MutexId, timeout: Timeout) -> KernelResult<()> {
        let id = self.current_id()?;
        let mut cs = self.turnstile().enter();
        match cs.mutex_try_lock(mtx, id) {
            Ok(LockOutcome::Acquired) => Ok(()),
            Ok(LockOutcome::WouldBlock) => {
                if timeout == 0 {
                    return log_and_return(KernelError::Timeout);
                }
                if let Err(e) = cs.mutex_enqueue_waiter(mtx, id) {
                    return log_and_return(e);
                }
                if let Err(e) = cs.block_current(id, BlockReason::Mutex, BlockObject::Mutex(mtx)) {
                    return log_and_return(e);
                }
                self.park_for(id, timeout, cs)
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn mutex_unlock(&self, mtx: MutexId) -> KernelResult<()> {
        let id = self.current_id()?;
        let mut cs = self.turnstile().enter();
        match cs.mutex_unlock(mtx, id) {
            Ok(Some(winner)) => {
                cs.wake_blocked(winner, WakeReason::Given);
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Ok(None) => {
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn mutex_is_locked(&self, mtx: MutexId) -> KernelResult<bool> {
        self.turnstile().enter().mutex_is_locked(mtx).or_else(log_and_return)
    }

    pub fn mutex_delete(&self, mtx: MutexId) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.mutex_delete(mtx) {
            Ok(waiters) => {
                for w in waiters {
                    cs.wake_blocked(w, WakeReason::Destroyed);
                }
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    // ---- message queues -------------------------------------------------

    pub fn queue_create(&self, capacity: usize, msg_size: usize) -> KernelResult<QueueId> {
        self.turnstile()
            .enter()
            .queue_create(capacity, msg_size)
            .or_else(log_and_return)
    }

    pub fn queue_send(&self, queue: QueueId, msg: Vec<u8>, timeout: Timeout) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.queue_try_send(queue, msg) {
            Ok(SendOutcome::Enqueued) => {
                cs.notify_all();
                Ok(())
            }
            Ok(SendOutcome::HandedOff(receiver)) => {
                cs.wake_blocked(receiver, WakeReason::Given);
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Ok(SendOutcome::WouldBlock(msg)) => {
                if timeout == 0 {
                    return log_and_return(KernelError::Timeout);
                }
                let id = self.current_id()?;
                if let Err(e) = cs.queue_enqueue_sender(queue, id) {
                    return log_and_return(e);
                }
                if let Err(e) = cs.block_current(id, BlockReason::QueueFull, BlockObject::Queue(queue)) {
                    return log_and_return(e);
                }
                cs.task_mut(id).unwrap().pending_msg = Some(msg);
                self.park_for(id, timeout, cs)
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn queue_receive(&self, queue: QueueId, timeout: Timeout) -> KernelResult<Vec<u8>> {
        let mut cs = self.turnstile().enter();
        match cs.queue_try_recv(queue) {
            Ok(RecvOutcome::Received(msg)) => {
                cs.notify_all();
                Ok(msg)
            }
            Ok(RecvOutcome::WouldBlock) => {
                if timeout == 0 {
                    return log_and_return(KernelError::Timeout);
                }
                let id = self.current_id()?;
                if let Err(e) = cs.queue_enqueue_receiver(queue, id) {
                    return log_and_return(e);
                }
                if let Err(e) = cs.block_current(id, BlockReason::QueueEmpty, BlockObject::Queue(queue)) {
                    return log_and_return(e);
                }
                self.park_for(id, timeout, cs)?;
                // The message was deposited directly on our TCB by the
                // sender that woke us (rendezvous fast path).
                let mut cs = self.turnstile().enter();
                cs.task_mut(id)
                    .ok()
                    .and_then(|t| t.pending_msg.take())
                    .ok_or(KernelError::Destroyed)
                    .or_else(log_and_return)
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn queue_peek(&self, queue: QueueId) -> KernelResult<Option<Vec<u8>>> {
        self.turnstile().enter().queue_peek(queue).or_else(log_and_return)
    }

    pub fn queue_get_count(&self, queue: QueueId) -> KernelResult<usize> {
        self.turnstile().enter().queue_count(queue).or_else(log_and_return)
    }

    pub fn queue_delete(&self, queue: QueueId) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.queue_delete(queue) {
            Ok(waiters) => {
                for w in waiters {
                    cs.wake_blocked(w, WakeReason::Destroyed);
                }
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    // ---- event flag groups ---------------------------------------------

    pub fn event_group_create(&self, initial: u32) -> KernelResult<EventGroupId> {
        self.turnstile().enter().event_group_create(initial).or_else(log_and_return)
    }

    pub fn event_group_set(&self, group: EventGroupId, mask: u32) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.event_group_set(group, mask) {
            Ok(satisfied) => {
                for w in satisfied {
                    cs.wake_blocked(w, WakeReason::Given);
                }
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn event_group_clear(&self, group: EventGroupId, mask: u32) -> KernelResult<()> {
        self.turnstile().enter().event_group_clear(group, mask).or_else(log_and_return)
    }

    pub fn event_group_get(&self, group: EventGroupId) -> KernelResult<u32> {
        self.turnstile().enter().event_group_get(group).or_else(log_and_return)
    }

    /// Wait for `mask` against `group` per `wait`: `ALL` or `ANY`,
    /// optionally clearing the satisfied bits. Returns the flag value
    /// observed at the moment the wait succeeded, or `0` on timeout (no
    /// bits matched) — the one primitive whose external convention folds
    /// "timed out" into its ordinary return value rather than an error.
    pub fn event_group_wait(&self, group: EventGroupId, mask: u32, wait: WaitFlags, timeout: Timeout) -> KernelResult<u32> {
        let all = wait.contains(WaitFlags::ALL);
        let clear = wait.contains(WaitFlags::CLEAR);
        let mut cs = self.turnstile().enter();
        match cs.event_group_try_wait(group, mask, all, clear) {
            Ok(Some(flags)) => Ok(flags),
            Ok(None) => {
                if timeout == 0 {
                    return Ok(0);
                }
                let id = self.current_id()?;
                if let Err(e) = cs.event_group_enqueue_waiter(group, id) {
                    return log_and_return(e);
                }
                let object = BlockObject::Event { group, mask, all, clear };
                if let Err(e) = cs.block_current(id, BlockReason::Event, object) {
                    return log_and_return(e);
                }
                match self.park_for(id, timeout, cs) {
                    Ok(()) => {
                        let mut cs = self.turnstile().enter();
                        cs.task_mut(id)
                            .ok()
                            .and_then(|t| t.pending_event_flags.take())
                            .ok_or(KernelError::Destroyed)
                            .or_else(log_and_return)
                    }
                    Err(KernelError::Timeout) => Ok(0),
                    Err(e) => log_and_return(e),
                }
            }
            Err(e) => log_and_return(e),
        }
    }

    pub fn event_group_delete(&self, group: EventGroupId) -> KernelResult<()> {
        let mut cs = self.turnstile().enter();
        match cs.event_group_delete(group) {
            Ok(waiters) => {
                for w in waiters {
                    cs.wake_blocked(w, WakeReason::Destroyed);
                }
                cs.context_switch_target();
                cs.notify_all();
                Ok(())
            }
            Err(e) => log_and_return(e),
        }
    }

    // ---- scheduler control ---------------------------------------------

    pub fn scheduler_lock(&self) {
        self.turnstile().enter().scheduler_lock();
    }

    pub fn scheduler_unlock(&self) {
        let mut cs = self.turnstile().enter();
        if cs.scheduler_unlock() {
            cs.context_switch_target();
            cs.notify_all();
        }
    }

    pub fn scheduler_get_stats(&self) -> SchedulerStats {
        self.turnstile().enter().scheduler_stats()
    }

    pub fn scheduler_reset_stats(&self) {
        let mut cs = self.turnstile().enter();
        cs.sched.idle_ticks = 0;
        cs.sched.context_switches = 0;
        cs.sched.deadline_misses = 0;
    }

    pub fn scheduler_set_policy(&self, policy: SchedPolicy) {
        let mut cs = self.turnstile().enter();
        cs.sched.policy = policy;
        cs.context_switch_target();
        cs.notify_all();
    }

    pub fn scheduler_get_policy(&self) -> SchedPolicy {
        self.turnstile().enter().sched.policy
    }

    /// Scan every periodic task for a missed deadline. Does not wake or
    /// reschedule anything; purely diagnostic.
    pub fn check_deadlines(&self) -> u32 {
        self.turnstile().enter().check_deadlines()
    }
}
