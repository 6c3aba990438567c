//! Execution contexts, critical sections, and the cooperative switch
//! primitive.
//!
//! There are no real stacks or saved registers to juggle on a host
//! simulation. Each task body runs on its own `std::thread`; the turnstile
//! below ensures that at most one of those threads is ever allowed to run
//! kernel-visible task logic at a time, so progress never depends on
//! preemptive OS scheduling to interleave tasks correctly, without needing
//! raw stack-switching. The technique — real OS threads dispatched one at a
//! time by a cooperative scheduler — mirrors `r3_port_std`'s `ums` module
//! ("utterly inefficient cross-platform preemptive user-mode scheduling").
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::kernel::KernelState;
use crate::task::TaskId;

/// The turnstile: a mutex around all kernel-owned state plus a condvar used
/// to hand control between task threads.
///
/// Holding the mutex *is* the critical section: kernel data structures
/// (ready/blocked/suspended lists, IPC pools, the tick counter) are only
/// ever touched while it is held. Nesting is tracked by
/// [`KernelState::cs_depth`] purely for diagnostics (the real exclusion
/// already nests correctly because a second `lock()` from the same logical
/// caller never happens — callers always go through [`Turnstile::enter`]).
pub(crate) struct Turnstile {
    state: Mutex<KernelState>,
    cvar: Condvar,
}

/// RAII critical-section guard. An `enter_critical()` / `exit_critical()`
/// pair becomes acquiring and dropping one of these — the same translation
/// `r3_kernel`'s `klock::lock_cpu` makes from "disable/restore interrupt
/// state" to a guard type.
pub(crate) struct CsGuard<'k> {
    guard: MutexGuard<'k, KernelState>,
    cvar: &'k Condvar,
}

impl Turnstile {
    pub(crate) fn new(state: KernelState) -> Self {
        Self {
            state: Mutex::new(state),
            cvar: Condvar::new(),
        }
    }

    /// Enter the critical section, incrementing the nesting depth.
    pub(crate) fn enter(&self) -> CsGuard<'_> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.cs_depth += 1;
        CsGuard {
            guard,
            cvar: &self.cvar,
        }
    }
}

impl<'k> CsGuard<'k> {
    /// Reassign the turnstile's current task and wake every parked thread.
    /// This is the "resume `to`" half of `switch_context(from, to)`.
    pub(crate) fn dispatch(&mut self, to: TaskId) {
        self.sched.current = Some(to);
        self.cvar.notify_all();
    }

    /// Block the calling thread (releasing the critical section) until the
    /// turnstile's current task is `me` again. This is the "save `from`,
    /// suspend until resumed" half of `switch_context(from, to)` — realized
    /// with `Condvar::wait_while`, which atomically releases the mutex,
    /// parks, and reacquires the mutex before returning, exactly matching
    /// "exit_critical... paired... via a symmetric return from the saving
    /// call."
    pub(crate) fn wait_until_current(mut self, me: TaskId) -> Self {
        self.guard = self
            .cvar
            .wait_while(self.guard, |s| s.sched.current != Some(me))
            .unwrap_or_else(|e| e.into_inner());
        self
    }

    /// Block the calling thread until `pred` holds, re-checking on every
    /// wakeup. Used by blocking IPC calls and `task_delay` to park a task
    /// that has just been moved onto a wait list, without assuming it will
    /// be the very next task dispatched.
    pub(crate) fn wait_while(mut self, mut pred: impl FnMut(&KernelState) -> bool) -> Self {
        self.guard = self
            .cvar
            .wait_while(self.guard, |s| pred(s))
            .unwrap_or_else(|e| e.into_inner());
        self
    }

    /// Wake every thread parked on the turnstile without changing whose
    /// turn it is. Used after mutating a wait list so a thread whose
    /// predicate in [`Self::wait_while`] just became true notices.
    pub(crate) fn notify_all(&self) {
        self.cvar.notify_all();
    }
}

impl<'k> std::ops::Deref for CsGuard<'k> {
    type Target = KernelState;
    fn deref(&self) -> &KernelState {
        &self.guard
    }
}

impl<'k> std::ops::DerefMut for CsGuard<'k> {
    fn deref_mut(&mut self) -> &mut KernelState {
        &mut self.guard
    }
}

impl Drop for CsGuard<'_> {
    fn drop(&mut self) {
        self.guard.cs_depth -= 1;
    }
}

thread_local! {
    /// The task owned by the current OS thread. Set once, when a task's
    /// worker thread starts, and never changed — this crate is one
    /// OS thread per task, not one thread multiplexing several tasks.
    static CURRENT_TASK: std::cell::Cell<Option<TaskId>> = const { std::cell::Cell::new(None) };
}

/// Record that the calling OS thread is now running as `task`.
pub(crate) fn bind_current_task(task: TaskId) {
    CURRENT_TASK.with(|c| c.set(Some(task)));
}

/// The task the calling OS thread is running as, if any. `None` on the
/// thread that constructed the [`crate::Kernel`] (or any other thread that
/// never had a task bound to it) — such a thread may still call `tick()`
/// and read-only introspection, but not task-relative operations like
/// `task_yield`.
pub(crate) fn current_task() -> Option<TaskId> {
    CURRENT_TASK.with(|c| c.get())
}
