//! The scheduler: ready/blocked/suspended lists, the four selection
//! policies, and the tick handler.
use std::collections::VecDeque;
use std::fmt;

use crate::kernel::KernelState;
use crate::task::{BlockReason, TaskId, TaskState, WakeReason};
use crate::time::{wrapping_at_or_before, wrapping_before, Tick};

/// The four task-selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// Strict priority: the head of the highest non-empty priority class
    /// runs; ties within a class are FIFO.
    Priority,
    /// Like `Priority`, but the selected task rotates to the tail of its
    /// class on every selection, realizing round-robin within a class when
    /// combined with tick-driven slice expiry.
    RoundRobin,
    /// Earliest Deadline First: among ready periodic tasks, the one with
    /// the smallest `absolute_deadline` runs; falls back to `Priority` when
    /// no periodic task is ready.
    Edf,
    /// Rate Monotonic Scheduling: runtime-identical to `Priority` — the
    /// caller is expected to assign priorities inversely proportional to
    /// period.
    Rms,
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Priority => "PRIORITY",
            Self::RoundRobin => "RR",
            Self::Edf => "EDF",
            Self::Rms => "RMS",
        };
        f.write_str(s)
    }
}

/// Scheduler-owned state: queues, policy, the tick counter, the two
/// nesting counters (distinct from the critical section's own nesting,
/// tracked separately in [`KernelState::cs_depth`]).
pub(crate) struct SchedState {
    pub(crate) ready: Vec<VecDeque<TaskId>>,
    pub(crate) blocked: VecDeque<TaskId>,
    pub(crate) suspended: VecDeque<TaskId>,
    pub(crate) policy: SchedPolicy,
    pub(crate) current: Option<TaskId>,
    pub(crate) idle_task: Option<TaskId>,
    pub(crate) lock_depth: u32,
    pub(crate) pending_switch: bool,
    pub(crate) time: Tick,
    pub(crate) started: bool,
    pub(crate) idle_ticks: u64,
    pub(crate) context_switches: u64,
    pub(crate) deadline_misses: u64,
}

impl SchedState {
    pub(crate) fn new(p_max: u8, policy: SchedPolicy) -> Self {
        Self {
            ready: (0..p_max).map(|_| VecDeque::new()).collect(),
            blocked: VecDeque::new(),
            suspended: VecDeque::new(),
            policy,
            current: None,
            idle_task: None,
            lock_depth: 0,
            pending_switch: false,
            time: 0,
            started: false,
            idle_ticks: 0,
            context_switches: 0,
            deadline_misses: 0,
        }
    }
}

/// Aggregate scheduler statistics exposed to callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub idle_ticks: u64,
    pub context_switches: u64,
    pub deadline_misses: u64,
}

impl KernelState {
    /// Choose the next task to run without removing it from any list.
    /// Returns the idle task if nothing else is ready.
    pub(crate) fn select_next(&self) -> TaskId {
        match self.sched.policy {
            SchedPolicy::Priority | SchedPolicy::Rms | SchedPolicy::RoundRobin => {
                for q in &self.sched.ready {
                    if let Some(&t) = q.front() {
                        return t;
                    }
                }
            }
            SchedPolicy::Edf => {
                let mut best: Option<(Tick, TaskId)> = None;
                for q in &self.sched.ready {
                    for &id in q {
                        if let Ok(task) = self.task(id) {
                            if task.period > 0 {
                                let better = match best {
                                    None => true,
                                    Some((d, _)) => wrapping_before(task.absolute_deadline, d),
                                };
                                if better {
                                    best = Some((task.absolute_deadline, id));
                                }
                            }
                        }
                    }
                }
                if let Some((_, id)) = best {
                    return id;
                }
                for q in &self.sched.ready {
                    if let Some(&t) = q.front() {
                        return t;
                    }
                }
            }
        }
        self.sched
            .idle_task
            .expect("idle task must exist from init to teardown")
    }

    /// Pop the chosen task out of its ready-queue slot. Rotation to the
    /// tail of the class (round-robin's half of the selection rule) falls
    /// out naturally from `context_switch_target` always re-appending the
    /// outgoing `Running` task to the back of its class when it is later
    /// preempted, combined with `select_next` always taking the front —
    /// the standard round-robin queue discipline.
    fn pop_selected(&mut self, id: TaskId) {
        let priority = self.task(id).map(|t| t.priority).unwrap_or(0);
        let is_idle = self.task(id).map(|t| t.is_idle).unwrap_or(false);
        if is_idle {
            return;
        }
        let q = self.ready_queue_for(priority);
        if let Some(pos) = q.iter().position(|&t| t == id) {
            q.remove(pos);
        }
    }

    /// `context_switch()`: select the next task and hand control to it.
    /// Returns the task that is now `Running` (which may be the same task
    /// that was already running, in which case no actual thread handoff
    /// happens).
    pub(crate) fn context_switch_target(&mut self) -> Option<TaskId> {
        if !self.sched.started {
            return None;
        }
        if self.sched.lock_depth > 0 {
            self.sched.pending_switch = true;
            return None;
        }
        let next = self.select_next();
        let prev = self.sched.current;
        if prev == Some(next) {
            return None;
        }
        if let Some(prev_id) = prev {
            if let Ok(task) = self.task_mut(prev_id) {
                if task.state == TaskState::Running {
                    task.state = TaskState::Ready;
                    let priority = task.priority;
                    let is_idle = task.is_idle;
                    if !is_idle {
                        self.ready_queue_for(priority).push_back(prev_id);
                    }
                }
                self.account_runtime(prev_id);
            }
        }
        self.pop_selected(next);
        if let Ok(task) = self.task_mut(next) {
            task.state = TaskState::Running;
            task.stats.last_start = self.sched.time;
            task.stats.activations += 1;
            task.burst_start = self.sched.time;
            task.slice_remaining = task.time_slice;
        }
        self.sched.current = Some(next);
        self.sched.context_switches += 1;
        Some(next)
    }

    fn account_runtime(&mut self, id: TaskId) {
        if let Ok(task) = self.task_mut(id) {
            let burst = self.sched.time.wrapping_sub(task.burst_start) as u64;
            task.stats.runtime_ticks += burst;
            task.stats.max_burst_ticks = task.stats.max_burst_ticks.max(burst as u32);
            if task.is_idle {
                self.sched.idle_ticks += burst;
            }
        }
    }

    /// `block_task`: refuses the idle task (I2: "never in the blocked or
    /// suspended list").
    pub(crate) fn block_current(
        &mut self,
        id: TaskId,
        reason: BlockReason,
        object: crate::task::BlockObject,
    ) -> Result<(), crate::error::KernelError> {
        if self.task(id)?.is_idle {
            return Err(crate::error::KernelError::Protocol(
                crate::error::ProtocolError::IdleTaskNotSuspendable,
            ));
        }
        let task = self.task_mut(id)?;
        task.state = TaskState::Blocked;
        task.block_reason = reason;
        task.block_object = object;
        self.sched.blocked.push_back(id);
        Ok(())
    }

    /// `unblock_task`: no-op if not `Blocked`.
    pub(crate) fn unblock(&mut self, id: TaskId) {
        if let Ok(task) = self.task(id) {
            if task.state != TaskState::Blocked {
                return;
            }
        } else {
            return;
        }
        self.sched.blocked.retain(|&t| t != id);
        let priority = {
            let task = self.task_mut(id).unwrap();
            task.state = TaskState::Ready;
            task.block_reason = BlockReason::None;
            task.block_object = crate::task::BlockObject::None;
            task.priority
        };
        self.ready_queue_for(priority).push_back(id);
    }

    /// The tick handler: releases due delays and periodic jobs, then
    /// accounts round-robin slice expiry, then switches if warranted.
    /// Returns `true` if a context switch should now be performed (the
    /// actual thread handoff is driven by `Kernel::tick`, which holds the
    /// turnstile).
    pub(crate) fn tick_internal(&mut self) -> bool {
        self.sched.time = self.sched.time.wrapping_add(1);
        let now = self.sched.time;

        if let Some(cur) = self.sched.current {
            if self.task(cur).map(|t| t.is_idle).unwrap_or(false) {
                self.sched.idle_ticks += 1;
            }
        }

        let mut woke_any = false;

        let due: Vec<(TaskId, BlockReason)> = self
            .sched
            .blocked
            .iter()
            .copied()
            .filter_map(|id| {
                self.task(id).ok().and_then(|t| {
                    t.wait_deadline
                        .filter(|&d| wrapping_at_or_before(d, now))
                        .map(|_| (id, t.block_reason))
                })
            })
            .collect();
        for (id, reason) in due {
            let wake = if reason == BlockReason::Delay {
                WakeReason::Given
            } else {
                WakeReason::TimedOut
            };
            self.wake_blocked(id, wake);
            woke_any = true;
        }

        let periodic_ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.period > 0 && t.state != TaskState::Terminated)
            .map(|(i, _)| TaskId(i))
            .collect();
        for id in periodic_ids {
            let (due, was_outstanding) = {
                let t = self.task(id).unwrap();
                (wrapping_at_or_before(t.next_release, now), t.job_outstanding)
            };
            if !due {
                continue;
            }
            if was_outstanding {
                self.sched.deadline_misses += 1;
                let t = self.task_mut(id).unwrap();
                t.stats.deadline_misses += 1;
            }
            let t = self.task_mut(id).unwrap();
            t.next_release = t.next_release.wrapping_add(t.period);
            t.absolute_deadline = t.next_release.wrapping_add(t.deadline);
            t.job_outstanding = true;
            // A task still `Blocked` on an IPC wait at release time (an
            // overrunning job) is left alone: it already counted as a
            // deadline miss above, and it owns whatever waiter-list entry
            // it holds until that wait resolves on its own terms.
            if t.state == TaskState::Suspended {
                self.sched.suspended.retain(|&x| x != id);
                let priority = t.priority;
                self.task_mut(id).unwrap().state = TaskState::Ready;
                self.ready_queue_for(priority).push_back(id);
                woke_any = true;
            }
        }

        let mut slice_elapsed = false;
        if self.sched.policy == SchedPolicy::RoundRobin {
            if let Some(cur) = self.sched.current {
                if let Ok(task) = self.task_mut(cur) {
                    if !task.is_idle && task.state == TaskState::Running {
                        if task.slice_remaining > 0 {
                            task.slice_remaining -= 1;
                        }
                        if task.slice_remaining == 0 {
                            task.slice_remaining = task.time_slice;
                            slice_elapsed = true;
                        }
                    }
                }
            }
        }

        (woke_any || slice_elapsed) && self.sched.lock_depth == 0
    }

    /// `check_deadlines()`: scan periodic tasks for missed deadlines.
    pub(crate) fn check_deadlines(&mut self) -> u32 {
        let now = self.sched.time;
        let mut count = 0u32;
        let ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.period > 0 && t.state != TaskState::Terminated)
            .map(|(i, _)| TaskId(i))
            .collect();
        for id in ids {
            let t = self.task_mut(id).unwrap();
            if wrapping_before(t.absolute_deadline, now) && t.job_outstanding {
                t.stats.deadline_misses += 1;
                count += 1;
            }
        }
        self.sched.deadline_misses += count as u64;
        count
    }

    pub(crate) fn scheduler_lock(&mut self) {
        self.sched.lock_depth += 1;
    }

    /// Returns `true` if a previously-suppressed switch should now run.
    pub(crate) fn scheduler_unlock(&mut self) -> bool {
        if self.sched.lock_depth > 0 {
            self.sched.lock_depth -= 1;
        }
        if self.sched.lock_depth == 0 && self.sched.pending_switch {
            self.sched.pending_switch = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn scheduler_stats(&self) -> SchedulerStats {
        SchedulerStats {
            idle_ticks: self.sched.idle_ticks,
            context_switches: self.sched.context_switches,
            deadline_misses: self.sched.deadline_misses,
        }
    }
}
