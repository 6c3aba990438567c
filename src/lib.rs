//! A simulated real-time kernel.
//!
//! This crate reproduces the behavioral contracts of a small embedded RTOS
//! (ready/blocked/suspended task queues, four scheduling policies,
//! tick-driven periodic release, priority-inheriting mutexes, bounded
//! message queues with a rendezvous fast-path, and event flag groups) on
//! top of a host environment that has no real hardware interrupts. Progress
//! is driven entirely by calling [`Kernel::tick`] and by tasks calling back
//! into the kernel at cooperative suspension points — there is no
//! asynchronous preemption of arbitrary instructions.
//!
//! The entry point is [`Kernel`]: construct one with [`Config::default`],
//! create tasks on it, call [`Kernel::start`], and drive time forward with
//! [`Kernel::tick`].

pub mod config;
pub mod context;
pub mod error;
pub mod ipc;
pub mod kernel;
pub mod scheduler;
pub mod task;
pub mod time;

pub use config::{Config, MAX_TIMEOUT};
pub use error::{KernelError, KernelResult, ProtocolError};
pub use ipc::{EventGroupId, MutexId, QueueId, SemaphoreId, WaitFlags};
pub use kernel::Kernel;
pub use scheduler::{SchedPolicy, SchedulerStats};
pub use task::{TaskHandle, TaskOptions, TaskStats};
pub use time::{Tick, Timeout};
