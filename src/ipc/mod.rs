//! IPC objects: semaphores, priority-inheriting mutexes, bounded message
//! queues, and event flag groups. Each kind lives in its own
//! fixed-capacity `slab::Slab`, sized from [`crate::Config`]'s
//! `max_semaphores`/`max_queues` fields. Each handle type below is a `Copy`
//! newtype over a slab index, kept opaque to callers.

pub mod event_group;
pub mod mutex;
pub mod queue;
pub mod semaphore;

pub use event_group::{EventGroupId, WaitFlags};
pub use mutex::MutexId;
pub use queue::QueueId;
pub use semaphore::SemaphoreId;
