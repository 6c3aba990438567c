//! Bounded ring-buffer message queues with a rendezvous fast path.
use std::collections::VecDeque;

use crate::error::KernelError;
use crate::kernel::KernelState;
use crate::task::TaskId;

/// Opaque handle to a queue. Stable for the queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub(crate) usize);

pub(crate) struct QueueObj {
    pub(crate) buffer: VecDeque<Vec<u8>>,
    pub(crate) msg_size: usize,
    pub(crate) capacity: usize,
    pub(crate) waiting_send: VecDeque<TaskId>,
    pub(crate) waiting_recv: VecDeque<TaskId>,
}

pub(crate) enum SendOutcome {
    Enqueued,
    /// Handed directly to a parked receiver; no buffer slot was used.
    HandedOff(TaskId),
    /// Full buffer, no parked receiver. Hands the message back so the
    /// caller can stash it on the blocking sender's TCB.
    WouldBlock(Vec<u8>),
}

pub(crate) enum RecvOutcome {
    Received(Vec<u8>),
    WouldBlock,
}

impl KernelState {
    pub(crate) fn queue(&self, id: QueueId) -> Result<&QueueObj, KernelError> {
        self.queues.get(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn queue_mut(&mut self, id: QueueId) -> Result<&mut QueueObj, KernelError> {
        self.queues.get_mut(id.0).ok_or(KernelError::BadId)
    }

    pub(crate) fn queue_create(&mut self, capacity: usize, msg_size: usize) -> Result<QueueId, KernelError> {
        if capacity == 0 || msg_size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if self.queues.len() >= self.config.max_queues {
            return Err(KernelError::Capacity);
        }
        let idx = self.queues.insert(QueueObj {
            buffer: VecDeque::with_capacity(capacity),
            msg_size,
            capacity,
            waiting_send: VecDeque::new(),
            waiting_recv: VecDeque::new(),
        });
        Ok(QueueId(idx))
    }

    /// Non-blocking send attempt. Rendezvous fast path: if a receiver is
    /// already parked, the message bypasses the ring buffer entirely and is
    /// handed straight to it.
    pub(crate) fn queue_try_send(&mut self, id: QueueId, msg: Vec<u8>) -> Result<SendOutcome, KernelError> {
        let q = self.queue(id)?;
        if msg.len() != q.msg_size {
            return Err(KernelError::InvalidArgument);
        }
        if let Some(&receiver) = self.queue(id)?.waiting_recv.front() {
            self.task_mut(receiver)?.pending_msg = Some(msg);
            let q = self.queue_mut(id)?;
            q.waiting_recv.pop_front();
            return Ok(SendOutcome::HandedOff(receiver));
        }
        let q = self.queue_mut(id)?;
        if q.buffer.len() < q.capacity {
            q.buffer.push_back(msg);
            Ok(SendOutcome::Enqueued)
        } else {
            Ok(SendOutcome::WouldBlock(msg))
        }
    }

    /// Non-blocking receive attempt. A buffered message takes priority over
    /// handing off to a parked sender so FIFO order across the fast and
    /// slow paths is preserved.
    pub(crate) fn queue_try_recv(&mut self, id: QueueId) -> Result<RecvOutcome, KernelError> {
        let q = self.queue_mut(id)?;
        if let Some(msg) = q.buffer.pop_front() {
            if let Some(sender) = q.waiting_send.pop_front() {
                if let Some(pending) = self.task_mut(sender)?.pending_msg.take() {
                    self.queue_mut(id)?.buffer.push_back(pending);
                }
            }
            return Ok(RecvOutcome::Received(msg));
        }
        if let Some(sender) = self.queue(id)?.waiting_send.front().copied() {
            if let Some(pending) = self.task_mut(sender)?.pending_msg.take() {
                self.queue_mut(id)?.waiting_send.pop_front();
                return Ok(RecvOutcome::Received(pending));
            }
        }
        Ok(RecvOutcome::WouldBlock)
    }

    pub(crate) fn queue_enqueue_sender(&mut self, id: QueueId, task: TaskId) -> Result<(), KernelError> {
        self.queue_mut(id)?.waiting_send.push_back(task);
        Ok(())
    }

    pub(crate) fn queue_enqueue_receiver(&mut self, id: QueueId, task: TaskId) -> Result<(), KernelError> {
        self.queue_mut(id)?.waiting_recv.push_back(task);
        Ok(())
    }

    pub(crate) fn queue_remove_sender(&mut self, id: QueueId, task: TaskId) {
        if let Ok(q) = self.queue_mut(id) {
            q.waiting_send.retain(|&t| t != task);
        }
    }

    pub(crate) fn queue_remove_receiver(&mut self, id: QueueId, task: TaskId) {
        if let Ok(q) = self.queue_mut(id) {
            q.waiting_recv.retain(|&t| t != task);
        }
    }

    pub(crate) fn queue_count(&self, id: QueueId) -> Result<usize, KernelError> {
        Ok(self.queue(id)?.buffer.len())
    }

    pub(crate) fn queue_peek(&self, id: QueueId) -> Result<Option<Vec<u8>>, KernelError> {
        Ok(self.queue(id)?.buffer.front().cloned())
    }

    /// `delete(queue)`: unblock every sender and receiver parked on it.
    pub(crate) fn queue_delete(&mut self, id: QueueId) -> Result<Vec<TaskId>, KernelError> {
        if !self.queues.contains(id.0) {
            return Err(KernelError::BadId);
        }
        let q = self.queues.remove(id.0);
        Ok(q.waiting_send.into_iter().chain(q.waiting_recv).collect())
    }
}
