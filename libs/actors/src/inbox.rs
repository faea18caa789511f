//! Inbox
//!
//! Per-mailbox message queue. Messages offered by the thread currently
//! running the mailbox take the local fast path; every other thread goes
//! through a lock-free cross-thread channel. `poll` drains the local queue
//! before the cross-thread one.
//!
//! Under [`Admission::Atomic`] a request is only admitted while no other
//! request is in progress. Requests arriving meanwhile are parked in arrival
//! order and admitted ahead of newer messages once the in-progress count
//! returns to zero. Responses and events are always admitted.

use crate::message::Message;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

/// Request admission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Requests interleave freely with the responses of earlier requests
    #[default]
    Fifo,
    /// One request at a time, from evaluation until its response is sent
    Atomic,
}

pub struct Inbox {
    admission: Admission,
    local: Mutex<VecDeque<Message>>,
    deferred: Mutex<VecDeque<Message>>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    pending_requests: AtomicI64,
}

impl Inbox {
    pub fn new(admission: Admission, initial_local_queue_size: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            admission,
            local: Mutex::new(VecDeque::with_capacity(initial_local_queue_size)),
            deferred: Mutex::new(VecDeque::new()),
            sender,
            receiver,
            pending_requests: AtomicI64::new(0),
        }
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Enqueue one message. Never blocks.
    pub fn offer(&self, message: Message, local: bool) {
        if local {
            self.local.lock().push_back(message);
        } else {
            // Both channel ends live as long as the inbox
            let _ = self.sender.send(message);
        }
    }

    /// Enqueue a batch, preserving its order
    pub fn offer_all<I>(&self, messages: I, local: bool)
    where
        I: IntoIterator<Item = Message>,
    {
        if local {
            self.local.lock().extend(messages);
        } else {
            for message in messages {
                let _ = self.sender.send(message);
            }
        }
    }

    /// Next admissible message, or `None` when nothing can be evaluated now
    pub fn poll(&self) -> Option<Message> {
        if self.admits_requests() {
            if let Some(message) = self.deferred.lock().pop_front() {
                return Some(message);
            }
        }

        loop {
            let next = self.local.lock().pop_front();
            let message = match next {
                Some(message) => message,
                None => self.receiver.try_recv().ok()?,
            };

            if message.is_response_pending() && !self.admits_requests() {
                self.deferred.lock().push_back(message);
                continue;
            }
            return Some(message);
        }
    }

    /// True when `poll` may return a message
    pub fn has_work(&self) -> bool {
        !self.local.lock().is_empty()
            || !self.receiver.is_empty()
            || (self.admits_requests() && !self.deferred.lock().is_empty())
    }

    /// True when there is no work and no request is awaiting its response
    pub fn is_idle(&self) -> bool {
        !self.has_work() && self.pending_requests() <= 0
    }

    pub fn request_begin(&self) {
        self.pending_requests.fetch_add(1, Ordering::AcqRel);
    }

    pub fn request_end(&self) {
        self.pending_requests.fetch_sub(1, Ordering::AcqRel);
    }

    /// Requests evaluated but not yet answered
    pub fn pending_requests(&self) -> i64 {
        self.pending_requests.load(Ordering::Acquire)
    }

    /// Messages currently held, including deferred requests
    pub fn len(&self) -> usize {
        self.local.lock().len() + self.receiver.len() + self.deferred.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every held message, deferred requests first
    pub fn drain(&self) -> Vec<Message> {
        let mut drained: Vec<Message> = self.deferred.lock().drain(..).collect();
        drained.extend(self.local.lock().drain(..));
        drained.extend(self.receiver.try_iter());
        drained
    }

    fn admits_requests(&self) -> bool {
        self.admission == Admission::Fifo || self.pending_requests() <= 0
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("admission", &self.admission)
            .field("len", &self.len())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}
