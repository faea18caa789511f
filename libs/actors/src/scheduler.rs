//! Scheduling
//!
//! The scheduler is told a mailbox has work and eventually calls its `run`
//! method on some thread. A mailbox is only handed over after it has been
//! claimed, so the scheduler never sees one mailbox twice at once.

use crate::error::{ActorError, Result};
use crate::handler::panic_message;
use crate::mailbox::Mailbox;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, error, warn};

/// Executes claimed mailboxes
pub trait Scheduler: Send + Sync {
    /// Eventually call `mailbox.run()` on some thread
    fn schedule(&self, mailbox: Mailbox);

    /// Stop accepting mailboxes and release worker threads
    fn shutdown(&self);
}

/// Fixed-size pool of worker threads fed by one shared queue
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Mailbox>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn `thread_count` workers named `{prefix}-{index}`
    pub fn new(thread_count: usize, prefix: &str) -> Result<Self> {
        if thread_count == 0 {
            return Err(ActorError::configuration("thread_count must be at least 1"));
        }

        let (sender, receiver) = unbounded::<Mailbox>();
        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let name = format!("{}-{}", prefix, index);
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(receiver));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Dropping the sender stops the workers already started
                    drop(sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(ActorError::scheduler(format!(
                        "Failed to spawn worker {}: {}",
                        name, e
                    )));
                }
            }
        }

        debug!(thread_count, prefix, "Started thread pool");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn thread_count(&self) -> usize {
        self.workers.lock().len()
    }
}

fn run_worker(receiver: Receiver<Mailbox>) {
    let name = thread::current().name().unwrap_or("worker").to_string();
    debug!(worker = %name, "Worker starting");

    for mailbox in receiver.iter() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| mailbox.run())) {
            error!(
                worker = %name,
                mailbox = %mailbox.id(),
                "Mailbox run panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    debug!(worker = %name, "Worker stopped");
}

impl Scheduler for ThreadPool {
    fn schedule(&self, mailbox: Mailbox) {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(mailbox).is_err() {
                    warn!("Thread pool workers are gone, mailbox not scheduled");
                }
            }
            None => debug!(mailbox = %mailbox.id(), "Thread pool shut down, mailbox not scheduled"),
        }
    }

    fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            // A worker closing its own facility cannot wait for itself
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers exit once the queue disconnects; nothing to join here
        self.sender.get_mut().take();
    }
}
