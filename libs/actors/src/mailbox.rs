//! Mailbox
//!
//! A mailbox owns an [`Inbox`], the outbound send buffers of the messages its
//! actors issue, and the handler scope of the message being evaluated. It
//! moves through `Idle -> Running -> (Idle | Closed)`:
//!
//! - Adding work to an idle mailbox claims it (one compare-and-swap) and hands
//!   it to the facility's scheduler, so no two threads ever run one mailbox.
//! - `run` evaluates messages one at a time. When the inbox runs dry it
//!   flushes the send buffers, calls the idle callback, flushes again, and only
//!   returns once there is genuinely nothing left to do.
//! - `close` is terminal. Buffered messages bound for other facilities still
//!   go out; everything else is discarded, releasing foreign callers with an
//!   abandonment fault.
//!
//! # Lock Ordering
//!
//! No lock of a mailbox is held while user code runs or while another
//! mailbox is touched. Each of `send_buffer`, `turn` and `outstanding` is
//! taken on its own and released before values taken out of it are dropped.

use crate::error::{ActorError, Result};
use crate::facility::Facility;
use crate::handler::{panic_message, route_fault, ExceptionHandler, Frame, PendingResponse, Turn};
use crate::inbox::{Admission, Inbox};
use crate::message::{EventMessage, Message, MessageKind};
use crate::registry::MailboxId;

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Callback run when a mailbox's inbox runs dry
pub type IdleCallback = Arc<dyn Fn(&Mailbox) -> anyhow::Result<()> + Send + Sync>;

thread_local! {
    static ACTIVE: RefCell<Option<Mailbox>> = const { RefCell::new(None) };
}

/// Marks a mailbox as running on the current thread until dropped
struct ActiveGuard {
    previous: Option<Mailbox>,
}

impl ActiveGuard {
    fn enter(mailbox: &Mailbox) -> Self {
        let previous = ACTIVE.with(|active| active.borrow_mut().replace(mailbox.clone()));
        Self { previous }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

type SendBuffers = HashMap<MailboxId, (Mailbox, VecDeque<Message>)>;

pub(crate) struct MailboxInner {
    id: MailboxId,
    facility: Facility,
    inbox: Inbox,
    on_idle: Option<IdleCallback>,
    initial_buffer_size: usize,
    send_buffer: Mutex<SendBuffers>,
    turn: Mutex<Turn>,
    state: AtomicU8,
    outstanding: Mutex<HashMap<u64, Weak<dyn PendingResponse>>>,
    next_ticket: AtomicU64,
}

impl Drop for MailboxInner {
    fn drop(&mut self) {
        self.facility.registry().unregister(&self.id);
    }
}

/// Cloneable handle to a mailbox
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

impl Mailbox {
    pub(crate) fn from_inner(inner: Arc<MailboxInner>) -> Self {
        Self { inner }
    }

    /// Mailbox running on the current thread, if any
    pub fn active() -> Option<Mailbox> {
        ACTIVE.with(|active| active.borrow().clone())
    }

    /// True when this mailbox is running on the current thread
    pub fn is_active_on_current_thread(&self) -> bool {
        ACTIVE.with(|active| {
            active
                .borrow()
                .as_ref()
                .is_some_and(|mailbox| Arc::ptr_eq(&mailbox.inner, &self.inner))
        })
    }

    pub fn id(&self) -> MailboxId {
        self.inner.id
    }

    pub fn facility(&self) -> &Facility {
        &self.inner.facility
    }

    pub fn admission(&self) -> Admission {
        self.inner.inbox.admission()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CLOSED
    }

    pub fn has_work(&self) -> bool {
        self.inner.inbox.has_work()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.inbox.is_idle()
    }

    /// Kind of the message being evaluated, `None` between messages
    pub fn current_message(&self) -> Option<MessageKind> {
        self.inner.turn.lock().current
    }

    /// Deliver a one-way operation straight into this mailbox's inbox
    pub fn signal<F>(&self, operation: F)
    where
        F: FnOnce(&Mailbox) -> anyhow::Result<()> + Send + 'static,
    {
        let message = Message::Event(EventMessage::new(operation));
        self.unbuffered_add_message(message, self.is_active_on_current_thread());
    }

    // ===== Exception handlers =====

    /// Handler installed for the current message, if any
    pub fn exception_handler(&self) -> Option<ExceptionHandler> {
        self.inner.turn.lock().frame.handler.clone()
    }

    /// Install a handler for the rest of the current message's processing,
    /// returning the one it replaces
    pub fn set_exception_handler<F>(&self, handler: F) -> Result<Option<ExceptionHandler>>
    where
        F: Fn(anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.replace_exception_handler(Some(Arc::new(handler)))
    }

    /// Swap the current handler, e.g. to restore one returned earlier
    pub fn replace_exception_handler(
        &self,
        handler: Option<ExceptionHandler>,
    ) -> Result<Option<ExceptionHandler>> {
        if !self.is_active_on_current_thread() {
            return Err(ActorError::HandlerOutsideMessage);
        }
        let mut turn = self.inner.turn.lock();
        if turn.current.is_none() {
            return Err(ActorError::HandlerOutsideMessage);
        }
        Ok(std::mem::replace(&mut turn.frame.handler, handler))
    }

    pub fn clear_exception_handler(&self) -> Result<Option<ExceptionHandler>> {
        self.replace_exception_handler(None)
    }

    // ===== Delivery =====

    /// Insert a message directly into the inbox. Once the facility is
    /// closing, or this mailbox closed, the message is discarded instead.
    pub fn unbuffered_add_message(&self, message: Message, local: bool) {
        if self.rejects_messages() {
            self.discard(message);
            return;
        }
        self.inner.inbox.offer(message, local);
        self.after_add();
    }

    /// Insert a batch in order; see [`Mailbox::unbuffered_add_message`]
    pub fn unbuffered_add_messages(&self, messages: VecDeque<Message>, local: bool) {
        if messages.is_empty() {
            return;
        }
        if self.rejects_messages() {
            messages.into_iter().for_each(|message| self.discard(message));
            return;
        }
        self.inner.inbox.offer_all(messages, local);
        self.after_add();
    }

    /// Queue a message for `target` until this mailbox's next flush. Hands
    /// the message back when it must be delivered directly instead.
    pub(crate) fn buffer(&self, message: Message, target: &Mailbox) -> std::result::Result<(), Message> {
        if self.rejects_messages() {
            return Err(message);
        }
        let mut buffers = self.inner.send_buffer.lock();
        let (_, queue) = buffers.entry(target.id()).or_insert_with(|| {
            (
                target.clone(),
                VecDeque::with_capacity(self.inner.initial_buffer_size),
            )
        });
        queue.push_back(message);
        Ok(())
    }

    fn rejects_messages(&self) -> bool {
        self.inner.facility.is_closing() || self.is_closed()
    }

    fn after_add(&self) {
        if self.is_closed() {
            // Raced with close: nothing may stay behind in the inbox
            self.inner
                .inbox
                .drain()
                .into_iter()
                .for_each(|message| self.discard(message));
            return;
        }
        if self
            .inner
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.inner.facility.scheduler().schedule(self.clone());
        }
    }

    fn discard(&self, message: Message) {
        let metrics = self.inner.facility.metrics();
        if message.is_foreign() && message.is_response_pending() {
            metrics.record_abandoned();
            message.close();
        } else {
            metrics.record_dropped();
            trace!(mailbox = %self.id(), kind = %message.kind(), "Dropping message");
        }
    }

    // ===== Processing =====

    /// Evaluate messages until the mailbox is idle. Called by the scheduler
    /// after it was handed this mailbox.
    pub fn run(&self) {
        if self.is_closed() {
            return;
        }

        let active = ActiveGuard::enter(self);
        loop {
            if self.is_closed() {
                break;
            }
            match self.inner.inbox.poll() {
                Some(message) if self.is_closed() => self.discard(message),
                Some(message) => self.evaluate(message),
                None => {
                    self.flush();
                    self.notify_idle();
                    self.flush();
                    if !self.inner.inbox.has_work() {
                        break;
                    }
                }
            }
        }
        drop(active);

        let released = self
            .inner
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        // Work offered between the last poll and the release
        if released && self.has_work() {
            self.after_add();
        }
    }

    fn evaluate(&self, message: Message) {
        let kind = message.kind();
        let metrics = self.inner.facility.metrics();
        metrics.record_evaluated(kind);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| message.eval(self)));
        if let Err(payload) = outcome {
            metrics.record_panic();
            let fault = anyhow::anyhow!(
                "panic while evaluating {}: {}",
                kind,
                panic_message(payload.as_ref())
            );
            route_fault(self, fault);
        }
        self.end_turn();
    }

    fn notify_idle(&self) {
        let Some(callback) = self.inner.on_idle.clone() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| callback(self))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(mailbox = %self.id(), "Idle callback failed: {:#}", e);
            }
            Err(payload) => {
                self.inner.facility.metrics().record_panic();
                error!(
                    mailbox = %self.id(),
                    "Idle callback panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    /// Deliver every send buffer, FIFO per destination
    fn flush(&self) {
        let buffers = std::mem::take(&mut *self.inner.send_buffer.lock());
        for (_, (target, messages)) in buffers {
            debug!(
                mailbox = %self.id(),
                target = %target.id(),
                count = messages.len(),
                "Flushing send buffer"
            );
            let local = target.is_active_on_current_thread();
            target.unbuffered_add_messages(messages, local);
        }
    }

    // ===== Shutdown =====

    /// Close the mailbox. Buffered messages bound for other facilities are
    /// delivered; all other held messages are discarded and requests still
    /// in progress for foreign callers are abandoned.
    pub fn close(&self) {
        if self.inner.state.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return;
        }
        debug!(mailbox = %self.id(), "Closing mailbox");
        self.inner.facility.metrics().record_mailbox_closed();

        let buffers = std::mem::take(&mut *self.inner.send_buffer.lock());
        for (_, (target, messages)) in buffers {
            if target.facility().same_as(&self.inner.facility) {
                messages.into_iter().for_each(|message| self.discard(message));
            } else {
                target.unbuffered_add_messages(messages, false);
            }
        }

        for message in self.inner.inbox.drain() {
            self.discard(message);
        }

        let outstanding = std::mem::take(&mut *self.inner.outstanding.lock());
        for pending in outstanding.into_values().filter_map(|weak| weak.upgrade()) {
            if pending.is_pending() {
                self.inner.facility.metrics().record_abandoned();
                pending.abandon();
            }
        }
    }

    // ===== Turn bookkeeping =====

    pub(crate) fn begin_turn(&self, kind: MessageKind, frame: Frame) {
        let previous = std::mem::replace(
            &mut *self.inner.turn.lock(),
            Turn {
                current: Some(kind),
                frame,
            },
        );
        drop(previous);
    }

    pub(crate) fn end_turn(&self) {
        let previous = std::mem::take(&mut *self.inner.turn.lock());
        drop(previous);
    }

    /// Handler scope to restore when a response to a request sent now arrives
    pub(crate) fn capture_frame(&self) -> Frame {
        self.inner.turn.lock().frame.clone()
    }

    pub(crate) fn frame_parts(&self) -> (Option<ExceptionHandler>, Option<Arc<dyn PendingResponse>>) {
        let turn = self.inner.turn.lock();
        (turn.frame.handler.clone(), turn.frame.sink.clone())
    }

    pub(crate) fn request_begin(&self) {
        self.inner.inbox.request_begin();
    }

    pub(crate) fn request_end(&self) {
        self.inner.inbox.request_end();
        if self.has_work() {
            self.after_add();
        }
    }

    pub(crate) fn next_ticket(&self) -> u64 {
        self.inner.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Remember a request in progress for a foreign caller, to abandon on close
    pub(crate) fn track_outstanding(&self, ticket: u64, pending: Weak<dyn PendingResponse>) {
        self.inner.outstanding.lock().insert(ticket, pending);

        if self.is_closed() {
            let raced = self.inner.outstanding.lock().remove(&ticket);
            if let Some(pending) = raced.and_then(|weak| weak.upgrade()) {
                pending.abandon();
            }
        }
    }

    pub(crate) fn forget_outstanding(&self, ticket: u64) {
        let removed = self.inner.outstanding.lock().remove(&ticket);
        drop(removed);
    }
}

impl PartialEq for Mailbox {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Mailbox {}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .field("inbox", &self.inner.inbox)
            .finish()
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.id, f)
    }
}

/// Builder for mailboxes with non-default policies
pub struct MailboxBuilder {
    facility: Facility,
    admission: Admission,
    on_idle: Option<IdleCallback>,
    initial_buffer_size: usize,
    initial_local_queue_size: usize,
}

impl MailboxBuilder {
    pub(crate) fn new(facility: Facility) -> Self {
        let config = facility.config();
        Self {
            initial_buffer_size: config.initial_buffer_size,
            initial_local_queue_size: config.initial_local_queue_size,
            facility,
            admission: Admission::Fifo,
            on_idle: None,
        }
    }

    pub fn admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }

    /// Process one request at a time
    pub fn atomic(self) -> Self {
        self.admission(Admission::Atomic)
    }

    /// Run `callback` on the mailbox's own turn whenever its inbox runs dry
    pub fn on_idle<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Mailbox) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_idle = Some(Arc::new(callback));
        self
    }

    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    pub fn initial_local_queue_size(mut self, size: usize) -> Self {
        self.initial_local_queue_size = size;
        self
    }

    /// Create the mailbox. A mailbox built while its facility is closing
    /// starts out closed.
    pub fn build(self) -> Mailbox {
        let id = MailboxId::new();
        let inner = Arc::new(MailboxInner {
            id,
            inbox: Inbox::new(self.admission, self.initial_local_queue_size),
            on_idle: self.on_idle,
            initial_buffer_size: self.initial_buffer_size,
            send_buffer: Mutex::new(HashMap::new()),
            turn: Mutex::new(Turn::default()),
            state: AtomicU8::new(IDLE),
            outstanding: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            facility: self.facility,
        });

        let facility = &inner.facility;
        facility.registry().register(id, &inner);
        facility.metrics().record_mailbox_created();
        debug!(mailbox = %id, facility = %facility.id(), admission = ?self.admission, "Created mailbox");

        if facility.is_closing() {
            inner.state.store(CLOSED, Ordering::Release);
        }
        Mailbox::from_inner(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use actors_config::FacilityConfig;

    /// Records scheduled mailboxes without running them
    #[derive(Default)]
    struct ManualScheduler {
        scheduled: Mutex<Vec<Mailbox>>,
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, mailbox: Mailbox) {
            self.scheduled.lock().push(mailbox);
        }

        fn shutdown(&self) {}
    }

    fn manual_facility() -> (Facility, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let facility = Facility::with_scheduler(FacilityConfig::default(), scheduler.clone());
        (facility, scheduler)
    }

    #[test]
    fn test_add_claims_idle_mailbox_once() {
        let (facility, scheduler) = manual_facility();
        let mailbox = facility.mailbox();

        mailbox.signal(|_| Ok(()));
        mailbox.signal(|_| Ok(()));

        assert!(mailbox.is_running());
        assert_eq!(scheduler.scheduled.lock().len(), 1);

        mailbox.run();
        assert!(!mailbox.is_running());
        assert!(mailbox.is_idle());
        assert_eq!(facility.metrics().snapshot().events_evaluated, 2);
    }

    #[test]
    fn test_current_message_only_during_turn() {
        let (facility, _scheduler) = manual_facility();
        let mailbox = facility.mailbox();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let record = seen.clone();
        mailbox.signal(move |mailbox| {
            let active = Mailbox::active().is_some_and(|active| &active == mailbox);
            record.lock().push((mailbox.current_message(), active));
            Ok(())
        });
        mailbox.run();

        assert_eq!(*seen.lock(), vec![(Some(MessageKind::Event), true)]);
        assert_eq!(mailbox.current_message(), None);
        assert!(Mailbox::active().is_none());
    }

    #[test]
    fn test_handler_outside_turn_is_rejected() {
        let (facility, _scheduler) = manual_facility();
        let mailbox = facility.mailbox();

        let result = mailbox.set_exception_handler(|_| Ok(()));
        assert!(matches!(result, Err(ActorError::HandlerOutsideMessage)));
    }

    #[test]
    fn test_idle_callback_runs_on_drain() {
        let (facility, _scheduler) = manual_facility();
        let idle = Arc::new(AtomicU64::new(0));
        let counter = idle.clone();
        let mailbox = facility
            .mailbox_builder()
            .on_idle(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build();

        mailbox.signal(|_| Ok(()));
        mailbox.run();
        assert_eq!(idle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_callback_work_keeps_mailbox_running() {
        let (facility, scheduler) = manual_facility();
        let idle = Arc::new(AtomicU64::new(0));
        let counter = idle.clone();
        let mailbox = facility
            .mailbox_builder()
            .on_idle(move |mailbox| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    mailbox.signal(|_| Ok(()));
                }
                Ok(())
            })
            .build();

        mailbox.signal(|_| Ok(()));
        mailbox.run();

        // The signalled event ran before the mailbox went idle, and the
        // callback ran again once it drained
        assert_eq!(facility.metrics().snapshot().events_evaluated, 2);
        assert_eq!(idle.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.scheduled.lock().len(), 1);
        assert!(!mailbox.is_running());
        assert!(!mailbox.has_work());
    }

    #[test]
    fn test_builder_sets_admission() {
        let (facility, _scheduler) = manual_facility();
        assert_eq!(facility.mailbox().admission(), Admission::Fifo);
        assert_eq!(facility.atomic_mailbox().admission(), Admission::Atomic);
        assert_eq!(
            facility.mailbox_builder().atomic().build().admission(),
            Admission::Atomic
        );
    }

    #[test]
    fn test_closed_mailbox_drops_new_messages() {
        let (facility, scheduler) = manual_facility();
        let mailbox = facility.mailbox();
        mailbox.close();
        assert!(mailbox.is_closed());

        mailbox.signal(|_| Ok(()));
        assert!(!mailbox.has_work());
        assert!(scheduler.scheduled.lock().is_empty());
        assert_eq!(facility.metrics().snapshot().messages_dropped, 1);
    }

    #[test]
    fn test_panicking_event_is_contained() {
        let (facility, _scheduler) = manual_facility();
        let mailbox = facility.mailbox();
        let after = Arc::new(AtomicU64::new(0));

        mailbox.signal(|_| panic!("event blew up"));
        let counter = after.clone();
        mailbox.signal(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        mailbox.run();

        assert_eq!(after.load(Ordering::SeqCst), 1);
        let snapshot = facility.metrics().snapshot();
        assert_eq!(snapshot.panics_caught, 1);
        assert_eq!(snapshot.faults_unhandled, 1);
    }
}
