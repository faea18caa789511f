//! Request/Response Protocol
//!
//! A [`Request`] is an operation bound to a target mailbox that produces one
//! value of type `T`. It is consumed in one of two ways:
//!
//! - [`Request::call`] from a thread outside every mailbox, blocking until the
//!   outcome arrives
//! - [`Request::send`] from the source mailbox's own turn, with a
//!   continuation run on that same mailbox when the response comes back
//!
//! The responder answers through a [`Transport`]. Every request gets exactly
//! one outcome: the value, a fault, or an abandonment fault when the target
//! closes first or the transport is dropped unanswered.

use crate::error::{ActorError, Result};
use crate::handler::{route_fault, Frame, PendingResponse};
use crate::mailbox::Mailbox;
use crate::message::{Message, MessageKind, PendingRequest, RequestMessage, ResponseMessage};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type Operation<T> = Box<dyn FnOnce(&Mailbox, Transport<T>) -> anyhow::Result<()> + Send>;
type Continuation<T> = Box<dyn FnOnce(T) -> anyhow::Result<()> + Send>;

/// Typed operation bound to a target mailbox
pub struct Request<T: Send + 'static> {
    target: Mailbox,
    operation: Operation<T>,
}

impl<T: Send + 'static> Request<T> {
    /// `operation` runs on the target's turn and must answer through the
    /// transport, now or later
    pub fn new<F>(target: &Mailbox, operation: F) -> Self
    where
        F: FnOnce(&Mailbox, Transport<T>) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            target: target.clone(),
            operation: Box::new(operation),
        }
    }

    pub fn target(&self) -> &Mailbox {
        &self.target
    }

    /// Issue the request and block until its outcome arrives.
    ///
    /// Fails immediately with [`ActorError::CallFromMailbox`] on a thread
    /// running any mailbox. A fault raised by the responder comes back as
    /// [`ActorError::Fault`], or as the runtime error it carried.
    pub fn call(self) -> Result<T> {
        if let Some(active) = Mailbox::active() {
            return Err(ActorError::call_from_mailbox(active.id()));
        }

        let (sender, receiver) = bounded(1);
        let target = self.target.clone();
        let envelope = RequestEnvelope {
            operation: self.operation,
            reply: Reply::new(Route::Caller(sender)),
            foreign: true,
        };
        trace!(target = %target.id(), "Calling mailbox");
        target.unbuffered_add_message(Message::Request(RequestMessage::new(Box::new(envelope))), false);

        match receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(fault)) => Err(ActorError::from_fault(fault)),
            Err(_) => Err(ActorError::Abandoned),
        }
    }

    /// Issue the request from `source`'s current turn. `continuation` runs
    /// on `source` with the value; a fault is raised on `source` instead,
    /// under the handler active now.
    pub fn send<F>(self, source: &Mailbox, continuation: F) -> Result<()>
    where
        F: FnOnce(T) -> anyhow::Result<()> + Send + 'static,
    {
        if !source.is_active_on_current_thread() {
            return Err(ActorError::not_processing(source.id()));
        }

        let route = Route::Continuation {
            source: source.clone(),
            frame: source.capture_frame(),
            continuation: Box::new(continuation),
        };
        let foreign = !source.facility().same_as(self.target.facility());
        let target = self.target.clone();
        let envelope = RequestEnvelope {
            operation: self.operation,
            reply: Reply::new(route),
            foreign,
        };
        let message = Message::Request(RequestMessage::new(Box::new(envelope)));

        if let Err(message) = source.buffer(message, &target) {
            target.unbuffered_add_message(message, target.is_active_on_current_thread());
        }
        Ok(())
    }

    /// Issue the request from `source`'s current turn and answer `transport`
    /// with its value
    pub fn forward(self, source: &Mailbox, transport: Transport<T>) -> Result<()> {
        self.send(source, move |value| {
            transport.respond(value)?;
            Ok(())
        })
    }
}

impl<T: Send + 'static> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("target", &self.target.id()).finish()
    }
}

enum Route<T> {
    /// A thread blocked in `call`
    Caller(Sender<anyhow::Result<T>>),
    /// A mailbox waiting to run a continuation
    Continuation {
        source: Mailbox,
        frame: Frame,
        continuation: Continuation<T>,
    },
}

/// Delivers exactly one outcome to the sender of a request. Dropping an
/// undelivered reply delivers an abandonment fault.
struct Reply<T: Send + 'static> {
    route: Option<Route<T>>,
}

impl<T: Send + 'static> Reply<T> {
    fn new(route: Route<T>) -> Self {
        Self { route: Some(route) }
    }

    fn complete(mut self, outcome: anyhow::Result<T>) {
        if let Some(route) = self.route.take() {
            deliver(route, outcome);
        }
    }
}

impl<T: Send + 'static> Drop for Reply<T> {
    fn drop(&mut self) {
        if let Some(route) = self.route.take() {
            deliver(route, Err(ActorError::Abandoned.into()));
        }
    }
}

fn deliver<T: Send + 'static>(route: Route<T>, outcome: anyhow::Result<T>) {
    match route {
        Route::Caller(sender) => {
            // The caller may have given up waiting
            let _ = sender.send(outcome);
        }
        Route::Continuation {
            source,
            frame,
            continuation,
        } => {
            let response = ResponseMessage::new(
                frame,
                Box::new(move || match outcome {
                    Ok(value) => continuation(value),
                    Err(fault) => Err(fault),
                }),
            );
            let local = source.is_active_on_current_thread();
            source.unbuffered_add_message(Message::Response(response), local);
        }
    }
}

struct RequestEnvelope<T: Send + 'static> {
    operation: Operation<T>,
    reply: Reply<T>,
    foreign: bool,
}

impl<T: Send + 'static> PendingRequest for RequestEnvelope<T> {
    fn is_foreign(&self) -> bool {
        self.foreign
    }

    fn eval(self: Box<Self>, mailbox: &Mailbox) {
        let RequestEnvelope {
            operation,
            reply,
            foreign,
        } = *self;
        let transport = Transport::open(mailbox, reply, foreign);
        mailbox.begin_turn(MessageKind::Request, Frame::for_request(transport.sink()));
        if let Err(fault) = operation(mailbox, transport) {
            route_fault(mailbox, fault);
        }
    }

    fn close(self: Box<Self>) {
        // Dropping the reply releases the sender
        drop(self);
    }
}

/// Response channel of one request, handed to the operation evaluating it.
///
/// Clones share the same channel. Once every clone is dropped without an
/// answer the sender receives [`ActorError::Abandoned`].
pub struct Transport<T: Send + 'static> {
    inner: Arc<TransportInner<T>>,
}

struct TransportInner<T: Send + 'static> {
    responder: Mailbox,
    reply: Mutex<Option<Reply<T>>>,
    abandoned: AtomicBool,
    ticket: Option<u64>,
}

impl<T: Send + 'static> Transport<T> {
    fn open(responder: &Mailbox, reply: Reply<T>, foreign: bool) -> Self {
        responder.request_begin();
        let ticket = foreign.then(|| responder.next_ticket());
        let inner = Arc::new(TransportInner {
            responder: responder.clone(),
            reply: Mutex::new(Some(reply)),
            abandoned: AtomicBool::new(false),
            ticket,
        });
        if let Some(ticket) = ticket {
            let weak = Arc::downgrade(&inner) as Weak<dyn PendingResponse>;
            responder.track_outstanding(ticket, weak);
        }
        Self { inner }
    }

    fn sink(&self) -> Arc<dyn PendingResponse> {
        self.inner.clone()
    }

    /// Answer the request with a value
    pub fn respond(&self, value: T) -> Result<()> {
        let reply = self.inner.take_reply()?;
        reply.complete(Ok(value));
        Ok(())
    }

    /// Answer the request with a fault
    pub fn fail(&self, fault: impl Into<anyhow::Error>) -> Result<()> {
        let reply = self.inner.take_reply()?;
        reply.complete(Err(fault.into()));
        Ok(())
    }

    /// True until the request has been answered or abandoned
    pub fn is_pending(&self) -> bool {
        self.inner.reply.lock().is_some()
    }

    /// Mailbox evaluating the request
    pub fn responder(&self) -> &Mailbox {
        &self.inner.responder
    }
}

impl<T: Send + 'static> Clone for Transport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Transport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("responder", &self.inner.responder.id())
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<T: Send + 'static> TransportInner<T> {
    fn take_reply(&self) -> Result<Reply<T>> {
        let reply = self.reply.lock().take();
        match reply {
            Some(reply) => {
                self.settle();
                Ok(reply)
            }
            None if self.abandoned.load(Ordering::Acquire) => Err(ActorError::Abandoned),
            None => Err(ActorError::ResponseAlreadySent),
        }
    }

    /// Runs once, when the reply leaves the transport
    fn settle(&self) {
        if let Some(ticket) = self.ticket {
            self.responder.forget_outstanding(ticket);
        }
        self.responder.request_end();
    }
}

impl<T: Send + 'static> PendingResponse for TransportInner<T> {
    fn fail(&self, fault: anyhow::Error) -> std::result::Result<(), anyhow::Error> {
        let reply = self.reply.lock().take();
        match reply {
            Some(reply) => {
                self.settle();
                reply.complete(Err(fault));
                Ok(())
            }
            None => Err(fault),
        }
    }

    fn abandon(&self) {
        let reply = self.reply.lock().take();
        if let Some(reply) = reply {
            self.abandoned.store(true, Ordering::Release);
            self.settle();
            reply.complete(Err(ActorError::Abandoned.into()));
        }
    }

    fn is_pending(&self) -> bool {
        self.reply.lock().is_some()
    }
}

impl<T: Send + 'static> Drop for TransportInner<T> {
    fn drop(&mut self) {
        if let Some(reply) = self.reply.get_mut().take() {
            trace!(mailbox = %self.responder.id(), "Transport dropped without a response");
            self.settle();
            drop(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::Facility;

    #[test]
    fn test_call_round_trip() {
        let facility = Facility::with_threads(1).unwrap();
        let mailbox = facility.mailbox();

        let expected = mailbox.clone();
        let request = Request::new(&mailbox, move |_, transport: Transport<u32>| {
            let value = if transport.responder() == &expected { 42 } else { 0 };
            transport.respond(value)?;
            Ok(())
        });
        assert_eq!(request.target(), &mailbox);
        assert_eq!(request.call().unwrap(), 42);
        facility.close();
    }

    #[test]
    fn test_second_response_is_rejected() {
        let facility = Facility::with_threads(1).unwrap();
        let mailbox = facility.mailbox();

        let late = Arc::new(Mutex::new(None));
        let record = late.clone();
        let first = Request::new(&mailbox, move |_, transport: Transport<Option<String>>| {
            transport.respond(None)?;
            *record.lock() = transport.fail(anyhow::anyhow!("late")).err();
            Ok(())
        });
        assert_eq!(first.call().unwrap(), None);
        assert!(matches!(*late.lock(), Some(ActorError::ResponseAlreadySent)));

        let check = Request::new(&mailbox, |_, transport: Transport<bool>| {
            let clone = transport.clone();
            clone.respond(true)?;
            let misuse = matches!(transport.respond(false), Err(ActorError::ResponseAlreadySent));
            assert!(misuse);
            assert!(!transport.is_pending());
            Ok(())
        });
        assert!(check.call().unwrap());
        facility.close();
    }

    #[test]
    fn test_dropped_transport_abandons() {
        let facility = Facility::with_threads(1).unwrap();
        let mailbox = facility.mailbox();

        let result = Request::new(&mailbox, |_, transport: Transport<()>| {
            drop(transport);
            Ok(())
        })
        .call();
        assert!(matches!(result, Err(ActorError::Abandoned)));
        assert!(mailbox.is_idle());
        facility.close();
    }

    #[test]
    fn test_send_outside_turn_is_rejected() {
        let facility = Facility::with_threads(1).unwrap();
        let source = facility.mailbox();
        let target = facility.mailbox();

        let result = Request::new(&target, |_, transport: Transport<()>| {
            transport.respond(())?;
            Ok(())
        })
        .send(&source, |_| Ok(()));
        assert!(matches!(result, Err(ActorError::NotProcessing { .. })));
        facility.close();
    }
}
