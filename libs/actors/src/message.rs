//! Messages
//!
//! The three units of communication between mailboxes. A message is owned by
//! the target inbox until it is polled, then by the evaluating mailbox for
//! the duration of its turn.

use crate::handler::{route_fault, Frame};
use crate::mailbox::Mailbox;
use std::fmt;

/// Kind of message being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// A message held in an inbox
pub enum Message {
    /// Response-pending operation; answered through a transport
    Request(RequestMessage),
    /// Result of a request, routed back to the mailbox that sent it
    Response(ResponseMessage),
    /// One-way operation, never answered
    Event(EventMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Event(_) => MessageKind::Event,
        }
    }

    /// True when the sender is outside the target's facility (an external
    /// thread or a mailbox of another facility)
    pub fn is_foreign(&self) -> bool {
        match self {
            Message::Request(request) => request.body.is_foreign(),
            _ => false,
        }
    }

    /// True while the sender is still owed an outcome
    pub fn is_response_pending(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// Discard the message without evaluating it. A pending request releases
    /// its sender with an abandonment fault.
    pub fn close(self) {
        if let Message::Request(request) = self {
            request.body.close();
        }
    }

    pub(crate) fn eval(self, mailbox: &Mailbox) {
        match self {
            Message::Request(request) => request.body.eval(mailbox),
            Message::Response(response) => response.eval(mailbox),
            Message::Event(event) => event.eval(mailbox),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("foreign", &self.is_foreign())
            .finish()
    }
}

/// Type-erased request body; the typed side lives in `request.rs`
pub(crate) trait PendingRequest: Send {
    fn is_foreign(&self) -> bool;

    fn eval(self: Box<Self>, mailbox: &Mailbox);

    fn close(self: Box<Self>);
}

pub struct RequestMessage {
    body: Box<dyn PendingRequest>,
}

impl RequestMessage {
    pub(crate) fn new(body: Box<dyn PendingRequest>) -> Self {
        Self { body }
    }
}

type Delivery = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

pub struct ResponseMessage {
    frame: Frame,
    deliver: Delivery,
}

impl ResponseMessage {
    /// `frame` is the handler scope captured when the request was sent
    pub(crate) fn new(frame: Frame, deliver: Delivery) -> Self {
        Self { frame, deliver }
    }

    fn eval(self, mailbox: &Mailbox) {
        mailbox.begin_turn(MessageKind::Response, self.frame);
        if let Err(fault) = (self.deliver)() {
            route_fault(mailbox, fault);
        }
    }
}

type EventOperation = Box<dyn FnOnce(&Mailbox) -> anyhow::Result<()> + Send>;

pub struct EventMessage {
    operation: EventOperation,
}

impl EventMessage {
    pub fn new<F>(operation: F) -> Self
    where
        F: FnOnce(&Mailbox) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            operation: Box::new(operation),
        }
    }

    fn eval(self, mailbox: &Mailbox) {
        mailbox.begin_turn(MessageKind::Event, Frame::default());
        if let Err(fault) = (self.operation)(mailbox) {
            route_fault(mailbox, fault);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_flags() {
        let foreign = testing::request(true);
        assert_eq!(foreign.kind(), MessageKind::Request);
        assert!(foreign.is_foreign());
        assert!(foreign.is_response_pending());

        let local = testing::request(false);
        assert!(!local.is_foreign());

        let event = testing::event();
        assert_eq!(event.kind(), MessageKind::Event);
        assert!(!event.is_foreign());
        assert!(!event.is_response_pending());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::Request.to_string(), "request");
        assert_eq!(MessageKind::Response.to_string(), "response");
        assert_eq!(MessageKind::Event.to_string(), "event");
    }
}
