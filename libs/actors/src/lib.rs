//! Mailbox-Based Actor Runtime
//!
//! Actors communicate only through messages evaluated one at a time per
//! mailbox, so actor logic needs no locks while many mailboxes run in
//! parallel on a shared thread pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Facility ─────────────────────────────┐
//! │                                                                   │
//! │  ┌─────────── Mailbox A ───────────┐      ┌──── Mailbox B ────┐   │
//! │  │ Inbox: local queue | channel    │      │ Inbox             │   │
//! │  │ Turn: handler scope, pending rq │      │                   │   │
//! │  │ Send buffers ── flush when idle ┼─────►│ requests (FIFO)   │   │
//! │  └──────────────▲──────────────────┘      └─────────┬─────────┘   │
//! │                 │        responses, events          │             │
//! │                 └───────────────────────────────────┘             │
//! │                                                                   │
//! │  Scheduler (ThreadPool): runs each claimed mailbox on one worker  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Requests** are buffered per destination and flushed once the sending
//!   mailbox has nothing left to interleave. Each gets exactly one outcome.
//! - **Responses** return to the sending mailbox and run its continuation
//!   under the exception handler that was active when the request was sent.
//! - **Events** go straight to the target and are never answered.
//!
//! # Example
//!
//! ```rust
//! use actors::{ActorRef, Facility};
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! let facility = Facility::with_threads(2)?;
//! let greeter = ActorRef::new(&facility.mailbox(), Greeter { name: "world".into() });
//!
//! let greeting = greeter
//!     .request(|state: &mut Greeter, _, transport| {
//!         transport.respond(format!("Hello {}!", state.name))?;
//!         Ok(())
//!     })
//!     .call()?;
//! assert_eq!(greeting, "Hello world!");
//!
//! facility.close();
//! # Ok::<(), actors::ActorError>(())
//! ```

pub mod actor;
pub mod bound_responder;
pub mod error;
pub mod event;
pub mod facility;
pub mod handler;
pub mod inbox;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod request;
pub mod scheduler;

pub use actor::ActorRef;
pub use bound_responder::BoundResponder;
pub use error::{ActorError, Result};
pub use event::Event;
pub use facility::Facility;
pub use handler::ExceptionHandler;
pub use inbox::{Admission, Inbox};
pub use mailbox::{IdleCallback, Mailbox, MailboxBuilder};
pub use message::{EventMessage, Message, MessageKind};
pub use metrics::{FacilityMetrics, MetricsSnapshot};
pub use registry::MailboxId;
pub use request::{Request, Transport};
pub use scheduler::{Scheduler, ThreadPool};

pub use actors_config::FacilityConfig;
