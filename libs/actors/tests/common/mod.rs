//! Shared helpers for the runtime integration tests

#![allow(dead_code)]

use actors::{ActorRef, Facility, Transport};
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test waits on
pub const TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per test binary (`RUST_LOG` applies)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Facility with `threads` workers and tracing installed
pub fn facility(threads: usize) -> Facility {
    init_tracing();
    Facility::with_threads(threads).expect("facility should start")
}

/// Actor recording the order in which it saw values
#[derive(Default)]
pub struct Recorder {
    pub seen: Vec<String>,
}

impl Recorder {
    pub fn spawn(facility: &Facility) -> ActorRef<Recorder> {
        ActorRef::new(&facility.mailbox(), Recorder::default())
    }
}

/// Blocking read of everything a recorder has seen
pub fn recorded(recorder: &ActorRef<Recorder>) -> Vec<String> {
    recorder
        .request(|state: &mut Recorder, _, transport: Transport<Vec<String>>| {
            transport.respond(state.seen.clone())?;
            Ok(())
        })
        .call()
        .expect("recorder should answer")
}
