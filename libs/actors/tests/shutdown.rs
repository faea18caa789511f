//! Facility Shutdown Tests
//!
//! Closing a facility must release every blocked caller in bounded time and
//! still deliver buffered messages bound for other facilities.

mod common;

use actors::{ActorError, ActorRef, Request, Transport};
use common::*;
use std::thread;

/// Holds on to requests without ever answering them
struct Sink {
    held: Vec<Transport<()>>,
    arrived: crossbeam_channel::Sender<()>,
}

fn hold(sink: &ActorRef<Sink>) -> Request<()> {
    sink.request(|state: &mut Sink, _, transport| {
        state.held.push(transport);
        let _ = state.arrived.send(());
        Ok(())
    })
}

#[test]
fn test_close_releases_outstanding_call() {
    let facility = facility(2);
    let (arrived_tx, arrived_rx) = crossbeam_channel::unbounded();
    let sink = ActorRef::new(
        &facility.mailbox(),
        Sink {
            held: Vec::new(),
            arrived: arrived_tx,
        },
    );

    let (result_tx, result_rx) = crossbeam_channel::bounded(1);
    let request = hold(&sink);
    thread::spawn(move || {
        let _ = result_tx.send(request.call());
    });
    arrived_rx.recv_timeout(TIMEOUT).unwrap();

    facility.close();
    let outcome = result_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(matches!(outcome, Err(ActorError::Abandoned)));
    assert!(facility.metrics().snapshot().messages_abandoned >= 1);
}

#[test]
fn test_close_releases_queued_calls() {
    let facility = facility(2);
    let (arrived_tx, arrived_rx) = crossbeam_channel::unbounded();
    let sink = ActorRef::new(
        &facility.atomic_mailbox(),
        Sink {
            held: Vec::new(),
            arrived: arrived_tx,
        },
    );

    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    for _ in 0..3 {
        let request = hold(&sink);
        let result_tx = result_tx.clone();
        thread::spawn(move || {
            let _ = result_tx.send(request.call());
        });
    }
    // Only the first is admitted; the others wait behind it
    arrived_rx.recv_timeout(TIMEOUT).unwrap();

    facility.close();
    for _ in 0..3 {
        let outcome = result_rx.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(outcome, Err(ActorError::Abandoned)));
    }
}

#[test]
fn test_call_after_close_is_abandoned() {
    let facility = facility(1);
    let recorder = Recorder::spawn(&facility);
    facility.close();

    let outcome = recorder
        .request(|_: &mut Recorder, _, transport: Transport<()>| {
            transport.respond(())?;
            Ok(())
        })
        .call();
    assert!(matches!(outcome, Err(ActorError::Abandoned)));
    assert!(recorder.mailbox().is_closed());
}

#[test]
fn test_close_flushes_buffers_to_other_facilities() {
    let closing = facility(1);
    let remote = facility(1);
    let (delivered_tx, delivered_rx) = crossbeam_channel::unbounded();

    let local_target = Recorder::spawn(&closing);
    let remote_target = Recorder::spawn(&remote);
    let source = Recorder::spawn(&closing);

    let local_tx = delivered_tx.clone();
    let remote_tx = delivered_tx;
    source.signal(move |_, mailbox| {
        local_target
            .request(move |_: &mut Recorder, _, transport: Transport<()>| {
                let _ = local_tx.send("local");
                transport.respond(())?;
                Ok(())
            })
            .send(mailbox, |()| Ok(()))?;
        remote_target
            .request(move |_: &mut Recorder, _, transport: Transport<()>| {
                let _ = remote_tx.send("remote");
                transport.respond(())?;
                Ok(())
            })
            .send(mailbox, |()| Ok(()))?;

        // Both requests are still buffered on this mailbox
        mailbox.facility().close();
        Ok(())
    });

    assert_eq!(delivered_rx.recv_timeout(TIMEOUT).unwrap(), "remote");
    assert!(delivered_rx.try_recv().is_err());
    remote.close();
}
