//! Event Dispatch Integration Tests

mod common;

use actors::{ActorRef, Event, Transport};
use anyhow::anyhow;
use common::*;

struct Tally {
    evaluated: Vec<usize>,
}

fn evaluated(tally: &ActorRef<Tally>) -> Vec<usize> {
    tally
        .request(|state: &mut Tally, _, transport: Transport<Vec<usize>>| {
            transport.respond(state.evaluated.clone())?;
            Ok(())
        })
        .call()
        .unwrap()
}

#[test]
fn test_faulting_event_does_not_stop_later_events() {
    let facility = facility(2);
    let tally = ActorRef::new(&facility.mailbox(), Tally { evaluated: Vec::new() });

    const EVENTS: usize = 10;
    const FAULTING: usize = 4;
    for index in 0..EVENTS {
        tally.signal(move |state, _| {
            state.evaluated.push(index);
            if index == FAULTING {
                return Err(anyhow!("event {} failed", index));
            }
            Ok(())
        });
    }

    assert_eq!(evaluated(&tally), (0..EVENTS).collect::<Vec<_>>());
    let snapshot = facility.metrics().snapshot();
    assert_eq!(snapshot.events_evaluated, EVENTS as u64);
    assert_eq!(snapshot.faults_unhandled, 1);
    facility.close();
}

#[test]
fn test_event_reused_across_actors() {
    let facility = facility(2);
    let first = ActorRef::new(&facility.mailbox(), Tally { evaluated: Vec::new() });
    let second = ActorRef::new(&facility.mailbox(), Tally { evaluated: Vec::new() });

    let mark = Event::new(|state: &mut Tally, _| {
        state.evaluated.push(state.evaluated.len());
        Ok(())
    });
    mark.signal(&first);
    mark.signal(&first);
    mark.signal(&second);

    assert_eq!(evaluated(&first), vec![0, 1]);
    assert_eq!(evaluated(&second), vec![0]);
    facility.close();
}

#[test]
fn test_event_fault_stays_with_target_handler() {
    let facility = facility(2);
    let (caught_tx, caught_rx) = crossbeam_channel::unbounded();
    let tally = ActorRef::new(&facility.mailbox(), Tally { evaluated: Vec::new() });

    tally.signal(move |_, mailbox| {
        mailbox.set_exception_handler(move |fault| {
            let _ = caught_tx.send(fault.to_string());
            Ok(())
        })?;
        Err(anyhow!("event fault"))
    });

    assert_eq!(caught_rx.recv_timeout(TIMEOUT).unwrap(), "event fault");
    // The handler scope ended with the event
    tally.signal(|_, _| Err(anyhow!("unhandled")));
    assert!(evaluated(&tally).is_empty());

    let snapshot = facility.metrics().snapshot();
    assert_eq!(snapshot.faults_handled, 1);
    assert_eq!(snapshot.faults_unhandled, 1);
    facility.close();
}

#[test]
fn test_event_signalled_from_actor_turn() {
    let facility = facility(2);
    let target = ActorRef::new(&facility.mailbox(), Tally { evaluated: Vec::new() });
    let relay = Recorder::spawn(&facility);

    let forwarded = target.clone();
    relay.signal(move |state, _| {
        state.seen.push("relayed".to_string());
        forwarded.signal(|tally, _| {
            tally.evaluated.push(99);
            Ok(())
        });
        Ok(())
    });

    assert_eq!(recorded(&relay), vec!["relayed"]);
    assert_eq!(evaluated(&target), vec![99]);
    facility.close();
}
