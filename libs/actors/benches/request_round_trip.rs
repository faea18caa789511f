//! Request round-trip benchmarks
//!
//! Measures the cost of one synchronous call into a mailbox, and of a burst
//! of buffered requests between two mailboxes answered through continuations.

use actors::{ActorRef, Facility, Transport};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

struct Echo;

struct Fanout {
    echo: ActorRef<Echo>,
    remaining: usize,
    done: Option<Transport<usize>>,
}

fn bench_synchronous_call(c: &mut Criterion) {
    let facility = Facility::with_threads(2).expect("facility should start");
    let echo = ActorRef::new(&facility.mailbox(), Echo);

    c.bench_function("call_round_trip", |b| {
        b.iter(|| {
            let value = echo
                .request(|_: &mut Echo, _, transport| {
                    transport.respond(black_box(7u64))?;
                    Ok(())
                })
                .call()
                .expect("echo should answer");
            black_box(value)
        })
    });

    facility.close();
}

fn bench_buffered_fanout(c: &mut Criterion) {
    let facility = Facility::with_threads(2).expect("facility should start");
    let echo = ActorRef::new(&facility.mailbox(), Echo);
    let fanout = ActorRef::new(
        &facility.mailbox(),
        Fanout {
            echo,
            remaining: 0,
            done: None,
        },
    );

    let mut group = c.benchmark_group("buffered_fanout");
    for count in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let handle = fanout.clone();
                fanout
                    .request(move |state: &mut Fanout, mailbox, transport| {
                        state.remaining = count;
                        state.done = Some(transport);
                        for _ in 0..count {
                            let handle = handle.clone();
                            state
                                .echo
                                .request(|_: &mut Echo, _, ack: Transport<()>| {
                                    ack.respond(())?;
                                    Ok(())
                                })
                                .send(mailbox, move |()| {
                                    let done = handle.with_state(|state| {
                                        state.remaining -= 1;
                                        if state.remaining == 0 {
                                            state.done.take()
                                        } else {
                                            None
                                        }
                                    })?;
                                    if let Some(done) = done {
                                        done.respond(count)?;
                                    }
                                    Ok(())
                                })?;
                        }
                        Ok(())
                    })
                    .call()
                    .expect("fanout should answer")
            })
        });
    }
    group.finish();

    facility.close();
}

criterion_group!(benches, bench_synchronous_call, bench_buffered_fanout);
criterion_main!(benches);
