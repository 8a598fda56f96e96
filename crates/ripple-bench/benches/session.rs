//! End-to-end session latency over the in-memory transport.
//!
//! These run the full reader, event loop, dispatcher and writer for each
//! session, so they include task scheduling costs.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::widget::{Shared, Widget};
use ripple_core::{Engine, EngineConfig, Session};
use ripple_transport::memory::{pipe, Peer};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

struct Served {
    session: Session,
    peer: Peer,
    task: JoinHandle<()>,
}

fn serve(session: Session) -> Served {
    let (reader, writer, peer) = pipe(64);
    let s = session.clone();
    let task = tokio::spawn(async move {
        let _ = s.serve(reader, writer).await;
    });
    Served {
        session,
        peer,
        task,
    }
}

async fn stop(served: Vec<Served>) {
    for s in served {
        s.session.close();
        let _ = s.task.await;
    }
}

/// Browser input followed by a server refresh of the same element.
fn bench_input_roundtrip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("input_then_value", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async move {
                let engine = Engine::new(EngineConfig::default());
                let session = engine.new_session(None).unwrap();
                let value = Shared::new(String::new());
                session.render(Widget::text(value.clone()), &[]).unwrap();
                let mut served = serve(session);

                let start = Instant::now();
                for i in 0..iters {
                    served
                        .peer
                        .send_text(&format!("Input\t1\t{i}\n"))
                        .await
                        .unwrap();
                    served.session.dirty(vec![value.tag()]);
                    served.peer.recv().await.unwrap();
                }
                let elapsed = start.elapsed();

                stop(vec![served]).await;
                elapsed
            })
        });
    });
}

/// One engine-wide dirty mark reaching every connected session.
fn bench_dirty_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dirty_fanout");
    group.measurement_time(Duration::from_secs(10));

    for size in [1usize, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_custom(|iters| {
                rt.block_on(async move {
                    let engine = Engine::new(EngineConfig::default());
                    let value = Shared::new(String::from("x"));
                    let mut served = Vec::with_capacity(size);
                    for _ in 0..size {
                        let session = engine.new_session(None).unwrap();
                        session.render(Widget::text(value.clone()), &[]).unwrap();
                        served.push(serve(session));
                    }
                    // sessions subscribe once their loop is running
                    while engine.hub().subscriber_count() < size {
                        tokio::task::yield_now().await;
                    }

                    let start = Instant::now();
                    for _ in 0..iters {
                        engine.dirty(vec![value.tag()]);
                        for s in &mut served {
                            s.peer.recv().await.unwrap();
                        }
                    }
                    let elapsed = start.elapsed();

                    stop(served).await;
                    elapsed
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_input_roundtrip, bench_dirty_fanout);
criterion_main!(benches);
