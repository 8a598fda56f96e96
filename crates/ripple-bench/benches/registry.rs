//! Element registry benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_bench::registry_with_elements;
use ripple_core::widget::{Shared, Widget};
use ripple_core::{Registry, Tag};
use ripple_protocol::Jid;

/// Tag lookup as done for every dirty message.
fn bench_elements_for_tags(c: &mut Criterion) {
    let mut group = c.benchmark_group("elements_for_tags");

    for size in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (registry, tags) = registry_with_elements(size, 10);
            let wanted = [tags[0].clone(), tags[5].clone()];
            b.iter(|| registry.elements_for_tags(black_box(&wanted)));
        });
    }

    group.finish();
}

/// Jid lookup as done for every browser event.
fn bench_lookup(c: &mut Criterion) {
    let (registry, _) = registry_with_elements(1000, 10);
    c.bench_function("lookup_1000", |b| {
        b.iter(|| registry.lookup(black_box(Jid(500))))
    });
}

/// Element creation as done while rendering a page.
fn bench_new_element(c: &mut Criterion) {
    let value = Shared::new(String::from("x"));
    let tag = Tag::from("x");

    c.bench_function("new_element", |b| {
        b.iter_batched_ref(
            Registry::new,
            |registry| registry.new_element(vec![tag.clone()], Widget::text(value.clone())),
            criterion::BatchSize::SmallInput,
        )
    });
}

/// Expanding nested tag lists.
fn bench_expand(c: &mut Criterion) {
    let nested = Tag::from(vec![
        Tag::from("a"),
        Tag::from(vec![Tag::Int(1), Tag::Int(2), Tag::from("a")]),
        Tag::from(vec![Tag::from(vec![Tag::Jid(Jid(3))])]),
    ]);

    c.bench_function("tag_expand", |b| {
        b.iter(|| Tag::expand(black_box([&nested])))
    });
}

criterion_group!(
    benches,
    bench_elements_for_tags,
    bench_lookup,
    bench_new_element,
    bench_expand
);
criterion_main!(benches);
