//! Fixtures shared by the Ripple benchmarks.

use ripple_core::widget::{Shared, Widget};
use ripple_core::{Hub, Registry, SessionKey, Subscription, Tag};
use std::sync::Arc;

/// A hub with `n` subscribers, each able to buffer `capacity` messages.
///
/// # Panics
///
/// Panics if the hub refuses a subscription.
#[must_use]
pub fn hub_with_subscribers(n: u64, capacity: usize) -> (Arc<Hub>, Vec<Subscription>) {
    let hub = Arc::new(Hub::new());
    let subs = (1..=n)
        .map(|i| hub.subscribe(SessionKey(i), capacity).unwrap())
        .collect();
    (hub, subs)
}

/// A registry of `n` text elements spread over `tags` distinct tags.
///
/// Returns the registry and the tags, in creation order.
#[must_use]
pub fn registry_with_elements(n: usize, tags: usize) -> (Registry, Vec<Tag>) {
    let tags: Vec<Tag> = (0..tags.max(1)).map(|i| Tag::Int(i as i64)).collect();
    let mut registry = Registry::new();
    for i in 0..n {
        let tag = tags[i % tags.len()].clone();
        let value = Shared::new(format!("value {i}"));
        let _ = registry.new_element(vec![tag], Widget::text(value));
    }
    (registry, tags)
}
