//! Per-session element registry.
//!
//! Elements live in an arena indexed by jid (1-based). A multimap from tag
//! to jids routes dirty and update messages. The owning session guards the
//! registry with one `RwLock`.

use parking_lot::Mutex;
use ripple_protocol::Jid;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::event::EventFn;
use crate::tag::Tag;
use crate::widget::Widget;

/// A rendered, addressable widget.
pub struct Element {
    jid: Jid,
    tags: Vec<Tag>,
    ui: Widget,
}

impl Element {
    /// The element's jid.
    #[must_use]
    pub fn jid(&self) -> Jid {
        self.jid
    }

    /// Tags the element was registered under, not counting its own jid.
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// The widget.
    #[must_use]
    pub fn ui(&self) -> &Widget {
        &self.ui
    }

    /// Whether the element is registered under `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        *tag == Tag::Jid(self.jid) || self.tags.contains(tag)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("jid", &self.jid)
            .field("tags", &self.tags)
            .field("ui", &self.ui)
            .finish()
    }
}

/// Elements and handlers of one session.
#[derive(Default)]
pub struct Registry {
    elements: Vec<Arc<Element>>,
    by_tag: HashMap<Tag, Vec<Jid>>,
    handlers: HashMap<Jid, EventFn>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ui` under `tags` and its own jid.
    ///
    /// Returns `None` without allocating a jid when `tags` is empty: untagged
    /// output is static and can never be updated.
    pub fn new_element(&mut self, tags: Vec<Tag>, ui: Widget) -> Option<Arc<Element>> {
        if tags.is_empty() {
            return None;
        }
        Some(self.insert(tags, ui))
    }

    /// Register `ui` unconditionally.
    pub(crate) fn insert(&mut self, tags: Vec<Tag>, ui: Widget) -> Arc<Element> {
        let jid = self.next_jid();
        for tag in &tags {
            self.by_tag.entry(tag.clone()).or_default().push(jid);
        }
        self.by_tag.entry(Tag::Jid(jid)).or_default().push(jid);

        let element = Arc::new(Element { jid, tags, ui });
        self.elements.push(element.clone());
        trace!(jid = %jid, kind = element.ui.kind(), "New element");
        element
    }

    fn next_jid(&self) -> Jid {
        Jid(u32::try_from(self.elements.len() + 1).unwrap_or(u32::MAX))
    }

    /// Every element registered under any of `tags`, in tag order then
    /// registration order. An element matching several tags appears once
    /// per match.
    #[must_use]
    pub fn elements_for_tags(&self, tags: &[Tag]) -> Vec<Arc<Element>> {
        let mut found = Vec::new();
        for tag in tags {
            if let Some(jids) = self.by_tag.get(tag) {
                found.extend(jids.iter().filter_map(|&jid| self.lookup(jid)));
            }
        }
        found
    }

    /// The element with this jid.
    #[must_use]
    pub fn lookup(&self, jid: Jid) -> Option<Arc<Element>> {
        jid.index().and_then(|i| self.elements.get(i)).cloned()
    }

    /// Attach `handler` to `jid`.
    ///
    /// If `jid` names an existing element, `Some` replaces its handler and
    /// `None` keeps whatever handler it had. `Jid::NONE` allocates a fresh
    /// handler-only element and returns its jid. Jids are only ever handed
    /// out by the registry, so any other jid is refused with `None`.
    pub fn register_handler(&mut self, jid: Jid, handler: Option<EventFn>) -> Option<Jid> {
        if jid == Jid::NONE {
            return Some(self.insert(Vec::new(), Widget::Handler(handler)).jid);
        }
        self.lookup(jid)?;
        if let Some(handler) = handler {
            self.handlers.insert(jid, handler);
        }
        Some(jid)
    }

    /// Handler registered for `jid` in place of the widget's own.
    #[must_use]
    pub fn handler(&self, jid: Jid) -> Option<EventFn> {
        self.handlers.get(&jid).cloned()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Drop every element and handler, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.by_tag.clear();
        self.handlers.clear();
    }
}

/// Bounded pool of cleared registries.
pub struct RegistryPool {
    free: Mutex<Vec<Registry>>,
    limit: usize,
}

impl RegistryPool {
    /// Pool holding at most `limit` registries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            limit,
        }
    }

    /// Take an empty registry.
    #[must_use]
    pub fn take(&self) -> Registry {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Clear `registry` and keep it for reuse.
    pub fn put(&self, mut registry: Registry) {
        registry.clear();
        let mut free = self.free.lock();
        if free.len() < self.limit {
            free.push(registry);
        }
    }

    /// Number of pooled registries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }
}
