//! Tags: opaque keys that address zero or more elements.
//!
//! Application state that many elements render from is usually given a tag
//! once. Marking the tag dirty re-renders every element registered under it
//! without the state owner knowing which elements exist.

use ripple_protocol::Jid;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Maximum nesting of [`Tag::List`] values.
pub const MAX_TAG_DEPTH: usize = 10;

/// Maximum number of tags after expansion.
pub const MAX_TAGS: usize = 100;

/// Tag expansion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// Expansion produced more than [`MAX_TAGS`] tags.
    #[error("Too many tags")]
    TooManyTags,

    /// Lists are nested deeper than [`MAX_TAG_DEPTH`].
    #[error("Tag lists nested too deep")]
    TooDeep,
}

/// An opaque addressing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// A string name.
    Name(Arc<str>),
    /// An integer.
    Int(i64),
    /// An element. Every element is indexed under its own jid.
    Jid(Jid),
    /// Identity of a shared allocation, see [`Tag::of`].
    Ptr(usize),
    /// A group of tags, flattened by [`Tag::expand`].
    List(Arc<[Tag]>),
}

impl Tag {
    /// Tag identifying the allocation behind `value`.
    ///
    /// Two clones of the same `Arc` produce equal tags. The tag is only
    /// meaningful while the allocation is alive.
    #[must_use]
    pub fn of<T: ?Sized>(value: &Arc<T>) -> Tag {
        Tag::Ptr(Arc::as_ptr(value).cast::<()>() as usize)
    }

    /// Group several tags into one value.
    #[must_use]
    pub fn list(tags: impl IntoIterator<Item = Tag>) -> Tag {
        Tag::List(tags.into_iter().collect())
    }

    /// Flatten nested lists and drop duplicates, keeping first-seen order.
    ///
    /// # Errors
    ///
    /// Fails if lists nest deeper than [`MAX_TAG_DEPTH`] or the result has
    /// more than [`MAX_TAGS`] entries.
    pub fn expand<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Result<Vec<Tag>, TagError> {
        let mut out = Vec::new();
        for tag in tags {
            expand_into(tag, 0, &mut out)?;
        }
        Ok(out)
    }
}

fn expand_into(tag: &Tag, depth: usize, out: &mut Vec<Tag>) -> Result<(), TagError> {
    match tag {
        Tag::List(items) => {
            if depth >= MAX_TAG_DEPTH {
                return Err(TagError::TooDeep);
            }
            for item in items.iter() {
                expand_into(item, depth + 1, out)?;
            }
        }
        _ => {
            if !out.contains(tag) {
                if out.len() >= MAX_TAGS {
                    return Err(TagError::TooManyTags);
                }
                out.push(tag.clone());
            }
        }
    }
    Ok(())
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Name(s) => write!(f, "{s:?}"),
            Tag::Int(n) => write!(f, "{n}"),
            Tag::Jid(j) => write!(f, "{j}"),
            Tag::Ptr(p) => write!(f, "{p:#x}"),
            Tag::List(items) => {
                f.write_str("[")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag::Name(Arc::from(s))
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag::Name(Arc::from(s))
    }
}

impl From<i64> for Tag {
    fn from(n: i64) -> Self {
        Tag::Int(n)
    }
}

impl From<i32> for Tag {
    fn from(n: i32) -> Self {
        Tag::Int(i64::from(n))
    }
}

impl From<Jid> for Tag {
    fn from(jid: Jid) -> Self {
        Tag::Jid(jid)
    }
}

impl From<Vec<Tag>> for Tag {
    fn from(tags: Vec<Tag>) -> Self {
        Tag::List(tags.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    #[test]
    fn test_pointer_identity() {
        let a = Arc::new(RwLock::new(1));
        let b = Arc::new(RwLock::new(1));
        assert_eq!(Tag::of(&a), Tag::of(&a.clone()));
        assert_ne!(Tag::of(&a), Tag::of(&b));
    }

    #[test]
    fn test_expand_flattens_and_dedups() {
        let tags = vec![
            Tag::from("x"),
            Tag::list([Tag::Int(1), Tag::list([Tag::from("x"), Tag::from("y")])]),
        ];
        let flat = Tag::expand(&tags).unwrap();
        assert_eq!(flat, vec![Tag::from("x"), Tag::Int(1), Tag::from("y")]);
    }

    #[test]
    fn test_expand_limits() {
        let many: Vec<Tag> = (0..=MAX_TAGS as i64).map(Tag::from).collect();
        assert_eq!(Tag::expand(&many), Err(TagError::TooManyTags));

        let mut nested = Tag::from("leaf");
        for _ in 0..=MAX_TAG_DEPTH {
            nested = Tag::list([nested]);
        }
        assert_eq!(Tag::expand([&nested]), Err(TagError::TooDeep));
    }

    #[test]
    fn test_display() {
        assert_eq!(Tag::from("x").to_string(), "\"x\"");
        assert_eq!(Tag::from(Jid(1)).to_string(), "Jid.1");
        assert_eq!(Tag::list([Tag::Int(1), Tag::Int(2)]).to_string(), "[1, 2]");
    }
}
