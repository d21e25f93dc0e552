//! Insertion-ordered, deduplicating set of image references awaiting transfer.

use std::collections::HashSet;

/// Image references collected during resolution.
///
/// Keyed by the literal reference string. Adding a reference that is already
/// present is a no-op, and iteration yields references in the order they were
/// first added, so every run processes images in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnprocessedImageSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UnprocessedImageSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. Returns `false` if it was already present.
    pub fn add(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.order.push(url);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate references in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// All references in first-insertion order.
    pub fn all(&self) -> &[String] {
        &self.order
    }
}

impl IntoIterator for UnprocessedImageSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

impl<S: Into<String>> FromIterator<S> for UnprocessedImageSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for UnprocessedImageSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for url in iter {
            self.add(url);
        }
    }
}
