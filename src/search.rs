use crate::feed::{Board, Message};

/// Anything that can be matched by the incremental search.
pub trait Searchable {
    fn haystack(&self) -> String;
}

impl Searchable for Message {
    fn haystack(&self) -> String {
        format!("{}{}", self.body, self.subject_text())
    }
}

impl Searchable for Board {
    fn haystack(&self) -> String {
        format!("{} {}", self.board, self.title)
    }
}

/// Indices of `items` whose text contains `query`, ignoring case.
/// An empty query matches everything.
pub fn filter<T: Searchable>(items: &[T], query: &str) -> Vec<usize> {
    let needle = query.to_lowercase();
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| needle.is_empty() || item.haystack().to_lowercase().contains(&needle))
        .map(|(idx, _)| idx)
        .collect()
}

/// Query text plus the match set it produced. The match set is always
/// recomputed from the full list, never narrowed from the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    query: String,
    matches: Vec<usize>,
}

impl SearchFilter {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    pub fn push<T: Searchable>(&mut self, ch: char, items: &[T]) {
        self.query.push(ch);
        self.refresh(items);
    }

    /// Returns false when the query was already empty.
    pub fn pop<T: Searchable>(&mut self, items: &[T]) -> bool {
        if self.query.pop().is_none() {
            return false;
        }
        self.refresh(items);
        true
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
    }

    pub fn refresh<T: Searchable>(&mut self, items: &[T]) {
        self.matches = if self.query.is_empty() {
            Vec::new()
        } else {
            filter(items, &self.query)
        };
    }

    /// Length of the list the cursor moves over.
    pub fn effective_len(&self, total: usize) -> usize {
        if self.is_active() {
            self.matches.len()
        } else {
            total
        }
    }

    /// Map a cursor in the effective list back to an index in the full list.
    pub fn resolve(&self, cursor: usize, total: usize) -> Option<usize> {
        if self.is_active() {
            self.matches.get(cursor).copied()
        } else {
            (cursor < total).then_some(cursor)
        }
    }
}
