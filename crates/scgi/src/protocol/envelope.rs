use std::slice;

use crate::protocol::vars;

/// The decoded SCGI preamble: the variables sent ahead of the body, in wire order.
///
/// Names are expected to be unique but this is not enforced, lookups resolve to the last
/// pair with the requested name, which mirrors how the pairs overwrite each other when they
/// are folded into a [`Request`](crate::protocol::Request).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    pairs: Vec<(String, String)>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { pairs: Vec::with_capacity(capacity) }
    }

    /// Appends a pair, keeping any earlier pair with the same name.
    pub fn push<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Replaces the value of the last pair called `name` in place, the one [`get`](Self::get)
    /// returns, or appends a new pair.
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        match self.pairs.iter_mut().rev().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.into(),
            None => self.pairs.push((name, value.into())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(n, _)| n == name)
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(n, _)| n != name);
    }

    /// The declared body length, `None` when absent or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.get(vars::CONTENT_LENGTH).and_then(|value| value.trim().parse().ok())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn iter(&self) -> slice::Iter<'_, (String, String)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Envelope {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self { pairs: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect() }
    }
}

impl From<Vec<(String, String)>> for Envelope {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl IntoIterator for Envelope {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<'a> IntoIterator for &'a Envelope {
    type Item = &'a (String, String);
    type IntoIter = slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}
