//! Result cursors

use std::vec;

use super::document::Document;

/// Lazily consumed find results
#[derive(Debug)]
pub struct Cursor {
    inner: vec::IntoIter<Document>,
}

impl Cursor {
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            inner: docs.into_iter(),
        }
    }

    /// Documents not yet consumed
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}
