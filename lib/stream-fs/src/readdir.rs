//! Directory listing snapshots.

/// An ordered snapshot of a directory's entry names, captured once at open
/// time. Concurrent backend changes do not show up; rewinding resets the
/// cursor without re-querying the backend.
#[derive(Debug)]
pub struct ReadDir {
    entries: Vec<String>,
    index: usize,
}

impl ReadDir {
    pub(crate) fn new(entries: Vec<String>) -> Self {
        Self { entries, index: 0 }
    }

    /// Resets the cursor to the first entry.
    pub fn rewind(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Iterator for ReadDir {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let entry = self.entries.get(self.index).cloned()?;
        self.index += 1;

        Some(entry)
    }
}

/// Strips the opened directory's own path off each listing entry, leaving
/// relative names in backend order.
pub(crate) fn relative_names(target: &str, listing: Vec<crate::EntryInfo>) -> Vec<String> {
    let prefix_len = if target.is_empty() {
        0
    } else {
        target.len() + 1
    };

    listing
        .into_iter()
        .map(|entry| match entry.path.get(prefix_len..) {
            Some(name) => name.to_owned(),
            None => entry.path,
        })
        .collect()
}
