//! Browser history abstraction.

/// Holder of the current query string plus back/forward navigation.
///
/// Writes never notify; callers forward the new address to the controller.
pub trait History {
    /// Current query string without the leading `?`.
    fn current(&self) -> String;
    /// Adds a new entry and drops any forward entries.
    fn push(&mut self, query: &str);
    /// Overwrites the current entry.
    fn replace(&mut self, query: &str);
    /// Steps back; `false` at the oldest entry.
    fn back(&mut self) -> bool;
    /// Steps forward; `false` at the newest entry.
    fn forward(&mut self) -> bool;
}

/// In-process history stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHistory {
    entries: Vec<String>,
    cursor: usize,
    writes: usize,
}

impl MemoryHistory {
    pub fn new(initial: &str) -> Self {
        Self {
            entries: vec![strip_question_mark(initial).to_string()],
            cursor: 0,
            writes: 0,
        }
    }

    /// Number of `push`/`replace` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("")
    }
}

impl History for MemoryHistory {
    fn current(&self) -> String {
        self.entries
            .get(self.cursor)
            .cloned()
            .unwrap_or_default()
    }

    fn push(&mut self, query: &str) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(strip_question_mark(query).to_string());
        self.cursor = self.entries.len() - 1;
        self.writes += 1;
    }

    fn replace(&mut self, query: &str) {
        let query = strip_question_mark(query).to_string();
        match self.entries.get_mut(self.cursor) {
            Some(slot) => *slot = query,
            None => self.entries.push(query),
        }
        self.writes += 1;
    }

    fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    fn forward(&mut self) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        true
    }
}

fn strip_question_mark(query: &str) -> &str {
    query.strip_prefix('?').unwrap_or(query)
}
