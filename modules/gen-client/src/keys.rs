/// Ordered credential pool with a positional cursor. Loaded once at startup;
/// only the cursor moves. There is no per-key health tracking; callers decide what a
/// wrap-around means.
#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: usize,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys, cursor: 0 }
    }

    /// The active credential, or `None` if none are configured.
    pub fn current(&self) -> Option<&str> {
        self.keys.get(self.cursor).map(String::as_str)
    }

    /// Advance to the next credential. Returns `true` if one remained; when
    /// the pool is already on its last credential, wraps back to index 0 and
    /// returns `false`, the "exhausted this pass" signal.
    pub fn rotate(&mut self) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        if self.cursor + 1 < self.keys.len() {
            self.cursor += 1;
            true
        } else {
            self.cursor = 0;
            false
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
