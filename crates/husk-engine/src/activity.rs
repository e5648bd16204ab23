//! Activity log
//!
//! Append-only record of what the engine did, for test introspection.
//! Entries are never removed except by an explicit `clear`.

/// One rendered log line.
#[derive(Debug, Clone)]
pub struct Activity {
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    items: Vec<Activity>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.items.push(Activity { message });
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|a| a.message.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends() {
        let mut log = ActivityLog::new();
        log.record("GET /a");
        log.record(format!("redirect {} -> {}", 302, "/b"));
        assert_eq!(log.len(), 2);
        let lines: Vec<&str> = log.messages().collect();
        assert_eq!(lines, vec!["GET /a", "redirect 302 -> /b"]);
    }

    #[test]
    fn test_clear_empties_the_log() {
        let mut log = ActivityLog::new();
        log.record("x");
        log.clear();
        assert!(log.is_empty());
    }
}
