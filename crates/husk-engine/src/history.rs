//! History state machine
//!
//! Stack of completed navigation states. Entries are immutable once
//! pushed; a one-shot suppression flag lets a navigation that merely
//! replays a popped entry avoid re-entering history. There is no
//! forward stack: this is a deliberate simplification of the HTML5
//! history model, not an oversight.

use std::time::SystemTime;

use husk_net::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

/// The client-side state object attached to a pushed entry.
///
/// Created only when a data-protocol response declares one; a plain
/// navigation produces an entry with no state at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationState {
    /// Target URL the page identity moved to.
    pub url: String,
    pub title: String,
    /// RPC endpoint to replay when this entry is popped.
    pub cb_url: Option<String>,
    pub rpc_method: Option<String>,
    pub rpc_params: Option<Value>,
    pub on_success: Option<String>,
    pub on_error: Option<String>,
    pub timestamp: SystemTime,
}

/// One completed navigation, as captured right before it was
/// superseded.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub response: Response,
    /// Snapshot string at capture time; `None` when no HTML document
    /// had been loaded yet.
    pub snapshot: Option<String>,
    pub state: Option<NavigationState>,
    pub title: Option<String>,
    pub url: String,
}

#[derive(Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    suppress_next: bool,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Skip exactly the next push. Read-and-cleared by that push.
    pub fn suppress_next_push(&mut self) {
        self.suppress_next = true;
    }

    /// Append an entry, unless the one-shot suppression flag is set.
    /// Returns whether the entry was actually pushed.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        if self.suppress_next {
            self.suppress_next = false;
            tracing::trace!(url = %entry.url, "history push suppressed (replay)");
            return false;
        }
        tracing::trace!(url = %entry.url, depth = self.entries.len() + 1, "history push");
        self.entries.push(entry);
        true
    }

    /// Patch the most recent entry: same response and snapshot, new
    /// state/title/url.
    pub fn replace(
        &mut self,
        state: Option<NavigationState>,
        title: Option<String>,
        url: String,
    ) -> Result<(), EngineError> {
        let last = self
            .entries
            .pop()
            .ok_or_else(|| EngineError::State("replace on empty history".into()))?;
        self.entries.push(HistoryEntry {
            response: last.response,
            snapshot: last.snapshot,
            state,
            title,
            url,
        });
        Ok(())
    }

    /// Pop `n` entries and return the final one popped.
    ///
    /// Underflow fails before anything is popped, so the stack is left
    /// unchanged on error.
    pub fn pop_n(&mut self, n: usize) -> Result<HistoryEntry, EngineError> {
        if n == 0 {
            return Err(EngineError::State("back requires n >= 1".into()));
        }
        if n > self.entries.len() {
            return Err(EngineError::State(format!(
                "cannot go back {n} entries, history has {}",
                self.entries.len()
            )));
        }
        let keep = self.entries.len() - n;
        self.entries
            .drain(keep..)
            .next()
            .ok_or_else(|| EngineError::State("history underflow".into()))
    }

    /// There is no forward stack.
    pub fn forward(&self, _n: usize) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("forward navigation"))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.suppress_next = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> HistoryEntry {
        HistoryEntry {
            response: Response {
                method: "GET".into(),
                url: url.to_string(),
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
                content_type: "text/html".into(),
                charset: None,
            },
            snapshot: Some(format!("<html><body>{url}</body></html>")),
            state: None,
            title: None,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_push_and_pop() {
        let mut history = History::new();
        history.push(entry("/a"));
        history.push(entry("/b"));
        history.push(entry("/c"));

        let popped = history.pop_n(2).unwrap();
        assert_eq!(popped.url, "/b");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_pop_underflow_leaves_stack_unchanged() {
        let mut history = History::new();
        history.push(entry("/a"));

        assert!(matches!(history.pop_n(2), Err(EngineError::State(_))));
        assert_eq!(history.len(), 1);

        assert!(matches!(history.pop_n(0), Err(EngineError::State(_))));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_suppression_is_one_shot() {
        let mut history = History::new();
        history.suppress_next_push();
        assert!(!history.push(entry("/replayed")));
        assert!(history.is_empty());

        assert!(history.push(entry("/next")));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_replace_patches_top_entry() {
        let mut history = History::new();
        history.push(entry("/a"));
        history
            .replace(None, Some("patched".into()), "/a2".into())
            .unwrap();

        assert_eq!(history.len(), 1);
        let top = &history.entries()[0];
        assert_eq!(top.url, "/a2");
        assert_eq!(top.title.as_deref(), Some("patched"));
        // response and snapshot carried over
        assert_eq!(top.response.url, "/a");
        assert!(top.snapshot.as_deref().unwrap().contains("/a"));
    }

    #[test]
    fn test_replace_on_empty_history_fails() {
        let mut history = History::new();
        assert!(matches!(
            history.replace(None, None, "/x".into()),
            Err(EngineError::State(_))
        ));
    }

    #[test]
    fn test_forward_is_not_implemented() {
        let history = History::new();
        assert!(matches!(
            history.forward(1),
            Err(EngineError::NotImplemented(_))
        ));
    }
}
