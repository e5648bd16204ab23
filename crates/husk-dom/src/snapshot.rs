//! The DOM snapshot
//!
//! One live instance per engine. The serialized-HTML string is the
//! canonical document; the parsed tree and the discovered form list are
//! caches that are rebuilt whenever the string changes. `set_snapshot`
//! is the only write path, so the caches cannot go stale.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use crate::controls::{self, ControlEdit, Form, Locator};
use crate::serialize::{self, Edit, Edits};
use crate::DomError;

#[derive(Default)]
pub struct DomSnapshot {
    /// Canonical serialized HTML. `None` until the first HTML navigation.
    html: Option<String>,
    /// Parsed tree, rebuilt by `set_snapshot`.
    tree: Option<Html>,
    /// Discovered forms, built on first access after a write.
    forms: Option<Vec<Form>>,
    title: Option<String>,
    base_href: Option<String>,
}

impl DomSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the canonical document.
    ///
    /// The sole mutation entry point: drops the form cache, reparses,
    /// and recomputes the document title and `<base href>`.
    pub fn set_snapshot(&mut self, html: Option<String>) {
        self.forms = None;
        self.title = None;
        self.base_href = None;
        self.tree = html.as_deref().map(Html::parse_document);
        self.html = html;

        if let Some(tree) = &self.tree {
            if let Ok(sel) = Selector::parse("title") {
                self.title = tree.select(&sel).next().map(|el| {
                    let text: String = el.text().collect();
                    text.trim().to_string()
                });
            }
            if let Ok(sel) = Selector::parse("base[href]") {
                self.base_href = tree
                    .select(&sel)
                    .next()
                    .and_then(|el| el.value().attr("href"))
                    .map(str::to_string);
            }
            tracing::debug!(
                title = self.title.as_deref().unwrap_or(""),
                len = self.html.as_deref().map(str::len).unwrap_or(0),
                "snapshot replaced"
            );
        }
    }

    /// The canonical serialized HTML, if a document is loaded.
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    /// Document title, recomputed on every write.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// `<base href>` of the current document, if any.
    pub fn base_href(&self) -> Option<&str> {
        self.base_href.as_deref()
    }

    fn tree(&self) -> Result<&Html, DomError> {
        self.tree.as_ref().ok_or(DomError::NoDocument)
    }

    /// Serialize the parsed tree back to HTML.
    ///
    /// Used by round-trip assertions; equals the snapshot string up to
    /// parser normalization.
    pub fn reserialize(&self) -> Result<String, DomError> {
        Ok(serialize::serialize(self.tree()?))
    }

    /// Resolve `selector` to exactly one element.
    fn query_one(&self, selector: &str) -> Result<NodeId, DomError> {
        let tree = self.tree()?;
        let sel = Selector::parse(selector)
            .map_err(|e| DomError::Selector(format!("{selector}: {e}")))?;
        let mut matches = tree.select(&sel);
        let first = matches.next().ok_or_else(|| DomError::ElementNotFound {
            selector: selector.to_string(),
        })?;
        let extra = matches.count();
        if extra > 0 {
            return Err(DomError::AmbiguousElement {
                selector: selector.to_string(),
                count: extra + 1,
            });
        }
        Ok(first.id())
    }

    /// How many elements `selector` currently matches.
    pub fn count_matches(&self, selector: &str) -> Result<usize, DomError> {
        let tree = self.tree()?;
        let sel = Selector::parse(selector)
            .map_err(|e| DomError::Selector(format!("{selector}: {e}")))?;
        Ok(tree.select(&sel).count())
    }

    fn apply_edit(&mut self, selector: &str, edit: Edit) -> Result<(), DomError> {
        let new_html = {
            let id = self.query_one(selector)?;
            let mut edits = Edits::new();
            edits.insert(id, edit);
            serialize::serialize_with(self.tree()?, &edits)
        };
        self.set_snapshot(Some(new_html));
        Ok(())
    }

    /// Replace the single element matched by `selector` with `fragment`.
    ///
    /// Zero matches or more than one leave the snapshot untouched and
    /// fail; silently picking one would mask a broken fixture.
    pub fn replace_at(&mut self, selector: &str, fragment: &str) -> Result<(), DomError> {
        tracing::debug!(selector, "replace_at");
        self.apply_edit(selector, Edit::ReplaceOuter(fragment.to_string()))
    }

    /// Remove the single element matched by `selector`.
    pub fn remove_at(&mut self, selector: &str) -> Result<(), DomError> {
        tracing::debug!(selector, "remove_at");
        self.apply_edit(selector, Edit::Remove)
    }

    /// Replace the children of the single element matched by `selector`,
    /// keeping the element itself.
    pub fn patch_inner(&mut self, selector: &str, fragment: &str) -> Result<(), DomError> {
        tracing::debug!(selector, "patch_inner");
        self.apply_edit(selector, Edit::ReplaceInner(fragment.to_string()))
    }

    /// Forms and controls discovered from the current document, in
    /// document order, with the detached pseudo-form last.
    pub fn forms(&mut self) -> Result<&[Form], DomError> {
        if self.forms.is_none() {
            let tree = self.tree.as_ref().ok_or(DomError::NoDocument)?;
            self.forms = Some(controls::discover(tree));
        }
        Ok(self.forms.as_deref().unwrap_or(&[]))
    }

    /// Write a control edit back into the live document.
    ///
    /// Tries the control's discovery query first, then the positional
    /// fallback recorded for attribute-less elements. Neither yielding
    /// exactly one element is a [`DomError::Sync`].
    pub fn commit_control_edit(
        &mut self,
        locator: &Locator,
        edit: &ControlEdit,
    ) -> Result<(), DomError> {
        let new_html = {
            let tree = self.tree()?;
            let id = controls::resolve(tree, locator)?;
            let node = tree
                .tree
                .get(id)
                .ok_or_else(|| DomError::Sync("resolved node vanished".into()))?;
            let el = ElementRef::wrap(node)
                .ok_or_else(|| DomError::Sync("resolved node is not an element".into()))?;
            let replacement = controls::rewrite_element(el, edit);
            let mut edits = Edits::new();
            edits.insert(id, Edit::ReplaceOuter(replacement));
            serialize::serialize_with(tree, &edits)
        };
        self.set_snapshot(Some(new_html));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<html><head><title>Demo</title><base href=\"/app/\"></head>\
         <body><div id=\"out\">old</div><p class=\"dup\">a</p><p class=\"dup\">b</p></body></html>";

    fn loaded() -> DomSnapshot {
        let mut snap = DomSnapshot::new();
        snap.set_snapshot(Some(PAGE.to_string()));
        snap
    }

    #[test]
    fn test_title_and_base_recomputed_on_set() {
        let snap = loaded();
        assert_eq!(snap.title(), Some("Demo"));
        assert_eq!(snap.base_href(), Some("/app/"));
    }

    #[test]
    fn test_no_document_errors() {
        let mut snap = DomSnapshot::new();
        assert!(matches!(
            snap.replace_at("#out", "<p>x</p>"),
            Err(DomError::NoDocument)
        ));
    }

    #[test]
    fn test_replace_at_swaps_subtree() {
        let mut snap = loaded();
        snap.replace_at("#out", "<div id=\"out\">new</div>").unwrap();
        assert!(snap.html().unwrap().contains("<div id=\"out\">new</div>"));
        // title survives the reparse
        assert_eq!(snap.title(), Some("Demo"));
    }

    #[test]
    fn test_patch_inner_keeps_element() {
        let mut snap = loaded();
        snap.patch_inner("#out", "<p>ok</p>").unwrap();
        assert!(snap.html().unwrap().contains("<div id=\"out\"><p>ok</p></div>"));
    }

    #[test]
    fn test_remove_at() {
        let mut snap = loaded();
        snap.remove_at("#out").unwrap();
        assert!(!snap.html().unwrap().contains("id=\"out\""));
    }

    #[test]
    fn test_zero_matches_is_not_found_and_snapshot_untouched() {
        let mut snap = loaded();
        let before = snap.html().unwrap().to_string();
        let err = snap.replace_at("#missing", "<p>x</p>").unwrap_err();
        assert!(matches!(err, DomError::ElementNotFound { .. }));
        assert_eq!(snap.html().unwrap(), before);
    }

    #[test]
    fn test_two_matches_is_ambiguous_and_snapshot_untouched() {
        let mut snap = loaded();
        let before = snap.html().unwrap().to_string();
        let err = snap.replace_at(".dup", "<p>x</p>").unwrap_err();
        match err {
            DomError::AmbiguousElement { count, .. } => assert_eq!(count, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(snap.html().unwrap(), before);
    }

    #[test]
    fn test_reserialize_round_trip() {
        let snap = loaded();
        let reserialized = snap.reserialize().unwrap();
        let strip = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(strip(&reserialized), strip(snap.html().unwrap()));
    }
}
