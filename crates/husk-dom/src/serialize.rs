//! Tree serialization
//!
//! Walks a parsed `scraper` tree back into an HTML string, optionally
//! substituting edits (replace subtree, replace children, drop subtree)
//! at specific nodes. Patching is done here rather than by mutating the
//! tree in place: the caller reserializes with the edit applied and
//! re-adopts the resulting string, so the snapshot string stays ground
//! truth.

use std::collections::HashMap;

use ego_tree::{NodeId, NodeRef};
use scraper::node::Element;
use scraper::{Html, Node};

/// A pending substitution at one node.
#[derive(Debug, Clone)]
pub(crate) enum Edit {
    /// Replace the whole subtree with a raw HTML fragment.
    ReplaceOuter(String),
    /// Keep the element, replace its children with a raw HTML fragment.
    ReplaceInner(String),
    /// Drop the subtree entirely.
    Remove,
}

pub(crate) type Edits = HashMap<NodeId, Edit>;

/// Elements with no content model and no closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text children are emitted verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Serialize the whole tree.
pub(crate) fn serialize(html: &Html) -> String {
    serialize_with(html, &Edits::new())
}

/// Serialize the whole tree, substituting `edits` where they apply.
pub(crate) fn serialize_with(html: &Html, edits: &Edits) -> String {
    let mut out = String::new();
    for child in html.tree.root().children() {
        write_node(&mut out, child, edits, false);
    }
    out
}

fn write_node(out: &mut String, node: NodeRef<'_, Node>, edits: &Edits, raw_text: bool) {
    match edits.get(&node.id()) {
        Some(Edit::Remove) => return,
        Some(Edit::ReplaceOuter(fragment)) => {
            out.push_str(fragment);
            return;
        }
        Some(Edit::ReplaceInner(fragment)) => {
            if let Node::Element(el) = node.value() {
                write_open_tag(out, el);
                if !is_void(el.name()) {
                    out.push_str(fragment);
                    write_close_tag(out, el);
                }
            }
            return;
        }
        None => {}
    }

    match node.value() {
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_node(out, child, edits, raw_text);
            }
        }
        Node::Doctype(doctype) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(&doctype.name);
            out.push('>');
        }
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(&comment.comment);
            out.push_str("-->");
        }
        Node::Text(text) => {
            if raw_text {
                out.push_str(&text.text);
            } else {
                escape_text(&text.text, out);
            }
        }
        Node::Element(el) => {
            write_open_tag(out, el);
            if !is_void(el.name()) {
                let raw = RAW_TEXT_ELEMENTS.contains(&el.name());
                for child in node.children() {
                    write_node(out, child, edits, raw);
                }
                write_close_tag(out, el);
            }
        }
        Node::ProcessingInstruction(_) => {}
    }
}

fn write_open_tag(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(el.name());
    for (name, value) in el.attrs() {
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            escape_attr(value, out);
            out.push('"');
        }
    }
    out.push('>');
}

fn write_close_tag(out: &mut String, el: &Element) {
    out.push_str("</");
    out.push_str(el.name());
    out.push('>');
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

pub(crate) fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    fn node_id(html: &Html, selector: &str) -> NodeId {
        let sel = Selector::parse(selector).unwrap();
        html.select(&sel).next().unwrap().id()
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let source = "<html><head><title>T</title></head>\
                      <body><div id=\"a\"><p>hi</p></div></body></html>";
        let serialized = serialize(&parse(source));
        assert_eq!(serialized, source);
    }

    #[test]
    fn test_void_elements_have_no_close_tag() {
        let html = parse("<html><body><br><input type=\"text\"></body></html>");
        let serialized = serialize(&html);
        assert!(serialized.contains("<br>"));
        assert!(!serialized.contains("</br>"));
        assert!(!serialized.contains("</input>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let html = parse("<html><body><p>a &amp; b &lt;c&gt;</p></body></html>");
        let serialized = serialize(&html);
        assert!(serialized.contains("a &amp; b &lt;c&gt;"));
    }

    #[test]
    fn test_script_text_stays_raw() {
        let html = parse("<html><head><script>if (a < b) {}</script></head><body></body></html>");
        let serialized = serialize(&html);
        assert!(serialized.contains("if (a < b) {}"));
    }

    #[test]
    fn test_replace_outer_substitutes_subtree() {
        let html = parse("<html><body><div id=\"x\"><span>old</span></div></body></html>");
        let mut edits = Edits::new();
        edits.insert(node_id(&html, "#x"), Edit::ReplaceOuter("<p>new</p>".into()));
        let serialized = serialize_with(&html, &edits);
        assert!(serialized.contains("<p>new</p>"));
        assert!(!serialized.contains("old"));
    }

    #[test]
    fn test_replace_inner_keeps_element() {
        let html = parse("<html><body><div id=\"x\"><span>old</span></div></body></html>");
        let mut edits = Edits::new();
        edits.insert(node_id(&html, "#x"), Edit::ReplaceInner("<p>new</p>".into()));
        let serialized = serialize_with(&html, &edits);
        assert!(serialized.contains("<div id=\"x\"><p>new</p></div>"));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let html = parse("<html><body><div id=\"x\">gone</div><p>kept</p></body></html>");
        let mut edits = Edits::new();
        edits.insert(node_id(&html, "#x"), Edit::Remove);
        let serialized = serialize_with(&html, &edits);
        assert!(!serialized.contains("gone"));
        assert!(serialized.contains("kept"));
    }
}
