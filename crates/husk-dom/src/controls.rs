//! Form and control discovery
//!
//! Controls are tracked independently of the raw DOM and re-synced to
//! it on demand. Discovery walks the parsed tree in document order;
//! each control records a locator so a later edit can find the same
//! element again in whatever the snapshot has become.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use crate::serialize::{escape_attr, escape_text};
use crate::DomError;

const CONTROL_QUERY: &str = "input, textarea, select, button";

/// A form discovered from the snapshot.
#[derive(Debug, Clone)]
pub struct Form {
    /// Position in the discovered list (document order).
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: Option<String>,
    /// Upper-cased method, `GET` when unspecified.
    pub method: String,
    /// The synthetic pseudo-form holding controls outside any `<form>`.
    /// It has no enclosing form and therefore cannot be submitted.
    pub detached: bool,
    pub controls: Vec<Control>,
}

impl Form {
    /// First control with the given `name` attribute.
    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.name.as_deref() == Some(name))
    }
}

/// What kind of interactive element a control is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Password,
    Hidden,
    Checkbox,
    Radio,
    Submit,
    Button,
    Textarea,
    Select,
    Other,
}

/// One interactive element, tracked independently of the raw DOM.
#[derive(Debug, Clone)]
pub struct Control {
    pub tag: String,
    pub kind: ControlKind,
    pub name: Option<String>,
    /// Current value as of discovery time.
    pub value: String,
    pub checked: bool,
    /// Options of a `<select>`; empty for everything else.
    pub options: Vec<SelectOption>,
    pub locator: Locator,
}

/// One `<option>` of a select control.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
    pub locator: Locator,
}

/// How to find a control's live element in the current snapshot.
///
/// The primary query is rebuilt from the tag and identifying attributes
/// present at discovery. Elements without id/name also record where
/// they sat among their same-tag siblings, so they can be found again
/// through their parent when the primary query is not unique.
#[derive(Debug, Clone)]
pub struct Locator {
    pub query: String,
    pub fallback: Option<OrdinalFallback>,
}

#[derive(Debug, Clone)]
pub struct OrdinalFallback {
    pub parent_query: String,
    pub tag: String,
    pub ordinal: usize,
}

/// An edit to write back into the snapshot.
#[derive(Debug, Clone)]
pub enum ControlEdit {
    SetValue(String),
    SetChecked(bool),
}

/// Collect all forms in document order, then append the detached
/// pseudo-form holding controls that sit outside any `<form>`.
pub(crate) fn discover(tree: &Html) -> Vec<Form> {
    let (Ok(form_sel), Ok(control_sel)) =
        (Selector::parse("form"), Selector::parse(CONTROL_QUERY))
    else {
        return Vec::new();
    };

    let mut forms: Vec<Form> = Vec::new();
    for form_el in tree.select(&form_sel) {
        let el = form_el.value();
        let mut form = Form {
            index: forms.len(),
            id: el.attr("id").map(str::to_string),
            name: el.attr("name").map(str::to_string),
            action: el.attr("action").map(str::to_string),
            method: el.attr("method").unwrap_or("GET").to_uppercase(),
            detached: false,
            controls: Vec::new(),
        };
        for ctl in form_el.select(&control_sel) {
            form.controls.push(build_control(ctl));
        }
        forms.push(form);
    }

    let mut detached = Form {
        index: forms.len(),
        id: None,
        name: None,
        action: None,
        method: "GET".into(),
        detached: true,
        controls: Vec::new(),
    };
    for ctl in tree.select(&control_sel) {
        let inside_form = ctl
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| e.name() == "form"));
        if !inside_form {
            detached.controls.push(build_control(ctl));
        }
    }
    forms.push(detached);

    tracing::debug!(forms = forms.len() - 1, "control discovery");
    forms
}

fn build_control(el: ElementRef) -> Control {
    let tag = el.value().name().to_string();
    let kind = match tag.as_str() {
        "textarea" => ControlKind::Textarea,
        "select" => ControlKind::Select,
        "button" => ControlKind::Button,
        "input" => match el.value().attr("type").unwrap_or("text") {
            "checkbox" => ControlKind::Checkbox,
            "radio" => ControlKind::Radio,
            "hidden" => ControlKind::Hidden,
            "password" => ControlKind::Password,
            "submit" => ControlKind::Submit,
            "button" => ControlKind::Button,
            _ => ControlKind::Text,
        },
        _ => ControlKind::Other,
    };

    let options = if kind == ControlKind::Select {
        select_options(el)
    } else {
        Vec::new()
    };

    let value = match kind {
        // Tree-aware extraction: all descendant text, so nested markup
        // ahead of the first plain text node does not swallow the value.
        ControlKind::Textarea => el.text().collect::<String>(),
        ControlKind::Select => options
            .iter()
            .find(|o| o.selected)
            .or_else(|| options.first())
            .map(|o| o.value.clone())
            .unwrap_or_default(),
        _ => el.value().attr("value").unwrap_or("").to_string(),
    };

    Control {
        kind,
        name: el.value().attr("name").map(str::to_string),
        value,
        checked: el.value().attr("checked").is_some(),
        options,
        locator: build_locator(el, &tag),
        tag,
    }
}

fn select_options(select: ElementRef) -> Vec<SelectOption> {
    let Ok(option_sel) = Selector::parse("option") else {
        return Vec::new();
    };
    select
        .select(&option_sel)
        .map(|opt| {
            let label: String = opt.text().collect::<String>().trim().to_string();
            SelectOption {
                value: opt
                    .value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| label.clone()),
                selected: opt.value().attr("selected").is_some(),
                locator: build_locator(opt, "option"),
                label,
            }
        })
        .collect()
}

/// Attributes worth putting into a discovery query.
fn attr_query(el: ElementRef, tag: &str) -> String {
    let mut query = tag.to_string();
    let mut attrs: Vec<&str> = vec!["id", "name", "type"];
    if tag == "option" {
        attrs.push("value");
    }
    for attr in attrs {
        if let Some(value) = el.value().attr(attr) {
            if !value.contains('"') {
                query.push_str(&format!("[{attr}=\"{value}\"]"));
            }
        }
    }
    query
}

fn build_locator(el: ElementRef, tag: &str) -> Locator {
    let query = attr_query(el, tag);
    let identifying =
        el.value().attr("id").is_some() || el.value().attr("name").is_some();

    // Positional fallback only for elements without stable attributes,
    // e.g. an option inside a select. A reordering patch can desync it;
    // callers opting out of hard failures accept that.
    let fallback = if identifying {
        None
    } else {
        el.parent()
            .and_then(ElementRef::wrap)
            .map(|parent| OrdinalFallback {
                parent_query: attr_query(parent, parent.value().name()),
                tag: tag.to_string(),
                ordinal: el
                    .prev_siblings()
                    .filter(|s| {
                        s.value().as_element().is_some_and(|e| e.name() == tag)
                    })
                    .count(),
            })
    };

    Locator { query, fallback }
}

/// Find the locator's element in the current tree.
///
/// Primary query must match exactly one element; otherwise the ordinal
/// fallback is tried. Neither being unique is a sync failure.
pub(crate) fn resolve(tree: &Html, locator: &Locator) -> Result<NodeId, DomError> {
    if let Ok(sel) = Selector::parse(&locator.query) {
        let mut matches = tree.select(&sel);
        if let (Some(only), None) = (matches.next(), matches.next()) {
            return Ok(only.id());
        }
    }

    if let Some(fb) = &locator.fallback {
        if let Ok(sel) = Selector::parse(&fb.parent_query) {
            let mut parents = tree.select(&sel);
            if let (Some(parent), None) = (parents.next(), parents.next()) {
                let child = parent
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == fb.tag)
                    .nth(fb.ordinal);
                if let Some(child) = child {
                    tracing::trace!(query = %locator.query, ordinal = fb.ordinal, "ordinal fallback hit");
                    return Ok(child.id());
                }
            }
        }
    }

    Err(DomError::Sync(format!(
        "no unique match for `{}`",
        locator.query
    )))
}

/// Regenerate the element's outer HTML with the edit applied.
pub(crate) fn rewrite_element(el: ElementRef, edit: &ControlEdit) -> String {
    let tag = el.value().name();
    match (tag, edit) {
        ("textarea", ControlEdit::SetValue(value)) => {
            let mut out = open_tag(el, None);
            escape_text(value, &mut out);
            out.push_str("</textarea>");
            out
        }
        ("input", ControlEdit::SetValue(value)) => open_tag(el, Some(("value", Some(value)))),
        ("input", ControlEdit::SetChecked(on)) => {
            open_tag(el, Some(("checked", if *on { Some("") } else { None })))
        }
        ("option", ControlEdit::SetChecked(on)) => {
            let mut out = open_tag(el, Some(("selected", if *on { Some("") } else { None })));
            out.push_str(&el.inner_html());
            out.push_str("</option>");
            out
        }
        (_, ControlEdit::SetValue(value)) => {
            let mut out = open_tag(el, Some(("value", Some(value))));
            out.push_str(&el.inner_html());
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            out
        }
        (_, ControlEdit::SetChecked(on)) => {
            let mut out = open_tag(el, Some(("checked", if *on { Some("") } else { None })));
            out.push_str(&el.inner_html());
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            out
        }
    }
}

/// Rebuild an element's open tag, optionally setting (`Some`) or
/// dropping (`None`) one attribute.
fn open_tag(el: ElementRef, override_attr: Option<(&str, Option<&str>)>) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(el.value().name());

    let mut emitted = false;
    for (name, value) in el.value().attrs() {
        let value = match override_attr {
            Some((over, replacement)) if over == name => {
                emitted = true;
                match replacement {
                    Some(v) => v,
                    None => continue,
                }
            }
            _ => value,
        };
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            escape_attr(value, &mut out);
            out.push('"');
        }
    }
    if let Some((name, Some(value))) = override_attr {
        if !emitted {
            out.push(' ');
            out.push_str(name);
            if !value.is_empty() {
                out.push_str("=\"");
                escape_attr(value, &mut out);
                out.push('"');
            }
        }
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    const FORM_PAGE: &str = r#"<html><body>
        <form id="login" action="/login" method="post">
            <input type="text" name="user" value="bob">
            <input type="password" name="pw">
            <textarea name="bio"><b>bold</b> plain tail</textarea>
            <select name="lang">
                <option value="en" selected>English</option>
                <option value="de">German</option>
            </select>
            <input type="checkbox" name="stay" checked>
            <input type="submit" value="Go">
        </form>
        <input type="text" name="orphan" value="loose">
    </body></html>"#;

    #[test]
    fn test_discovery_order_and_detached_form_last() {
        let forms = discover(&parse(FORM_PAGE));
        assert_eq!(forms.len(), 2);
        assert!(!forms[0].detached);
        assert_eq!(forms[0].id.as_deref(), Some("login"));
        assert_eq!(forms[0].method, "POST");
        assert!(forms[1].detached);
        assert_eq!(forms[1].controls.len(), 1);
        assert_eq!(forms[1].controls[0].name.as_deref(), Some("orphan"));
    }

    #[test]
    fn test_textarea_value_is_tree_aware() {
        let forms = discover(&parse(FORM_PAGE));
        let bio = forms[0].control("bio").unwrap();
        // textarea content is RCDATA: the markup stays as literal text,
        // and descendant-aware extraction keeps all of it.
        assert_eq!(bio.value, "<b>bold</b> plain tail");
        assert_eq!(bio.kind, ControlKind::Textarea);
    }

    #[test]
    fn test_select_value_is_selected_option() {
        let forms = discover(&parse(FORM_PAGE));
        let lang = forms[0].control("lang").unwrap();
        assert_eq!(lang.kind, ControlKind::Select);
        assert_eq!(lang.value, "en");
        assert_eq!(lang.options.len(), 2);
        assert_eq!(lang.options[1].label, "German");
        assert!(!lang.options[1].selected);
    }

    #[test]
    fn test_checkbox_state() {
        let forms = discover(&parse(FORM_PAGE));
        let stay = forms[0].control("stay").unwrap();
        assert_eq!(stay.kind, ControlKind::Checkbox);
        assert!(stay.checked);
    }

    #[test]
    fn test_named_control_resolves_by_query() {
        let tree = parse(FORM_PAGE);
        let forms = discover(&tree);
        let user = forms[0].control("user").unwrap();
        assert!(user.locator.fallback.is_none());
        assert!(resolve(&tree, &user.locator).is_ok());
    }

    #[test]
    fn test_option_resolves_by_ordinal_fallback() {
        let html = r#"<html><body><form><select name="s">
            <option>one</option><option>two</option>
        </select></form></body></html>"#;
        let tree = parse(html);
        let forms = discover(&tree);
        let control = forms[0].control("s").unwrap();
        let second = &control.options[1];
        let fb = second.locator.fallback.as_ref().unwrap();
        assert_eq!(fb.ordinal, 1);
        assert!(resolve(&tree, &second.locator).is_ok());
    }

    #[test]
    fn test_unresolvable_locator_is_sync_error() {
        let tree = parse("<html><body><p>no controls</p></body></html>");
        let locator = Locator {
            query: "input[name=\"ghost\"]".into(),
            fallback: None,
        };
        assert!(matches!(resolve(&tree, &locator), Err(DomError::Sync(_))));
    }

    #[test]
    fn test_rewrite_input_value() {
        let tree = parse(r#"<html><body><input type="text" name="q" value="old"></body></html>"#);
        let sel = Selector::parse("input").unwrap();
        let el = tree.select(&sel).next().unwrap();
        let rendered = rewrite_element(el, &ControlEdit::SetValue("new".into()));
        assert!(rendered.contains("value=\"new\""));
        assert!(!rendered.contains("old"));
        assert!(rendered.contains("name=\"q\""));
    }

    #[test]
    fn test_rewrite_textarea_escapes_value() {
        let tree = parse("<html><body><textarea name=\"t\">x</textarea></body></html>");
        let sel = Selector::parse("textarea").unwrap();
        let el = tree.select(&sel).next().unwrap();
        let rendered = rewrite_element(el, &ControlEdit::SetValue("a < b".into()));
        assert_eq!(rendered, "<textarea name=\"t\">a &lt; b</textarea>");
    }

    #[test]
    fn test_rewrite_unchecks_checkbox() {
        let tree =
            parse(r#"<html><body><input type="checkbox" name="c" checked></body></html>"#);
        let sel = Selector::parse("input").unwrap();
        let el = tree.select(&sel).next().unwrap();
        let rendered = rewrite_element(el, &ControlEdit::SetChecked(false));
        assert!(!rendered.contains("checked"));
    }
}
