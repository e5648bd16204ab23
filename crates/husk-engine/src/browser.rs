//! The browser engine
//!
//! Explicit composition instead of the mixin soup a scripted browser
//! usually grows into: one `Browser` holding the transport, the DOM
//! snapshot, the history machine, the callback registry, and the
//! activity log, each behind a narrow interface.

use husk_dom::{ControlEdit, ControlKind, DomError, DomSnapshot, Form, Locator};
use husk_net::{NetError, Request, Response, Transport};
use serde_json::Value;
use url::Url;

use crate::activity::ActivityLog;
use crate::history::{History, HistoryEntry, NavigationState};
use crate::rpc::CallbackRegistry;
use crate::EngineError;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Raise [`EngineError::HttpStatus`] for responses with status >= 400.
    pub strict_status: bool,
    /// Downgrade control-edit sync failures to warnings.
    pub lenient_dom_sync: bool,
    /// Swallow missing-target errors when injecting RPC error messages.
    pub skip_injection_errors: bool,
    /// Redirect hop cap; exceeding it is fatal.
    pub max_redirects: u32,
    /// Default selector for RPC-delivered content fragments.
    pub content_target: String,
    /// Default selector for RPC-delivered error messages.
    pub error_target: String,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            strict_status: true,
            lenient_dom_sync: false,
            skip_injection_errors: false,
            max_redirects: 100,
            content_target: "#content".into(),
            error_target: "#errors".into(),
            user_agent: "husk/0.1".into(),
        }
    }
}

/// Browser builder
pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn strict_status(mut self, on: bool) -> Self {
        self.config.strict_status = on;
        self
    }

    pub fn lenient_dom_sync(mut self, on: bool) -> Self {
        self.config.lenient_dom_sync = on;
        self
    }

    pub fn skip_injection_errors(mut self, on: bool) -> Self {
        self.config.skip_injection_errors = on;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn content_target(mut self, selector: &str) -> Self {
        self.config.content_target = selector.to_string();
        self
    }

    pub fn error_target(mut self, selector: &str) -> Self {
        self.config.error_target = selector.to_string();
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn build(self, transport: Box<dyn Transport>) -> Browser {
        Browser {
            transport,
            snapshot: DomSnapshot::new(),
            history: History::new(),
            callbacks: CallbackRegistry::new(),
            activity: ActivityLog::new(),
            config: self.config,
            current: None,
            raw: None,
            queued_headers: Vec::new(),
            content_type_once: None,
            rpc_seq: 0,
        }
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The page the engine currently sits on.
#[derive(Debug, Clone)]
pub struct CurrentPage {
    pub response: Response,
    pub url: String,
    pub title: Option<String>,
    pub state: Option<NavigationState>,
}

/// A non-HTML response body, kept alongside the snapshot.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    /// Structured payload when the content type is a data-interchange
    /// format.
    pub decoded: Option<Value>,
}

/// Headless browser engine instance.
///
/// Single-threaded and fully synchronous: a nested call or navigation
/// triggered from inside a callback completes, including its own
/// history push and DOM patch, before control returns.
pub struct Browser {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) snapshot: DomSnapshot,
    pub(crate) history: History,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) activity: ActivityLog,
    pub(crate) config: BrowserConfig,
    pub(crate) current: Option<CurrentPage>,
    pub(crate) raw: Option<RawPayload>,
    /// Headers queued via `add_header`; only `Authorization` and
    /// `Accept-Language` survive a completed call.
    pub(crate) queued_headers: Vec<(String, String)>,
    /// Request-scoped `Content-Type` override, cleared after the call
    /// completes, success or failure.
    pub(crate) content_type_once: Option<String>,
    pub(crate) rpc_seq: u64,
}

impl Browser {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::builder().build(transport)
    }

    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    pub fn snapshot(&self) -> &DomSnapshot {
        &self.snapshot
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn clear_activity(&mut self) {
        self.activity.clear();
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&CurrentPage> {
        self.current.as_ref()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.url.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.current.as_ref().and_then(|c| c.title.as_deref())
    }

    /// Raw body of the last non-HTML response, if any.
    pub fn raw_payload(&self) -> Option<&RawPayload> {
        self.raw.as_ref()
    }

    /// Queue a header for outgoing requests. Everything except
    /// `Authorization` and `Accept-Language` is dropped again after the
    /// next call completes.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.queued_headers
            .push((name.to_string(), value.to_string()));
    }

    /// Override `Content-Type` for exactly the next call.
    pub fn set_content_type_once(&mut self, content_type: &str) {
        self.content_type_once = Some(content_type.to_string());
    }

    pub fn get(&mut self, url: &str) -> Result<Response, EngineError> {
        self.navigate("GET", url, None, &[])
    }

    pub fn post(&mut self, url: &str, body: Option<Vec<u8>>) -> Result<Response, EngineError> {
        self.navigate("POST", url, body, &[])
    }

    /// One full navigation: resolve, push the superseded state, send,
    /// follow redirects, hand the result to the snapshot layer.
    pub fn navigate(
        &mut self,
        method: &str,
        url: &str,
        body: Option<Vec<u8>>,
        headers: &[(String, String)],
    ) -> Result<Response, EngineError> {
        let result = self.navigate_inner(method, url, body, headers);
        // Per-call header state resets on success and failure alike.
        self.content_type_once = None;
        self.queued_headers.retain(|(name, _)| {
            name.eq_ignore_ascii_case("authorization")
                || name.eq_ignore_ascii_case("accept-language")
        });
        result
    }

    fn navigate_inner(
        &mut self,
        method: &str,
        url: &str,
        body: Option<Vec<u8>>,
        extra: &[(String, String)],
    ) -> Result<Response, EngineError> {
        let target = self.resolve_url(url)?;
        let method = method.to_uppercase();

        let mut headers: Vec<(String, String)> = Vec::new();
        headers.push(("User-Agent".into(), self.config.user_agent.clone()));
        if let Some(current) = &self.current {
            headers.push(("Referer".into(), current.url.clone()));
        }
        if let Some(ct) = self.content_type_once.take() {
            headers.push(("Content-Type".into(), ct));
        }
        headers.extend(self.queued_headers.iter().cloned());
        headers.extend(extra.iter().cloned());

        // History entries always represent completed states, so the
        // about-to-be-superseded page is captured before sending.
        self.push_current();

        self.activity.record(format!("{method} {target}"));
        let mut request = Request {
            method,
            url: target.to_string(),
            headers: headers.clone(),
            body,
        };
        let mut response = self.transport.execute(&request)?;

        let mut hops = 0u32;
        while response.is_redirect() {
            let Some(location) = response.header("Location").map(str::to_string) else {
                break;
            };
            hops += 1;
            if hops > self.config.max_redirects {
                return Err(EngineError::RedirectLoop {
                    hops: self.config.max_redirects,
                });
            }
            let base = Url::parse(&response.url)
                .map_err(|e| NetError::InvalidUrl(format!("{}: {e}", response.url)))?;
            let next = base
                .join(&location)
                .map_err(|e| NetError::InvalidUrl(format!("{location}: {e}")))?;
            self.activity
                .record(format!("redirect {} -> {next}", response.status));

            request = Request {
                method: "GET".into(),
                url: next.to_string(),
                headers: headers
                    .iter()
                    .filter(|(n, _)| !n.eq_ignore_ascii_case("content-type"))
                    .cloned()
                    .collect(),
                body: None,
            };
            response = self.transport.execute(&request)?;
        }

        self.apply_response(&response);

        if self.config.strict_status && response.status >= 400 {
            return Err(EngineError::HttpStatus {
                status: response.status,
                url: response.url.clone(),
            });
        }
        Ok(response)
    }

    /// Resolve against the current document's effective base: its
    /// `<base href>` when present, else the last navigated URL.
    fn resolve_url(&self, raw: &str) -> Result<Url, EngineError> {
        if let Ok(absolute) = Url::parse(raw) {
            return Ok(absolute);
        }
        let current = self.current.as_ref().ok_or_else(|| {
            EngineError::State(format!("relative URL `{raw}` with no prior navigation"))
        })?;
        let current_url = Url::parse(&current.url)
            .map_err(|e| NetError::InvalidUrl(format!("{}: {e}", current.url)))?;
        let base = match self.snapshot.base_href() {
            Some(href) => current_url
                .join(href)
                .map_err(|e| NetError::InvalidUrl(format!("{href}: {e}")))?,
            None => current_url,
        };
        base.join(raw)
            .map_err(|e| NetError::InvalidUrl(format!("{raw}: {e}")).into())
    }

    fn push_current(&mut self) {
        if let Some(current) = &self.current {
            let entry = HistoryEntry {
                response: current.response.clone(),
                snapshot: self.snapshot.html().map(str::to_string),
                state: current.state.clone(),
                title: current.title.clone(),
                url: current.url.clone(),
            };
            self.history.push(entry);
        }
    }

    /// Hand a completed response to the snapshot layer.
    fn apply_response(&mut self, response: &Response) {
        if response.is_html() {
            self.snapshot.set_snapshot(Some(response.body_text()));
            self.raw = None;
            self.current = Some(CurrentPage {
                response: response.clone(),
                url: response.url.clone(),
                title: self.snapshot.title().map(str::to_string),
                state: None,
            });
        } else {
            // Data-protocol responses do not replace the snapshot; the
            // page identity only moves if the payload pushes a state.
            let decoded = response
                .is_json()
                .then(|| serde_json::from_slice(&response.body).ok())
                .flatten();
            self.raw = Some(RawPayload {
                bytes: response.body.clone(),
                decoded,
            });
            if self.current.is_none() {
                self.current = Some(CurrentPage {
                    response: response.clone(),
                    url: response.url.clone(),
                    title: None,
                    state: None,
                });
            }
        }
    }

    /// Pop `n` entries, restore the final one, and replay its
    /// navigation state: a recorded RPC call, a bare GET, or nothing.
    pub fn back(&mut self, n: usize) -> Result<(), EngineError> {
        let entry = self.history.pop_n(n)?;
        self.activity.record(format!("back({n}) -> {}", entry.url));

        self.snapshot.set_snapshot(entry.snapshot.clone());
        self.current = Some(CurrentPage {
            response: entry.response.clone(),
            url: entry.url.clone(),
            title: entry.title.clone(),
            state: entry.state.clone(),
        });

        if let Some(state) = entry.state {
            if let Some(cb_url) = state.cb_url {
                // Replaying must not re-enter history.
                self.history.suppress_next_push();
                let method = state.rpc_method.unwrap_or_else(|| "load".into());
                let params = state.rpc_params.unwrap_or(Value::Null);
                self.call_dispatching(
                    &cb_url,
                    &method,
                    params,
                    state.on_success.as_deref(),
                    state.on_error.as_deref(),
                )?;
            } else if !state.url.is_empty() {
                self.history.suppress_next_push();
                self.get(&state.url)?;
            }
        }
        Ok(())
    }

    /// Forward navigation is deliberately unsupported: the engine keeps
    /// no forward stack.
    pub fn forward(&mut self, n: usize) -> Result<(), EngineError> {
        self.history.forward(n)
    }

    /// Patch the most recent history entry in place of pushing a new
    /// one.
    pub fn replace_state(
        &mut self,
        state: Option<NavigationState>,
        title: Option<String>,
        url: String,
    ) -> Result<(), EngineError> {
        self.activity.record(format!("replaceState {url}"));
        self.history.replace(state, title, url)
    }

    /// Forms of the current document, in document order, detached
    /// pseudo-form last.
    pub fn forms(&mut self) -> Result<Vec<Form>, EngineError> {
        Ok(self.snapshot.forms()?.to_vec())
    }

    /// Set a field's value and write it back into the snapshot.
    pub fn set_field(
        &mut self,
        form_index: usize,
        name: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let control = self.find_control(form_index, name)?;
        match control.kind {
            ControlKind::Select => {
                let chosen = control
                    .options
                    .iter()
                    .find(|o| o.value == value)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::State(format!("select `{name}` has no option `{value}`"))
                    })?;
                for option in control.options.iter().filter(|o| o.selected) {
                    self.commit_edit(&option.locator, &ControlEdit::SetChecked(false))?;
                }
                self.commit_edit(&chosen.locator, &ControlEdit::SetChecked(true))
            }
            ControlKind::Checkbox | ControlKind::Radio => {
                let on = matches!(value, "on" | "true" | "1");
                self.commit_edit(&control.locator, &ControlEdit::SetChecked(on))
            }
            _ => self.commit_edit(&control.locator, &ControlEdit::SetValue(value.to_string())),
        }
    }

    /// Check or uncheck a checkbox/radio control.
    pub fn set_checked(
        &mut self,
        form_index: usize,
        name: &str,
        on: bool,
    ) -> Result<(), EngineError> {
        let control = self.find_control(form_index, name)?;
        self.commit_edit(&control.locator, &ControlEdit::SetChecked(on))
    }

    fn find_control(
        &mut self,
        form_index: usize,
        name: &str,
    ) -> Result<husk_dom::Control, EngineError> {
        let forms = self.snapshot.forms()?;
        let form = forms
            .get(form_index)
            .ok_or_else(|| EngineError::State(format!("no form at index {form_index}")))?;
        form.control(name)
            .cloned()
            .ok_or_else(|| EngineError::State(format!("form {form_index} has no field `{name}`")))
    }

    fn commit_edit(&mut self, locator: &Locator, edit: &ControlEdit) -> Result<(), EngineError> {
        match self.snapshot.commit_control_edit(locator, edit) {
            Err(DomError::Sync(msg)) if self.config.lenient_dom_sync => {
                tracing::warn!(%msg, "control edit skipped");
                self.activity.record(format!("control edit skipped: {msg}"));
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }

    /// Serialize a form's control values and send it through the
    /// pipeline.
    pub fn submit(&mut self, form_index: usize) -> Result<Response, EngineError> {
        let form = {
            let forms = self.snapshot.forms()?;
            forms
                .get(form_index)
                .cloned()
                .ok_or_else(|| EngineError::State(format!("no form at index {form_index}")))?
        };
        if form.detached {
            return Err(EngineError::State(
                "cannot submit the detached pseudo-form: no enclosing <form>".into(),
            ));
        }

        let mut pairs: Vec<(String, String)> = Vec::new();
        for control in &form.controls {
            let Some(name) = &control.name else { continue };
            match control.kind {
                ControlKind::Submit | ControlKind::Button => {}
                ControlKind::Checkbox | ControlKind::Radio => {
                    if control.checked {
                        let value = if control.value.is_empty() {
                            "on".to_string()
                        } else {
                            control.value.clone()
                        };
                        pairs.push((name.clone(), value));
                    }
                }
                _ => pairs.push((name.clone(), control.value.clone())),
            }
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())))
            .finish();

        let action = form
            .action
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| self.current.as_ref().map(|c| c.url.clone()))
            .ok_or_else(|| EngineError::State("form has no action and no current URL".into()))?;
        self.activity
            .record(format!("submit form {} -> {action}", form.index));

        if form.method == "POST" {
            self.set_content_type_once("application/x-www-form-urlencoded");
            self.navigate("POST", &action, Some(encoded.into_bytes()), &[])
        } else {
            let target = if encoded.is_empty() {
                action
            } else {
                format!("{action}?{encoded}")
            };
            self.navigate("GET", &target, None, &[])
        }
    }
}
