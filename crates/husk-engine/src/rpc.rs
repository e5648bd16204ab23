//! JSON-RPC simulation and callback dispatch
//!
//! Simulates the async call/response cycle client-side script would
//! run: a `{method, params, id}` envelope goes out as a POST, the
//! decoded `{result}` or `{error}` envelope is routed to a named
//! callback (or a built-in render handler), and the callback patches
//! the DOM or triggers further navigation. Nothing is deferred; "async"
//! only means the caller does not receive the result directly.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::SystemTime;

use serde::Deserialize;
use serde_json::Value;

use crate::browser::Browser;
use crate::history::NavigationState;
use crate::EngineError;

/// Name the built-in success handler answers to.
pub const DEFAULT_SUCCESS_HANDLER: &str = "renderContentSuccess";
/// Name the built-in error handler answers to.
pub const DEFAULT_ERROR_HANDLER: &str = "renderContentError";

/// A registered callback: gets the engine and the decoded payload.
pub type CallbackFn = dyn Fn(&mut Browser, &Value) -> Result<(), EngineError>;

/// Typed map from callback name to handler.
///
/// Registering an existing name without the override flag is an error
/// and leaves the existing registration unchanged, so accidental
/// shadowing is caught at registration time.
#[derive(Default)]
pub struct CallbackRegistry {
    map: HashMap<String, Rc<CallbackFn>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, callback: Rc<CallbackFn>) -> Result<(), EngineError> {
        if self.map.contains_key(name) {
            return Err(EngineError::DuplicateCallback(name.to_string()));
        }
        self.map.insert(name.to_string(), callback);
        Ok(())
    }

    pub fn register_override(&mut self, name: &str, callback: Rc<CallbackFn>) {
        self.map.insert(name.to_string(), callback);
    }

    pub fn get(&self, name: &str) -> Option<Rc<CallbackFn>> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

/// `result.state` as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WireState {
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "cbURL")]
    cb_url: Option<String>,
    method: Option<String>,
    params: Option<Value>,
    #[serde(rename = "onSuccess")]
    on_success: Option<String>,
    #[serde(rename = "onError")]
    on_error: Option<String>,
    #[serde(rename = "onTimeout")]
    on_timeout: Option<String>,
}

impl Browser {
    /// Register a named callback. Fails on duplicate names.
    pub fn register_callback<F>(&mut self, name: &str, callback: F) -> Result<(), EngineError>
    where
        F: Fn(&mut Browser, &Value) -> Result<(), EngineError> + 'static,
    {
        self.callbacks.register(name, Rc::new(callback))
    }

    /// Register a named callback, replacing any existing registration.
    pub fn register_callback_override<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&mut Browser, &Value) -> Result<(), EngineError> + 'static,
    {
        self.callbacks.register_override(name, Rc::new(callback));
    }

    /// One simulated RPC round trip.
    ///
    /// Without callback names the call is synchronous: the decoded
    /// `result` comes back, or the decoded `error` surfaces as
    /// [`EngineError::Rpc`]. With a name the decoded payload is routed
    /// to that callback (falling back to the built-in render handlers)
    /// and the caller gets nothing.
    pub fn call(
        &mut self,
        url: &str,
        method: &str,
        params: Value,
        on_success: Option<&str>,
        on_error: Option<&str>,
    ) -> Result<Option<Value>, EngineError> {
        let dispatch = on_success.is_some() || on_error.is_some();
        self.call_impl(url, method, params, on_success, on_error, dispatch)
    }

    /// RPC round trip whose outcome is always routed through the
    /// render handlers, the way a scripted form submit behaves.
    pub fn call_with_defaults(
        &mut self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<(), EngineError> {
        self.call_impl(url, method, params, None, None, true)?;
        Ok(())
    }

    /// Replay path used by `back`: dispatches regardless of names.
    pub(crate) fn call_dispatching(
        &mut self,
        url: &str,
        method: &str,
        params: Value,
        on_success: Option<&str>,
        on_error: Option<&str>,
    ) -> Result<Option<Value>, EngineError> {
        self.call_impl(url, method, params, on_success, on_error, true)
    }

    fn call_impl(
        &mut self,
        url: &str,
        method: &str,
        params: Value,
        on_success: Option<&str>,
        on_error: Option<&str>,
        dispatch: bool,
    ) -> Result<Option<Value>, EngineError> {
        self.rpc_seq += 1;
        let envelope = serde_json::json!({
            "method": method,
            "params": params,
            "id": self.rpc_seq.to_string(),
        });
        let body = serde_json::to_vec(&envelope).map_err(|e| EngineError::Rpc {
            message: format!("could not encode envelope: {e}"),
            data: Value::Null,
        })?;

        self.activity.record(format!("rpc {method} {url}"));
        self.set_content_type_once("application/json");
        let response = self.navigate("POST", url, Some(body), &[])?;

        let decoded: Value = serde_json::from_slice(&response.body).map_err(|e| {
            EngineError::Rpc {
                message: format!("invalid rpc envelope: {e}"),
                data: Value::Null,
            }
        })?;

        if let Some(result) = decoded.get("result") {
            let result = result.clone();
            self.adopt_state(&result)?;
            if !dispatch {
                return Ok(Some(result));
            }
            self.dispatch_success(on_success, &result)?;
            return Ok(None);
        }

        let error = decoded.get("error").cloned().unwrap_or(Value::Null);
        if !dispatch {
            return Err(EngineError::Rpc {
                message: error_message(&error),
                data: error,
            });
        }
        self.dispatch_error(on_error, &error)?;
        Ok(None)
    }

    fn dispatch_success(&mut self, name: Option<&str>, result: &Value) -> Result<(), EngineError> {
        if let Some(name) = name {
            if let Some(callback) = self.callbacks.get(name) {
                self.activity.record(format!("callback {name}"));
                return (*callback)(self, result);
            }
        }
        self.render_content_success(result)
    }

    fn dispatch_error(&mut self, name: Option<&str>, error: &Value) -> Result<(), EngineError> {
        if let Some(name) = name {
            if let Some(callback) = self.callbacks.get(name) {
                self.activity.record(format!("callback {name}"));
                return (*callback)(self, error);
            }
        }
        self.render_content_error(error)
    }

    /// Built-in success handler: follow `nextURL`, chain
    /// `nextContentURL`, or patch `content` into its target selector.
    fn render_content_success(&mut self, result: &Value) -> Result<(), EngineError> {
        if let Some(next) = result.get("nextURL").and_then(Value::as_str) {
            let next = next.to_string();
            self.get(&next)?;
            return Ok(());
        }
        if let Some(next) = result.get("nextContentURL").and_then(Value::as_str) {
            let next = next.to_string();
            self.call_dispatching(&next, "load", Value::Null, None, None)?;
            return Ok(());
        }
        if let Some(content) = result.get("content").and_then(Value::as_str) {
            let target = result
                .get("contentTargetExpression")
                .and_then(Value::as_str)
                .unwrap_or(self.config.content_target.as_str())
                .to_string();
            let content = content.to_string();
            self.snapshot.patch_inner(&target, &content)?;
            self.activity.record(format!("content -> {target}"));
        }
        Ok(())
    }

    /// Built-in error handler: follow `error.data.nextURL` or inject
    /// the message into the error target selector.
    fn render_content_error(&mut self, error: &Value) -> Result<(), EngineError> {
        let message = error_message(error);
        let data = error.get("data").cloned().unwrap_or(Value::Null);

        if let Some(next) = data.get("nextURL").and_then(Value::as_str) {
            let next = next.to_string();
            self.get(&next)?;
            return Ok(());
        }

        let target = data
            .get("errorTargetExpression")
            .and_then(Value::as_str)
            .unwrap_or(self.config.error_target.as_str())
            .to_string();
        let fragment = format!("<p class=\"rpc-error\">{}</p>", escape_html(&message));

        match self.snapshot.patch_inner(&target, &fragment) {
            Ok(()) => {
                self.activity.record(format!("error -> {target}"));
                Ok(())
            }
            // A missing target usually means a broken fixture; only an
            // explicit opt-in turns it into a warning.
            Err(e) if self.config.skip_injection_errors => {
                tracing::warn!(error = %e, target, "error injection skipped");
                self.activity.record(format!("error injection skipped: {e}"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `result.state` turns into a NavigationState: the page identity
    /// moves to the pushed url/title without a fetch, and the state is
    /// captured into history when this page is next superseded.
    fn adopt_state(&mut self, result: &Value) -> Result<(), EngineError> {
        let Some(raw) = result.get("state") else {
            return Ok(());
        };
        let wire: WireState =
            serde_json::from_value(raw.clone()).map_err(|e| EngineError::Rpc {
                message: format!("invalid state object: {e}"),
                data: raw.clone(),
            })?;
        if wire.on_timeout.is_some() {
            tracing::trace!("onTimeout handler ignored");
        }

        let url = match &wire.url {
            Some(u) => self.resolve_state_url(u)?,
            None => self
                .current
                .as_ref()
                .map(|c| c.url.clone())
                .unwrap_or_default(),
        };
        let state = NavigationState {
            url: url.clone(),
            title: wire.title.clone().unwrap_or_default(),
            cb_url: wire.cb_url,
            rpc_method: wire.method,
            rpc_params: wire.params,
            on_success: wire.on_success,
            on_error: wire.on_error,
            timestamp: SystemTime::now(),
        };
        self.activity.record(format!("pushState {url}"));

        if let Some(current) = self.current.as_mut() {
            current.url = url;
            if !state.title.is_empty() {
                current.title = Some(state.title.clone());
            }
            current.state = Some(state);
        }
        Ok(())
    }

    fn resolve_state_url(&self, raw: &str) -> Result<String, EngineError> {
        match url::Url::parse(raw) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(_) => {
                let current = self.current.as_ref().ok_or_else(|| {
                    EngineError::State(format!("relative state URL `{raw}` with no current page"))
                })?;
                let base = url::Url::parse(&current.url).map_err(|e| {
                    husk_net::NetError::InvalidUrl(format!("{}: {e}", current.url))
                })?;
                Ok(base
                    .join(raw)
                    .map_err(|e| husk_net::NetError::InvalidUrl(format!("{raw}: {e}")))?
                    .to_string())
            }
        }
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("i18nMessage")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_i18n() {
        let error = serde_json::json!({
            "message": "raw",
            "i18nMessage": "übersetzt",
        });
        assert_eq!(error_message(&error), "übersetzt");

        let error = serde_json::json!({ "message": "raw" });
        assert_eq!(error_message(&error), "raw");

        assert_eq!(error_message(&Value::Null), "unknown error");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = CallbackRegistry::new();
        registry
            .register("onLoad", Rc::new(|_, _| Ok(())))
            .unwrap();
        let err = registry
            .register("onLoad", Rc::new(|_, _| Ok(())))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateCallback(name) if name == "onLoad"));
        assert!(registry.contains("onLoad"));
    }

    #[test]
    fn test_registry_override_replaces() {
        let mut registry = CallbackRegistry::new();
        registry
            .register("onLoad", Rc::new(|_, _| Ok(())))
            .unwrap();
        registry.register_override(
            "onLoad",
            Rc::new(|_, _| Err(EngineError::State("replaced".into()))),
        );
        assert!(registry.contains("onLoad"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c"), "a &lt; b &amp; c");
    }
}
