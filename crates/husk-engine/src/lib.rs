//! husk engine
//!
//! Headless browser emulation for driving single-page-application-style
//! test scenarios without a real browser: HTTP-like navigation against
//! an in-process application, a DOM snapshot, HTML5-style history
//! (`pushState`/`popState`), and a simulated asynchronous RPC layer
//! (request, success/error callback, DOM patch) standing in for what
//! client-side script would do.
//!
//! Everything is single-threaded and fully synchronous; "async" RPC
//! only means the caller does not receive the result directly.

mod activity;
mod browser;
mod history;
mod rpc;

pub use activity::{Activity, ActivityLog};
pub use browser::{Browser, BrowserBuilder, BrowserConfig, CurrentPage, RawPayload};
pub use history::{History, HistoryEntry, NavigationState};
pub use rpc::{CallbackRegistry, DEFAULT_ERROR_HANDLER, DEFAULT_SUCCESS_HANDLER};

pub use husk_dom::{Control, ControlEdit, ControlKind, DomError, DomSnapshot, Form};
pub use husk_net::{NetError, Request, Response, RouteReply, Router, Transport};

/// Engine error
///
/// Nothing in the engine retries: it is a deterministic test double,
/// and a failed operation always surfaces instead of silently
/// recovering.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Engine misuse: used before any navigation, `back` underflow,
    /// submit without an enclosing form.
    #[error("state error: {0}")]
    State(String),

    #[error("redirect loop: exceeded {hops} hops")]
    RedirectLoop { hops: u32 },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Decoded `error` envelope surfaced to a caller with no error
    /// callback.
    #[error("rpc error: {message}")]
    Rpc {
        message: String,
        data: serde_json::Value,
    },

    #[error("callback `{0}` is already registered")]
    DuplicateCallback(String),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Net(#[from] NetError),
}
