//! husk DOM layer
//!
//! Owns the canonical serialized-HTML snapshot of "what the page looks
//! like right now" and keeps form/control bookkeeping in sync with it.
//! Parsing and selector matching are delegated to `scraper`; this crate
//! adds the snapshot invariants on top: the string is ground truth, and
//! every mutation goes through a full reserialize-and-reparse so the
//! parsed tree and control list can never be stale.

mod controls;
mod serialize;
mod snapshot;

pub use controls::{Control, ControlEdit, ControlKind, Form, Locator, SelectOption};
pub use snapshot::DomSnapshot;

/// DOM layer error
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("no document loaded")]
    NoDocument,

    #[error("invalid selector `{0}`")]
    Selector(String),

    #[error("no element matches `{selector}`")]
    ElementNotFound { selector: String },

    #[error("selector `{selector}` matches {count} elements, expected exactly one")]
    AmbiguousElement { selector: String, count: usize },

    #[error("control could not be mapped back into the DOM: {0}")]
    Sync(String),
}
