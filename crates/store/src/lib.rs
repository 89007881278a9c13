//! SQLite-backed conversation storage for tiller sessions.
//!
//! This crate owns the canonical transcript of a conversation: ordered
//! turns of tagged parts, persisted one document per session.
//!
//! # Core Concepts
//!
//! ## Transcript
//!
//! A [`Transcript`] is the in-memory turn list. Appending a part merges it
//! into the previous turn when the roles match, so no two adjacent turns
//! ever share a role — the shape providers expect.
//!
//! ## SessionStore
//!
//! The [`SessionStore`] wraps a SQLite database with one row per session.
//! Every append rewrites the active session's document; loading a session
//! replays its turns back through the merge rule, dropping file references
//! whose expiry has passed.
//!
//! ## Part
//!
//! A [`Part`] is one atomic transcript element: text, a function call
//! requested by the model, the response fed back to it, or a reference to
//! an uploaded file.
//!
//! A missing or corrupt record is never fatal; the store comes back empty
//! so the system stays usable on first run and after disk damage.

mod error;
mod store;
mod transcript;

pub use error::{Error, Result};
pub use store::{SessionStore, SessionSummary};
pub use transcript::{Part, Role, SessionId, Transcript, Turn};
