//! Tiller runtime — the tool-use orchestration loop.
//!
//! This crate drives the request/execute/respond cycle between the user,
//! the model provider, and the capability registry.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **Orchestrator**: processes one user turn at a time — send the
//!   transcript, interpret the reply, execute requested capabilities,
//!   append results, and decide whether to go around again.
//! - **Backend**: a trait abstracting the model provider, with a concrete
//!   Gemini HTTP adapter.
//! - **Surface**: the interaction collaborator (read a line, render text,
//!   offer a retry) so the loop stays free of terminal concerns.
//!
//! # Example
//!
//! ```ignore
//! use registry::Registry;
//! use runtime::{GeminiBackend, Orchestrator, Surface};
//! use store::SessionStore;
//!
//! # async fn example(surface: &mut dyn Surface) -> runtime::Result<()> {
//! let mut store = SessionStore::open("sessions.db")?;
//! let mut registry = Registry::new();
//! registry::register_builtins(&mut registry);
//! let backend = GeminiBackend::builder("AIza…", "gemini-1.5-pro").build();
//!
//! let mut orchestrator =
//!     Orchestrator::new(&mut store, &registry, &backend, &backend, "Be terse.");
//! orchestrator.user_turn(surface, "what is in this directory?").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod orchestrator;
mod surface;

pub use backend::{
    Backend, GeminiBackend, GeminiBackendBuilder, ModelReply, ModelRequest, RemoteFile, Uploader,
    Usage,
};
pub use error::{Error, ProviderError, Result};
pub use orchestrator::{Orchestrator, DEFAULT_MAX_ROUNDS};
pub use surface::Surface;
