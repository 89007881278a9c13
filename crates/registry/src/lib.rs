//! Capability registry for tiller.
//!
//! This crate decouples the orchestration loop from concrete tool
//! implementations. It owns three things:
//!
//! - **The capability interface** — [`Capability`]: a named, described,
//!   schema-carrying invocable. Implementations return an [`Outcome`]: a
//!   payload for the transcript plus [`Directives`] only the loop
//!   interprets.
//! - **Discovery** — [`load_units`] scans a directory of TOML manifests and
//!   adapts each declared external command into the capability interface.
//!   Scanning an agent-specific directory after the base one lets agents
//!   override the stock tools. Broken units are logged and skipped.
//! - **Dispatch** — [`Registry::execute`] routes a call by name and always
//!   produces a [`Dispatch`] value: unknown names and invocable failures
//!   come back as structured results the model can react to, never as
//!   errors that could tear down the loop.

mod builtin;
mod capability;
mod error;
mod loader;
mod registry;

pub use builtin::register_builtins;
pub use capability::{
    int_arg, str_arg, Capability, Declaration, Directives, Outcome, ParamKind, ParamSpec,
};
pub use error::{CapabilityError, DiscoveryError};
pub use loader::{load_units, CommandCapability};
pub use registry::{Dispatch, Registry};
