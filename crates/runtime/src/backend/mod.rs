//! Model backend abstraction.
//!
//! Provides traits for the remote model service and the file upload
//! collaborator, so the loop can be driven against scripted fakes in tests
//! and against the HTTP adapter in production.

mod gemini;

pub use gemini::{GeminiBackend, GeminiBackendBuilder};

use crate::ProviderError;
use chrono::{DateTime, Utc};
use registry::Declaration;
use std::future::Future;
use std::path::Path;
use store::{Part, Turn};

/// Everything needed for one model call.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub turns: &'a [Turn],
    pub declarations: &'a [Declaration],
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The model's reply, normalized into transcript parts.
///
/// Adapters only ever produce `Text` and `FunctionCall` parts here, in the
/// order the provider emitted them.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub parts: Vec<Part>,
    pub usage: Usage,
}

/// Trait for model provider backends.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelReply, ProviderError>> + Send;
}

/// A remote reference to an uploaded file.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub uri: String,
    pub mime_type: String,
    pub expiry: DateTime<Utc>,
}

/// Trait for the file upload collaborator.
///
/// Attachment lifecycle is owned by the provider; the transcript only
/// records the returned reference until its expiry.
pub trait Uploader: Send + Sync {
    fn upload(&self, path: &Path)
    -> impl Future<Output = Result<RemoteFile, ProviderError>> + Send;
}
