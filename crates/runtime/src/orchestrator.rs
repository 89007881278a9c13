//! The request/execute/respond cycle.

use crate::backend::{Backend, ModelReply, ModelRequest, Uploader};
use crate::{Result, Surface};
use registry::Registry;
use serde_json::{Map, Value};
use store::{Part, Role, SessionStore};
use tracing::{debug, warn};

/// Default ceiling on sending rounds per user turn.
///
/// The model terminating on its own is the normal exit; the ceiling only
/// breaks runaway call chains.
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// A pending capability invocation lifted out of a model reply.
struct PendingCall {
    name: String,
    args: Map<String, Value>,
}

/// Drives one conversation: send transcript, interpret the reply, execute
/// requested capabilities, append results, decide whether to go around
/// again.
///
/// Everything it touches is passed in by reference; there are no globals,
/// so concurrent sessions and tests get isolated instances.
pub struct Orchestrator<'a, B, U> {
    store: &'a mut SessionStore,
    registry: &'a Registry,
    backend: &'a B,
    uploader: &'a U,
    system: &'a str,
    max_rounds: usize,
}

impl<'a, B: Backend, U: Uploader> Orchestrator<'a, B, U> {
    pub fn new(
        store: &'a mut SessionStore,
        registry: &'a Registry,
        backend: &'a B,
        uploader: &'a U,
        system: &'a str,
    ) -> Self {
        Self {
            store,
            registry,
            backend,
            uploader,
            system,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Process one user turn to completion.
    ///
    /// The input is appended durably *before* the first send, so a retry
    /// after a provider failure re-submits the same transcript with no
    /// duplication or loss.
    pub async fn user_turn(&mut self, surface: &mut dyn Surface, input: &str) -> Result<()> {
        self.store.append_text(Role::User, input)?;
        self.drive(surface).await
    }

    async fn drive(&mut self, surface: &mut dyn Surface) -> Result<()> {
        for _ in 0..self.max_rounds {
            let Some(reply) = self.send(surface).await? else {
                return Ok(()); // aborted by the user
            };

            let calls = self.receive(surface, reply)?;
            if calls.is_empty() {
                return Ok(());
            }

            if !self.execute(surface, calls).await? {
                return Ok(());
            }
        }

        warn!(max_rounds = self.max_rounds, "round ceiling reached");
        surface.render_status(&format!(
            "stopped after {} rounds; send a message to continue",
            self.max_rounds
        ));
        Ok(())
    }

    /// The sending step. Provider failures pause here for an explicit
    /// retry/abort choice; `None` means the user chose to abort.
    async fn send(&mut self, surface: &mut dyn Surface) -> Result<Option<ModelReply>> {
        let declarations = self.registry.declarations();
        loop {
            surface.render_status("waiting for the model");
            let request = ModelRequest {
                system: Some(self.system),
                turns: self.store.turns(),
                declarations: &declarations,
            };
            match self.backend.call(request).await {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) => {
                    debug!(error = %e, "sending step failed");
                    if !surface.confirm_retry(&e.to_string()) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// The receiving step: scan reply parts in emitted order. Text renders
    /// and lands on the model turn; function calls land there too and
    /// queue for execution.
    fn receive(
        &mut self,
        surface: &mut dyn Surface,
        reply: ModelReply,
    ) -> Result<Vec<PendingCall>> {
        let mut calls = Vec::new();
        for part in reply.parts {
            match part {
                Part::Text { text } => {
                    surface.render_text(&text);
                    self.store.append_text(Role::Model, text)?;
                }
                Part::FunctionCall { name, args } => {
                    self.store
                        .append_function_call(Role::Model, &name, args.clone())?;
                    calls.push(PendingCall { name, args });
                }
                other => debug!(part = ?other, "ignoring unexpected reply part"),
            }
        }
        Ok(calls)
    }

    /// The executing step. Calls run sequentially; every one yields exactly
    /// one function-response part on a user turn, keeping calls and
    /// responses paired. Returns whether to re-enter the sending step.
    async fn execute(
        &mut self,
        surface: &mut dyn Surface,
        calls: Vec<PendingCall>,
    ) -> Result<bool> {
        let mut continue_sending = false;

        for call in calls {
            surface.render_status(&format!("running {}", call.name));
            let dispatch = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    surface.render_status(&format!("{} interrupted", call.name));
                    return Ok(false);
                }
                dispatch = self.registry.execute(&call.name, call.args) => dispatch,
            };

            let (name, response, directives) = dispatch.into_reply();
            self.store
                .append_function_response(Role::User, &name, response)?;

            for path in &directives.files_to_upload {
                match self.uploader.upload(path).await {
                    Ok(file) => {
                        self.store.append_file_data(
                            Role::User,
                            file.mime_type,
                            file.uri,
                            file.expiry,
                        )?;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "upload failed");
                        surface.render_status(&format!("upload of {} failed: {e}", path.display()));
                    }
                }
            }

            if let Some(id) = &directives.switch_session {
                match id.parse() {
                    Ok(session_id) => {
                        self.store.load(session_id)?;
                        surface.render_status(&format!("switched to session {session_id}"));
                    }
                    Err(_) => {
                        warn!(session = %id, "capability named an invalid session id");
                        surface.render_status(&format!("cannot switch to invalid session {id}"));
                    }
                }
            }

            continue_sending |= directives.force_continue;
        }

        Ok(continue_sending)
    }
}
