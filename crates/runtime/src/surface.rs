//! The interaction surface consumed by the loop.

/// Terminal-ish collaborator the orchestrator talks to.
///
/// Implementations are simple I/O wrappers; the loop never touches stdin or
/// stdout directly so tests can drive it with a scripted surface.
pub trait Surface {
    /// Block for one line of user input. `None` means end of input.
    fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>>;

    /// Render model-authored text.
    fn render_text(&mut self, text: &str);

    /// Render a transient status or diagnostic line.
    fn render_status(&mut self, status: &str);

    /// Surface a sending-step failure and ask whether to retry.
    fn confirm_retry(&mut self, error: &str) -> bool;
}
