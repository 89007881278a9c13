//! Built-in capabilities.
//!
//! The base tool surface every session gets: file inspection and editing,
//! command execution, file attachment, and session switching. Registered
//! before discovery so that capability units can override any of them.

use crate::{
    int_arg, str_arg, Capability, CapabilityError, Outcome, ParamKind, ParamSpec, Registry,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Register every built-in capability.
pub fn register_builtins(registry: &mut Registry) {
    registry.register(Arc::new(ReadFile::new()));
    registry.register(Arc::new(WriteFile::new()));
    registry.register(Arc::new(CreateFile::new()));
    registry.register(Arc::new(DeleteFile::new()));
    registry.register(Arc::new(ReplaceLines::new()));
    registry.register(Arc::new(ExecuteCommand::new()));
    registry.register(Arc::new(AttachFile::new()));
    registry.register(Arc::new(SwitchConversation::new()));
}

struct ReadFile {
    params: Vec<ParamSpec>,
}

impl ReadFile {
    fn new() -> Self {
        Self {
            params: vec![ParamSpec::required("path", ParamKind::String)],
        }
    }
}

#[async_trait]
impl Capability for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its content."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Outcome::json(json!({ "path": path, "content": content })).and_continue())
    }
}

struct WriteFile {
    params: Vec<ParamSpec>,
}

impl WriteFile {
    fn new() -> Self {
        Self {
            params: vec![
                ParamSpec::required("path", ParamKind::String),
                ParamSpec::required("content", ParamKind::String),
            ],
        }
    }
}

#[async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Overwrite a file with the given content."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        tokio::fs::write(&path, &content).await?;
        Ok(Outcome::text(format!("wrote {} bytes to {path}", content.len())).and_continue())
    }
}

struct CreateFile {
    params: Vec<ParamSpec>,
}

impl CreateFile {
    fn new() -> Self {
        Self {
            params: vec![
                ParamSpec::required("path", ParamKind::String),
                ParamSpec::optional("content", ParamKind::String),
            ],
        }
    }
}

#[async_trait]
impl Capability for CreateFile {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file with optional initial content."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if tokio::fs::try_exists(&path).await? {
            return Err(CapabilityError::InvalidInput(format!(
                "file already exists: {path}"
            )));
        }
        tokio::fs::write(&path, content).await?;
        Ok(Outcome::text(format!("created {path}")).and_continue())
    }
}

struct DeleteFile {
    params: Vec<ParamSpec>,
}

impl DeleteFile {
    fn new() -> Self {
        Self {
            params: vec![ParamSpec::required("path", ParamKind::String)],
        }
    }
}

#[async_trait]
impl Capability for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete the file at the given path."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        tokio::fs::remove_file(&path).await?;
        Ok(Outcome::text(format!("deleted {path}")).and_continue())
    }
}

struct ReplaceLines {
    params: Vec<ParamSpec>,
}

impl ReplaceLines {
    fn new() -> Self {
        Self {
            params: vec![
                ParamSpec::required("path", ParamKind::String),
                ParamSpec::required("start_line", ParamKind::Integer),
                ParamSpec::required("end_line", ParamKind::Integer),
                ParamSpec::required("content", ParamKind::String),
            ],
        }
    }
}

#[async_trait]
impl Capability for ReplaceLines {
    fn name(&self) -> &str {
        "replace_lines"
    }

    fn description(&self) -> &str {
        "Replace lines start_line..=end_line (1-based) of a file with the given content. Returns the lines that were replaced."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        let start = int_arg(&args, "start_line")?;
        let end = int_arg(&args, "end_line")?;
        let content = str_arg(&args, "content")?;

        if start < 1 || end < start {
            return Err(CapabilityError::InvalidInput(format!(
                "invalid line range {start}..={end}"
            )));
        }

        let original = tokio::fs::read_to_string(&path).await?;
        let mut lines: Vec<&str> = original.lines().collect();
        let start = (start - 1) as usize;
        let end = (end as usize).min(lines.len());
        if start >= lines.len() {
            return Err(CapabilityError::InvalidInput(format!(
                "start_line {} past end of file ({} lines)",
                start + 1,
                lines.len()
            )));
        }

        let replaced: Vec<String> = lines[start..end].iter().map(|l| l.to_string()).collect();
        lines.splice(start..end, content.lines());
        let mut updated = lines.join("\n");
        updated.push('\n');
        tokio::fs::write(&path, updated).await?;

        Ok(Outcome::json(json!({ "path": path, "replaced": replaced })).and_continue())
    }
}

struct ExecuteCommand {
    description: String,
    params: Vec<ParamSpec>,
}

impl ExecuteCommand {
    fn new() -> Self {
        Self {
            description: format!(
                "Execute a shell command and return its output. The host runs {} on {}.",
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            params: vec![ParamSpec::required("command", ParamKind::String)],
        }
    }
}

#[async_trait]
impl Capability for ExecuteCommand {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let command = str_arg(&args, "command")?;
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .await?;

        Ok(Outcome::json(json!({
            "command": command,
            "status": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout).trim_end(),
            "stderr": String::from_utf8_lossy(&output.stderr).trim_end(),
        }))
        .and_continue())
    }
}

struct AttachFile {
    params: Vec<ParamSpec>,
}

impl AttachFile {
    fn new() -> Self {
        Self {
            params: vec![ParamSpec::required("path", ParamKind::String)],
        }
    }
}

#[async_trait]
impl Capability for AttachFile {
    fn name(&self) -> &str {
        "attach_file"
    }

    fn description(&self) -> &str {
        "Upload a local file and attach it to the conversation so it can be inspected."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let path = str_arg(&args, "path")?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(CapabilityError::InvalidInput(format!(
                "file not found: {path}"
            )));
        }
        Ok(Outcome::text(format!("queued {path} for upload"))
            .with_upload(&path)
            .and_continue())
    }
}

struct SwitchConversation {
    params: Vec<ParamSpec>,
}

impl SwitchConversation {
    fn new() -> Self {
        Self {
            params: vec![ParamSpec::required("session_id", ParamKind::String)],
        }
    }
}

#[async_trait]
impl Capability for SwitchConversation {
    fn name(&self) -> &str {
        "switch_conversation"
    }

    fn description(&self) -> &str {
        "Make a previously stored conversation the active one."
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let session_id = str_arg(&args, "session_id")?;
        Ok(Outcome::text(format!("switching to session {session_id}"))
            .with_switch_session(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dispatch;

    fn builtin_registry() -> Registry {
        let mut registry = Registry::new();
        register_builtins(&mut registry);
        registry
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn read_file_round_trips_written_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let registry = builtin_registry();

        let dispatch = registry
            .execute(
                "write_file",
                args(&[
                    ("path", json!(path.to_str().unwrap())),
                    ("content", json!("remember the milk")),
                ]),
            )
            .await;
        assert!(matches!(dispatch, Dispatch::Completed { .. }));

        let (_, value, directives) = registry
            .execute("read_file", args(&[("path", json!(path.to_str().unwrap()))]))
            .await
            .into_reply();
        assert_eq!(value["content"], "remember the milk");
        assert!(directives.force_continue);
    }

    #[tokio::test]
    async fn replace_lines_reports_replaced_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let registry = builtin_registry();
        let (_, value, _) = registry
            .execute(
                "replace_lines",
                args(&[
                    ("path", json!(path.to_str().unwrap())),
                    ("start_line", json!(2)),
                    ("end_line", json!(2)),
                    ("content", json!("TWO")),
                ]),
            )
            .await
            .into_reply();
        assert_eq!(value["replaced"], json!(["two"]));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\nTWO\nthree\n");
    }

    #[tokio::test]
    async fn missing_file_is_a_structured_failure() {
        let registry = builtin_registry();
        let (name, value, _) = registry
            .execute("read_file", args(&[("path", json!("/no/such/file"))]))
            .await
            .into_reply();
        assert_eq!(name, "read_file");
        assert_eq!(value["status"], "error");
    }

    #[tokio::test]
    async fn attach_file_carries_upload_directive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"png").unwrap();

        let registry = builtin_registry();
        let dispatch = registry
            .execute("attach_file", args(&[("path", json!(path.to_str().unwrap()))]))
            .await;
        let Dispatch::Completed { outcome, .. } = dispatch else {
            panic!("attach_file failed");
        };
        assert_eq!(outcome.directives.files_to_upload, vec![path]);
        assert!(outcome.directives.force_continue);
    }

    #[tokio::test]
    async fn switch_conversation_carries_session_directive() {
        let registry = builtin_registry();
        let dispatch = registry
            .execute("switch_conversation", args(&[("session_id", json!("abc"))]))
            .await;
        let Dispatch::Completed { outcome, .. } = dispatch else {
            panic!("switch_conversation failed");
        };
        assert_eq!(outcome.directives.switch_session.as_deref(), Some("abc"));
        assert!(!outcome.directives.force_continue);
    }
}
