//! Discovery of capability units from the filesystem.
//!
//! A unit is a TOML manifest declaring one or more invocables backed by an
//! external command. The loader is the adapter between that on-disk contract
//! and the [`Capability`] interface; the registry itself never touches the
//! filesystem.

use crate::{Capability, CapabilityError, DiscoveryError, Outcome, ParamKind, ParamSpec, Registry};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

const NO_DESCRIPTION: &str = "No description provided.";

#[derive(Debug, Deserialize)]
struct UnitManifest {
    #[serde(default, rename = "capability")]
    capabilities: Vec<CapabilityDecl>,
}

#[derive(Debug, Deserialize)]
struct CapabilityDecl {
    name: String,
    description: Option<String>,
    /// Argv template; `{param}` placeholders are substituted at call time.
    command: Vec<String>,
    /// Whether the result must be sent back to the model immediately.
    #[serde(default = "default_true")]
    require_execution_result: bool,
    #[serde(default)]
    params: Vec<ParamDecl>,
}

#[derive(Debug, Deserialize)]
struct ParamDecl {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    default: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// A capability whose invocable is an external command.
pub struct CommandCapability {
    name: String,
    description: String,
    argv: Vec<String>,
    params: Vec<ParamSpec>,
    defaults: HashMap<String, Value>,
    force_continue: bool,
}

impl CommandCapability {
    fn from_decl(decl: CapabilityDecl) -> Result<Self, DiscoveryError> {
        if decl.name.trim().is_empty() {
            return Err(DiscoveryError::Parse("capability with empty name".into()));
        }
        if decl.command.is_empty() {
            return Err(DiscoveryError::Parse(format!(
                "capability `{}` declares an empty command",
                decl.name
            )));
        }

        let mut params = Vec::new();
        let mut defaults = HashMap::new();
        for p in decl.params {
            let kind = p.kind.as_deref().map(ParamKind::parse).unwrap_or_default();
            params.push(ParamSpec {
                name: p.name.clone(),
                kind,
                required: p.default.is_none(),
            });
            if let Some(default) = p.default {
                defaults.insert(p.name, default);
            }
        }

        Ok(Self {
            name: decl.name,
            description: decl
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            argv: decl.command,
            params,
            defaults,
            force_continue: decl.require_execution_result,
        })
    }

    fn render_argv(&self, args: &Map<String, Value>) -> Result<Vec<String>, CapabilityError> {
        let mut values = HashMap::new();
        for spec in &self.params {
            let value = args
                .get(&spec.name)
                .cloned()
                .or_else(|| self.defaults.get(&spec.name).cloned());
            match value {
                Some(v) => {
                    values.insert(spec.name.as_str(), render_value(&v));
                }
                None if spec.required => {
                    return Err(CapabilityError::InvalidInput(format!(
                        "missing argument `{}`",
                        spec.name
                    )));
                }
                None => {}
            }
        }

        Ok(self
            .argv
            .iter()
            .map(|piece| {
                let mut rendered = piece.clone();
                for (name, value) in &values {
                    rendered = rendered.replace(&format!("{{{name}}}"), value);
                }
                rendered
            })
            .collect())
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Capability for CommandCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError> {
        let argv = self.render_argv(&args)?;
        let output = Command::new(&argv[0]).args(&argv[1..]).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                output.status.to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(CapabilityError::Execution(detail));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let outcome = Outcome::text(stdout);
        Ok(if self.force_continue {
            outcome.and_continue()
        } else {
            outcome
        })
    }
}

fn load_unit(path: &Path) -> Result<Vec<CommandCapability>, DiscoveryError> {
    let content = std::fs::read_to_string(path)?;
    let manifest: UnitManifest =
        toml::from_str(&content).map_err(|e| DiscoveryError::Parse(e.to_string()))?;

    if manifest.capabilities.is_empty() {
        return Err(DiscoveryError::Empty);
    }

    manifest
        .capabilities
        .into_iter()
        .map(CommandCapability::from_decl)
        .collect()
}

/// Scan a directory for capability units and register every invocable they
/// declare. Entries registered later override same-named earlier ones, so
/// call this for the base location first and the agent location second.
///
/// A unit that fails to load is logged and skipped; discovery never aborts
/// because of one broken unit. Returns the number of capabilities
/// registered.
pub fn load_units(registry: &mut Registry, dir: &Path) -> usize {
    if !dir.exists() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create capability unit directory");
            return 0;
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read capability unit directory");
            return 0;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut registered = 0;
    for path in paths {
        match load_unit(&path) {
            Ok(capabilities) => {
                for capability in capabilities {
                    debug!(
                        capability = %capability.name,
                        unit = %path.display(),
                        "registered capability"
                    );
                    registry.register(Arc::new(capability));
                    registered += 1;
                }
            }
            Err(e) => {
                warn!(unit = %path.display(), error = %e, "skipping broken capability unit");
            }
        }
    }
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_unit(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn declaration_marks_defaulted_params_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(
            dir.path(),
            "fs.toml",
            r#"
[[capability]]
name = "list_dir"
description = "List the entries of a directory."
command = ["ls", "-1", "{path}"]

[[capability.params]]
name = "path"
type = "string"
default = "."
"#,
        );

        let mut registry = Registry::new();
        assert_eq!(load_units(&mut registry, dir.path()), 1);

        let declarations = registry.declarations();
        let decl = declarations.iter().find(|d| d.name == "list_dir").unwrap();
        assert_eq!(decl.parameters.len(), 1);
        assert!(!decl.parameters[0].required);
        assert_eq!(decl.parameters[0].kind, ParamKind::String);
    }

    #[test]
    fn broken_unit_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "bad.toml", "this is [ not toml");
        write_unit(
            dir.path(),
            "good.toml",
            r#"
[[capability]]
name = "hello"
command = ["echo", "hello"]
"#,
        );

        let mut registry = Registry::new();
        assert_eq!(load_units(&mut registry, dir.path()), 1);
        assert!(registry.contains("hello"));
    }

    #[test]
    fn missing_description_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(
            dir.path(),
            "bare.toml",
            r#"
[[capability]]
name = "bare"
command = ["true"]
"#,
        );

        let mut registry = Registry::new();
        load_units(&mut registry, dir.path());
        let declarations = registry.declarations();
        let decl = declarations.iter().find(|d| d.name == "bare").unwrap();
        assert_eq!(decl.description, NO_DESCRIPTION);
    }

    #[test]
    fn agent_unit_overrides_base_unit() {
        let base = tempfile::tempdir().unwrap();
        let agent = tempfile::tempdir().unwrap();
        write_unit(
            base.path(),
            "greet.toml",
            r#"
[[capability]]
name = "greet"
command = ["echo", "base"]
"#,
        );
        write_unit(
            agent.path(),
            "greet.toml",
            r#"
[[capability]]
name = "greet"
command = ["echo", "agent"]
"#,
        );

        let mut registry = Registry::new();
        load_units(&mut registry, base.path());
        load_units(&mut registry, agent.path());
        assert_eq!(registry.len(), 1);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let (_, value, _) = rt
            .block_on(registry.execute("greet", Map::new()))
            .into_reply();
        assert_eq!(value, json!("agent"));
    }

    #[tokio::test]
    async fn placeholders_substituted_from_args_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(
            dir.path(),
            "say.toml",
            r#"
[[capability]]
name = "say"
command = ["echo", "{greeting}", "{name}"]

[[capability.params]]
name = "greeting"
default = "hi"

[[capability.params]]
name = "name"
type = "string"
"#,
        );

        let mut registry = Registry::new();
        load_units(&mut registry, dir.path());

        let mut args = Map::new();
        args.insert("name".into(), json!("tiller"));
        let (_, value, directives) = registry.execute("say", args).await.into_reply();
        assert_eq!(value, json!("hi tiller"));
        assert!(directives.force_continue);

        // Required parameter missing becomes a structured failure.
        let (_, value, _) = registry.execute("say", Map::new()).await.into_reply();
        assert_eq!(value["status"], "error");
    }
}
