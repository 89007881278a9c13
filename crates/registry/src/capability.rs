//! The capability interface and its declaration types.

use crate::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Semantic type of a capability parameter.
///
/// Mirrors the schema vocabulary providers understand. Anything a unit
/// declares that we do not recognize degrades to `String`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// Parse a type name, defaulting to `String` for unrecognized shapes.
    pub fn parse(name: &str) -> Self {
        match name {
            "integer" | "int" => Self::Integer,
            "number" | "float" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    /// True iff the parameter has no default value.
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// The machine-readable surface of one capability, exactly what is exposed
/// to the model as its tool schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

/// Out-of-band instructions riding alongside a capability's payload.
///
/// The registry forwards these untouched; only the orchestration loop
/// assigns them meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    /// Local paths to hand to the upload collaborator; the returned remote
    /// references are appended to the transcript before the next send.
    pub files_to_upload: Vec<PathBuf>,
    /// Re-enter the sending step even absent new user input.
    pub force_continue: bool,
    /// Swap the active session before continuing.
    pub switch_session: Option<String>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.files_to_upload.is_empty() && !self.force_continue && self.switch_session.is_none()
    }
}

/// What a capability returns: a payload destined for the transcript plus
/// zero or more directives for the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub payload: Value,
    pub directives: Directives,
}

impl Outcome {
    /// A plain text payload with no directives.
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: Value::String(payload.into()),
            directives: Directives::default(),
        }
    }

    /// A plain JSON payload with no directives.
    pub fn json(payload: Value) -> Self {
        Self {
            payload,
            directives: Directives::default(),
        }
    }

    /// Ask the loop to re-enter the sending step with this result.
    pub fn and_continue(mut self) -> Self {
        self.directives.force_continue = true;
        self
    }

    pub fn with_upload(mut self, path: impl Into<PathBuf>) -> Self {
        self.directives.files_to_upload.push(path.into());
        self
    }

    pub fn with_switch_session(mut self, id: impl Into<String>) -> Self {
        self.directives.switch_session = Some(id.into());
        self
    }
}

/// A named, schema-described, invocable unit exposed to the model.
///
/// The parameter list is the sole source of the schema and the description
/// the sole source of documentation; the registry derives the upstream
/// declaration from nothing else.
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &[ParamSpec];

    async fn invoke(&self, args: Map<String, Value>) -> Result<Outcome, CapabilityError>;

    /// The declaration derived from this capability.
    fn declaration(&self) -> Declaration {
        Declaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().to_vec(),
        }
    }
}

/// Pull a required string argument out of a call's argument map.
pub fn str_arg(args: &Map<String, Value>, name: &str) -> Result<String, CapabilityError> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(CapabilityError::InvalidInput(format!(
            "missing argument `{name}`"
        ))),
    }
}

/// Pull a required integer argument out of a call's argument map.
pub fn int_arg(args: &Map<String, Value>, name: &str) -> Result<i64, CapabilityError> {
    match args.get(name) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            CapabilityError::InvalidInput(format!("argument `{name}` is not an integer"))
        }),
        Some(Value::String(s)) => s.parse().map_err(|_| {
            CapabilityError::InvalidInput(format!("argument `{name}` is not an integer"))
        }),
        Some(_) => Err(CapabilityError::InvalidInput(format!(
            "argument `{name}` is not an integer"
        ))),
        None => Err(CapabilityError::InvalidInput(format!(
            "missing argument `{name}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_kind_defaults_to_string() {
        assert_eq!(ParamKind::parse("integer"), ParamKind::Integer);
        assert_eq!(ParamKind::parse("vec<u8>"), ParamKind::String);
        assert_eq!(ParamKind::parse(""), ParamKind::String);
    }

    #[test]
    fn outcome_builders_set_directives() {
        let outcome = Outcome::text("ok")
            .and_continue()
            .with_upload("/tmp/report.pdf");
        assert!(outcome.directives.force_continue);
        assert_eq!(outcome.directives.files_to_upload.len(), 1);
        assert!(outcome.directives.switch_session.is_none());
    }

    #[test]
    fn int_arg_accepts_numeric_strings() {
        let mut args = Map::new();
        args.insert("n".into(), Value::String("7".into()));
        assert_eq!(int_arg(&args, "n").unwrap(), 7);
        assert!(int_arg(&args, "missing").is_err());
    }
}
