//! Transcript types: sessions, turns, and parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// The role a turn is attributed to.
///
/// Tool results are attributed to the user side, matching the provider
/// convention that only the model produces `model` turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One atomic transcript element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text content.
    Text { text: String },
    /// A capability invocation requested by the model.
    FunctionCall { name: String, args: Map<String, Value> },
    /// The result of a capability invocation, fed back to the model.
    FunctionResponse { name: String, response: Value },
    /// A reference to an uploaded file, valid until its expiry.
    FileData {
        mime_type: String,
        uri: String,
        expiry_time: DateTime<Utc>,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    /// Whether this is a file reference whose expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::FileData { expiry_time, .. } => *expiry_time < now,
            _ => false,
        }
    }
}

/// A maximal run of parts attributed to one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: Role, part: Part) -> Self {
        Self {
            role,
            parts: vec![part],
        }
    }

    /// Combined text content of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// The in-memory, ordered transcript of one session.
///
/// All appends funnel through [`Transcript::push`], which enforces the
/// merge rule: a part whose role matches the last turn joins that turn,
/// otherwise it opens a new one. No two adjacent turns ever share a role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part, merging into the last turn when roles match.
    pub fn push(&mut self, role: Role, part: Part) {
        match self.turns.last_mut() {
            Some(last) if last.role == role => last.parts.push(part),
            _ => self.turns.push(Turn::new(role, part)),
        }
    }

    pub fn push_text(&mut self, role: Role, text: impl Into<String>) {
        self.push(role, Part::text(text));
    }

    pub fn push_function_call(&mut self, role: Role, name: impl Into<String>, args: Map<String, Value>) {
        self.push(
            role,
            Part::FunctionCall {
                name: name.into(),
                args,
            },
        );
    }

    pub fn push_function_response(&mut self, role: Role, name: impl Into<String>, response: Value) {
        self.push(
            role,
            Part::FunctionResponse {
                name: name.into(),
                response,
            },
        );
    }

    pub fn push_file_data(
        &mut self,
        role: Role,
        mime_type: impl Into<String>,
        uri: impl Into<String>,
        expiry_time: DateTime<Utc>,
    ) {
        self.push(
            role,
            Part::FileData {
                mime_type: mime_type.into(),
                uri: uri.into(),
                expiry_time,
            },
        );
    }

    /// Rebuild a transcript by replaying persisted turns through the
    /// merge rule. File references past their expiry are dropped with a
    /// warning; the provider rejects dead URIs, so they must never be
    /// replayed.
    pub fn replay(turns: Vec<Turn>) -> Self {
        let now = Utc::now();
        let mut transcript = Self::new();
        for turn in turns {
            for part in turn.parts {
                if part.is_expired(now) {
                    if let Part::FileData { uri, .. } = &part {
                        warn!(%uri, "dropping expired file reference from replay");
                    }
                    continue;
                }
                transcript.push(turn.role, part);
            }
        }
        transcript
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// First text part of the transcript, for session previews.
    pub fn first_text(&self) -> Option<&str> {
        self.turns.iter().flat_map(|t| &t.parts).find_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn push_merges_same_role() {
        let mut t = Transcript::new();
        t.push_text(Role::User, "hello");
        t.push_text(Role::User, "again");
        t.push_text(Role::Model, "hi");
        assert_eq!(t.turns().len(), 2);
        assert_eq!(t.turns()[0].parts.len(), 2);
    }

    #[test]
    fn adjacent_turns_never_share_a_role() {
        let mut t = Transcript::new();
        let roles = [
            Role::User,
            Role::User,
            Role::Model,
            Role::Model,
            Role::User,
            Role::Model,
            Role::Model,
            Role::Model,
        ];
        for (i, role) in roles.iter().enumerate() {
            t.push_text(*role, format!("part {i}"));
        }
        for pair in t.turns().windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
    }

    #[test]
    fn mixed_parts_merge_into_one_turn() {
        let mut t = Transcript::new();
        t.push_function_call(Role::Model, "list_dir", args(&[("path", json!("."))]));
        t.push_text(Role::Model, "Listing the directory.");
        assert_eq!(t.turns().len(), 1);
        assert_eq!(t.turns()[0].parts.len(), 2);
    }

    #[test]
    fn replay_preserves_part_order() {
        let mut t = Transcript::new();
        t.push_text(Role::User, "run it");
        t.push_function_call(Role::Model, "run", Map::new());
        t.push_function_response(Role::User, "run", json!("done"));
        t.push_text(Role::Model, "Finished.");

        let replayed = Transcript::replay(t.turns().to_vec());
        assert_eq!(replayed, t);
    }

    #[test]
    fn replay_drops_expired_file_references() {
        let mut t = Transcript::new();
        t.push_text(Role::User, "look at this");
        t.push_file_data(
            Role::User,
            "image/png",
            "files/gone",
            Utc::now() - Duration::hours(1),
        );
        t.push_file_data(
            Role::User,
            "image/png",
            "files/fresh",
            Utc::now() + Duration::hours(1),
        );
        t.push_text(Role::Model, "Looking.");

        let replayed = Transcript::replay(t.turns().to_vec());
        let parts: Vec<_> = replayed.turns().iter().flat_map(|t| &t.parts).collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| !matches!(
            p,
            Part::FileData { uri, .. } if uri == "files/gone"
        )));
    }

    #[test]
    fn first_text_skips_non_text_parts() {
        let mut t = Transcript::new();
        t.push_function_call(Role::Model, "probe", Map::new());
        assert_eq!(t.first_text(), None);
        t.push_text(Role::Model, "found it");
        assert_eq!(t.first_text(), Some("found it"));
    }

    #[test]
    fn part_serialization_shape() {
        let part = Part::FunctionCall {
            name: "add".into(),
            args: args(&[("a", json!(2))]),
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "function_call");
        assert_eq!(value["name"], "add");
        assert_eq!(value["args"]["a"], 2);
    }
}
