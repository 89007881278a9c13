//! Gemini API backend.

use super::{Backend, ModelReply, ModelRequest, RemoteFile, Uploader, Usage};
use crate::ProviderError;
use chrono::{DateTime, Duration, Utc};
use registry::{Declaration, ParamKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use store::Part;
use tracing::warn;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// Uploaded files live 48 hours on the service; used when the response
// omits an expiration time.
const DEFAULT_FILE_TTL_HOURS: i64 = 48;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: ApiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: ApiFunctionResponse,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: ApiFileData,
    },
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<ApiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDeclaration {
    name: String,
    description: String,
    parameters: ApiSchema,
}

#[derive(Debug, Serialize)]
struct ApiSchema {
    #[serde(rename = "type")]
    schema_type: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, ApiParamSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ApiParamSchema {
    #[serde(rename = "type")]
    schema_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

/// One part of a candidate. Unrecognized part kinds deserialize with both
/// fields empty and are skipped, for forward compatibility.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponsePart {
    text: Option<String>,
    function_call: Option<ApiResponseFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiUploadResponse {
    file: ApiFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    uri: String,
    mime_type: Option<String>,
    expiration_time: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Override the service base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> GeminiBackend {
        GeminiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            base_url: self.base_url,
        }
    }
}

/// Gemini API backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> GeminiBackendBuilder {
        GeminiBackendBuilder::new(api_key, model)
    }

    fn part_to_api(part: &Part) -> ApiPart {
        match part {
            Part::Text { text } => ApiPart::Text { text: text.clone() },
            Part::FunctionCall { name, args } => ApiPart::FunctionCall {
                function_call: ApiFunctionCall {
                    name: name.clone(),
                    args: args.clone(),
                },
            },
            Part::FunctionResponse { name, response } => ApiPart::FunctionResponse {
                function_response: ApiFunctionResponse {
                    name: name.clone(),
                    // The API requires an object here; bare values are
                    // wrapped under a `result` key.
                    response: match response {
                        Value::Object(_) => response.clone(),
                        other => json!({ "result": other }),
                    },
                },
            },
            Part::FileData {
                mime_type, uri, ..
            } => ApiPart::FileData {
                file_data: ApiFileData {
                    mime_type: mime_type.clone(),
                    file_uri: uri.clone(),
                },
            },
        }
    }

    fn declaration_to_api(decl: &Declaration) -> ApiFunctionDeclaration {
        let properties = decl
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    ApiParamSchema {
                        schema_type: kind_to_api(p.kind),
                    },
                )
            })
            .collect();
        let required = decl
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect();

        ApiFunctionDeclaration {
            name: decl.name.clone(),
            description: decl.description.clone(),
            parameters: ApiSchema {
                schema_type: "OBJECT",
                properties,
                required,
            },
        }
    }

    fn response_to_reply(response: ApiResponse) -> ModelReply {
        let usage = Usage {
            input_tokens: response.usage_metadata.prompt_token_count,
            output_tokens: response.usage_metadata.candidates_token_count,
        };

        let Some(content) = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
        else {
            warn!("model reply carried no content");
            return ModelReply {
                parts: Vec::new(),
                usage,
            };
        };

        let parts = content
            .parts
            .into_iter()
            .filter_map(|part| {
                if let Some(call) = part.function_call {
                    Some(Part::FunctionCall {
                        name: call.name,
                        args: call.args,
                    })
                } else {
                    part.text.map(Part::text)
                }
            })
            .collect();

        ModelReply { parts, usage }
    }
}

fn kind_to_api(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::String => "STRING",
        ParamKind::Integer => "INTEGER",
        ParamKind::Number => "NUMBER",
        ParamKind::Boolean => "BOOLEAN",
        ParamKind::Array => "ARRAY",
        ParamKind::Object => "OBJECT",
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") | Some("md") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

impl Backend for GeminiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelReply, ProviderError> {
        let contents = request
            .turns
            .iter()
            .map(|turn| ApiContent {
                role: Some(match turn.role {
                    store::Role::User => "user",
                    store::Role::Model => "model",
                }),
                parts: turn.parts.iter().map(Self::part_to_api).collect(),
            })
            .collect();

        let tools = if request.declarations.is_empty() {
            Vec::new()
        } else {
            vec![ApiTool {
                function_declarations: request
                    .declarations
                    .iter()
                    .map(Self::declaration_to_api)
                    .collect(),
            }]
        };

        let api_request = ApiRequest {
            system_instruction: request.system.map(|s| ApiContent {
                role: None,
                parts: vec![ApiPart::Text {
                    text: s.to_string(),
                }],
            }),
            contents,
            tools,
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(Self::response_to_reply(api_response))
    }
}

impl Uploader for GeminiBackend {
    async fn upload(&self, path: &Path) -> Result<RemoteFile, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::Network(format!("read {}: {e}", path.display())))?;
        let mime_type = guess_mime_type(path);

        let url = format!("{}/upload/v1beta/files?uploadType=media", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {body}")));
        }

        let uploaded: ApiUploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(RemoteFile {
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
            expiry: uploaded
                .file
                .expiration_time
                .unwrap_or_else(|| Utc::now() + Duration::hours(DEFAULT_FILE_TTL_HOURS)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::ParamSpec;

    #[test]
    fn declaration_converts_to_object_schema() {
        let decl = Declaration {
            name: "add".into(),
            description: "Add two integers.".into(),
            parameters: vec![
                ParamSpec::required("a", ParamKind::Integer),
                ParamSpec::optional("b", ParamKind::Integer),
            ],
        };

        let api = GeminiBackend::declaration_to_api(&decl);
        let value = serde_json::to_value(&api).unwrap();
        assert_eq!(value["parameters"]["type"], "OBJECT");
        assert_eq!(value["parameters"]["properties"]["a"]["type"], "INTEGER");
        assert_eq!(value["parameters"]["required"], json!(["a"]));
    }

    #[test]
    fn bare_function_response_values_are_wrapped() {
        let part = Part::FunctionResponse {
            name: "list_dir".into(),
            response: json!("a.txt"),
        };
        let value = serde_json::to_value(GeminiBackend::part_to_api(&part)).unwrap();
        assert_eq!(value["functionResponse"]["response"]["result"], "a.txt");

        let part = Part::FunctionResponse {
            name: "probe".into(),
            response: json!({ "status": "ok" }),
        };
        let value = serde_json::to_value(GeminiBackend::part_to_api(&part)).unwrap();
        assert_eq!(value["functionResponse"]["response"]["status"], "ok");
    }

    #[test]
    fn reply_parses_text_and_function_calls_in_order() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Let me check." },
                        { "functionCall": { "name": "list_dir", "args": { "path": "." } } },
                        { "inlineData": { "mimeType": "image/png", "data": "" } }
                    ]
                }
            }],
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 4 }
        });

        let response: ApiResponse = serde_json::from_value(raw).unwrap();
        let reply = GeminiBackend::response_to_reply(response);
        assert_eq!(reply.parts.len(), 2);
        assert!(matches!(&reply.parts[0], Part::Text { text } if text == "Let me check."));
        assert!(
            matches!(&reply.parts[1], Part::FunctionCall { name, .. } if name == "list_dir")
        );
        assert_eq!(reply.usage.input_tokens, 10);
    }

    #[test]
    fn empty_candidates_yield_empty_reply() {
        let response: ApiResponse = serde_json::from_value(json!({})).unwrap();
        let reply = GeminiBackend::response_to_reply(response);
        assert!(reply.parts.is_empty());
    }

    #[test]
    fn mime_type_guessed_from_extension() {
        assert_eq!(guess_mime_type(Path::new("a/report.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("shot.PNG")), "image/png");
        assert_eq!(guess_mime_type(Path::new("mystery")), "application/octet-stream");
    }
}
