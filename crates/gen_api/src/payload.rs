use gen_contract::GenerationRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire body for the streaming generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequestBody {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub intent: String,
    /// Legacy alias of `intent` still read by older backends.
    pub model_type: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub include_comments: bool,
    pub include_docstring: bool,
    pub include_type_hints: bool,
    pub skill_level: String,
    pub explanation_detail: String,
    pub project_context: String,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_true() -> bool {
    true
}

impl From<&GenerationRequest> for GenerateRequestBody {
    fn from(request: &GenerationRequest) -> Self {
        let sampling = &request.sampling;
        let personalization = &request.personalization;
        Self {
            prompt: request.prompt.clone(),
            context: request
                .context
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
            intent: request.intent.as_str().to_string(),
            model_type: request.intent.as_str().to_string(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
            include_comments: sampling.include_comments,
            include_docstring: sampling.include_docstring,
            include_type_hints: sampling.include_type_hints,
            skill_level: personalization.skill_level.as_str().to_string(),
            explanation_detail: personalization.explanation_detail.as_str().to_string(),
            project_context: personalization.project_context.clone(),
            stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionBody {
    pub title: String,
}

/// Extracts a list from either a bare array or a paginated envelope.
///
/// Returns the items and the `next` page URL, if any.
pub fn list_page(value: Value, keys: &[&str]) -> Option<(Vec<Value>, Option<String>)> {
    match value {
        Value::Array(items) => Some((items, None)),
        Value::Object(mut map) => {
            let next = map
                .get("next")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);
            keys.iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .map(|items| (items, next))
        }
        _ => None,
    }
}

/// Reads the created session id from a `create_session` response.
pub fn created_session_id(value: &Value) -> Option<String> {
    let id = value
        .get("id")
        .or_else(|| value.get("session_id"))
        .or_else(|| value.get("session").and_then(|session| session.get("id")))?;
    match id {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
