/// Default base URL for the generation service.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Remote endpoints exposed by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    GenerateStream,
    Sessions,
    SessionEntries(&'a str),
    Settings,
}

impl Endpoint<'_> {
    pub fn path(&self) -> String {
        match self {
            Self::GenerateStream => "generate/stream".to_string(),
            Self::Sessions => "history/sessions".to_string(),
            Self::SessionEntries(session_id) => {
                format!("history/sessions/{}/entries", session_id.trim())
            }
            Self::Settings => "settings".to_string(),
        }
    }
}

/// Normalize a base URL: blank input falls back to the default, trailing
/// slashes are removed.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };
    base.trim_end_matches('/').to_string()
}

/// Join an endpoint path onto a base URL.
///
/// A base that already ends with the endpoint path is kept unchanged.
pub fn endpoint_url(base_url: &str, endpoint: Endpoint<'_>) -> String {
    let base = normalize_base_url(base_url);
    let path = endpoint.path();
    if base.ends_with(&format!("/{path}")) {
        return base;
    }
    format!("{base}/{path}")
}

/// Resolve a pagination link against the page it came from.
///
/// Returns `None` when the link leaves the origin of `base_url`, so
/// credentials are never sent to another host.
pub fn same_origin_link(base_url: &str, current: &str, link: &str) -> Option<String> {
    let base = reqwest::Url::parse(&normalize_base_url(base_url)).ok()?;
    let resolved = reqwest::Url::parse(current).ok()?.join(link).ok()?;
    (resolved.origin() == base.origin()).then(|| resolved.to_string())
}
