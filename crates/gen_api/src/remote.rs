use async_trait::async_trait;
use gen_contract::{
    NewRemoteEntry, RemoteEntry, RemoteError, RemoteHistory, RemoteSession, RemoteSetting,
    SettingsSource,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::GenApiClient;
use crate::error::{parse_error_message, GenApiError};
use crate::headers::{build_authenticated_headers, ACCEPT_JSON};
use crate::payload::{created_session_id, list_page, CreateSessionBody};
use crate::url::{same_origin_link, Endpoint};

/// Upper bound on `next` links followed for one listing.
pub const MAX_LIST_PAGES: usize = 20;

impl GenApiClient {
    fn json_request(&self, builder: RequestBuilder) -> Result<RequestBuilder, GenApiError> {
        let headers = Self::header_map(build_authenticated_headers(&self.config, ACCEPT_JSON)?)?;
        let builder = builder.headers(headers);
        Ok(match self.config.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, GenApiError> {
        let response = self
            .send_with_retry(|| self.json_request(self.http.get(url)), None)
            .await?;
        Ok(response.json::<Value>().await?)
    }

    async fn list_all(&self, url: String, keys: &[&str]) -> Result<Vec<Value>, GenApiError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            let value = self.get_json(&url).await?;
            let (page, following) = list_page(value, keys).ok_or_else(|| {
                GenApiError::MalformedPayload(format!("expected a list at {url}"))
            })?;
            items.extend(page);
            if pages >= MAX_LIST_PAGES {
                if following.is_some() {
                    tracing::warn!(pages, "stopping pagination at page limit");
                }
                break;
            }
            next = following.and_then(|link| {
                let resolved = same_origin_link(&self.config.base_url, &url, &link);
                if resolved.is_none() {
                    tracing::warn!(%link, "ignoring pagination link outside the base origin");
                }
                resolved
            });
        }

        Ok(items)
    }

    /// Writes are not retried; a duplicate session or entry is worse than a
    /// missing one.
    async fn post_json<B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Value, GenApiError> {
        let builder = self.json_request(self.http.post(url).json(body))?;
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenApiError::Status(status, parse_error_message(status, &text)));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>, GenApiError> {
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(GenApiError::from))
        .collect()
}

#[async_trait]
impl RemoteHistory for GenApiClient {
    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, RemoteError> {
        let url = self.endpoint(Endpoint::Sessions);
        self.list_all(url, &["results", "sessions", "items"])
            .await
            .and_then(decode_items)
            .map_err(GenApiError::into_remote_error)
    }

    async fn session_entries(&self, session_id: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let url = self.endpoint(Endpoint::SessionEntries(session_id));
        self.list_all(url, &["results", "entries", "items"])
            .await
            .and_then(decode_items)
            .map_err(GenApiError::into_remote_error)
    }

    async fn create_session(&self, title: &str) -> Result<String, RemoteError> {
        let url = self.endpoint(Endpoint::Sessions);
        let body = CreateSessionBody {
            title: title.to_string(),
        };
        let value = self
            .post_json(&url, &body)
            .await
            .map_err(GenApiError::into_remote_error)?;
        created_session_id(&value)
            .ok_or_else(|| RemoteError::Malformed("created session has no id".to_string()))
    }

    async fn create_entry(
        &self,
        session_id: &str,
        entry: NewRemoteEntry,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(Endpoint::SessionEntries(session_id));
        self.post_json(&url, &entry)
            .await
            .map(|_| ())
            .map_err(GenApiError::into_remote_error)
    }
}

#[async_trait]
impl SettingsSource for GenApiClient {
    async fn fetch_settings(&self) -> Result<Vec<RemoteSetting>, RemoteError> {
        let url = self.endpoint(Endpoint::Settings);
        self.list_all(url, &["results", "settings", "items"])
            .await
            .and_then(decode_items)
            .map_err(GenApiError::into_remote_error)
    }
}
