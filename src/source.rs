use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{MigrateError, Result};
use crate::model::EntityKind;

/// Read side of the migration: the legacy backend.
#[async_trait::async_trait]
pub trait LegacySource: Send + Sync {
    /// Every record of one entity kind, in the order the source returns them.
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>>;
}

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Legacy read API client.
///
/// - GET {base_url}/{entity} with `Authorization: Bearer <token>`
/// - response body is a JSON array holding the whole result set (no paging)
#[derive(Debug, Clone)]
pub struct LegacyApiClient {
    base_url: Url,
    http: Client,
    token: String,
}

impl LegacyApiClient {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url.trim())?;
        // Url::join drops the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(concat!("review-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url,
            http,
            token: token.to_string(),
        })
    }

    pub fn endpoint(&self, kind: EntityKind) -> Result<Url> {
        self.base_url
            .join(kind.source_path())
            .map_err(|e| MigrateError::SourceUnavailable {
                entity: kind,
                reason: format!("bad endpoint: {e}"),
            })
    }
}

#[async_trait::async_trait]
impl LegacySource for LegacyApiClient {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>> {
        let url = self.endpoint(kind)?;
        debug!(target: "source", %url, "fetching legacy records");
        let unavailable = |reason: String| MigrateError::SourceUnavailable {
            entity: kind,
            reason,
        };

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!(
                "HTTP {status}: {}",
                truncate_for_log(body, 300)
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid JSON: {e}")))?;
        match body {
            Value::Array(rows) => {
                info!(target: "source", entity = %kind, rows = rows.len(), "fetched legacy records");
                Ok(rows)
            }
            other => Err(unavailable(format!(
                "expected JSON array, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_entity_path() {
        let client = LegacyApiClient::new("https://legacy.example.com/api", "t", 5).unwrap();
        assert_eq!(
            client.endpoint(EntityKind::VideoVersion).unwrap().as_str(),
            "https://legacy.example.com/api/video_versions"
        );
        let client = LegacyApiClient::new("https://legacy.example.com/api/", "t", 5).unwrap();
        assert_eq!(
            client.endpoint(EntityKind::User).unwrap().as_str(),
            "https://legacy.example.com/api/users"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(LegacyApiClient::new("not a url", "t", 5).is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = truncate_for_log("ééééé".to_string(), 3);
        assert_eq!(s, "é…");
    }
}
