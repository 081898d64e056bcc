use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{MigrateError, Result};

pub type Row = Map<String, Value>;

/// Metadata attached to a provisioned auth identity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserMetadata {
    pub full_name: Option<String>,
    pub migrated: bool,
    pub legacy_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuthUser {
    pub email: String,
    pub password: String,
    pub metadata: UserMetadata,
}

/// Write side of the migration: the new backend.
#[async_trait::async_trait]
pub trait DestinationSink: Send + Sync {
    /// Insert one row and return the id the destination assigned.
    async fn insert(&self, table: &str, row: Row) -> Result<String>;
    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<()>;
    async fn create_auth_user(&self, user: &NewAuthUser) -> Result<String>;
    async fn send_password_reset(&self, email: &str) -> Result<()>;
}

/// Supabase-style destination: PostgREST for rows, GoTrue admin for identities.
#[derive(Debug, Clone)]
pub struct SupabaseSink {
    base_url: Url,
    http: Client,
    service_key: String,
}

impl SupabaseSink {
    pub fn new(base_url: &str, service_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url.trim())?;
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
            service_key: service_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, String> {
        self.base_url.join(path).map_err(|e| e.to_string())
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Send a request and return the parsed JSON body (or `Null` for empty bodies).
    async fn send_json(req: RequestBuilder) -> std::result::Result<Value, String> {
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("HTTP {status}: {}", error_message(&body)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| format!("invalid JSON response: {e}"))
    }
}

/// PostgREST and GoTrue put the useful part of an error in different keys.
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(s) = v.get(key).and_then(Value::as_str) {
                return s.to_string();
            }
        }
    }
    body.trim().chars().take(300).collect()
}

/// Pull the `id` out of an insert/create response. Handles a bare object, a
/// one-row array (PostgREST `return=representation`) and `{ "user": {...} }`.
pub fn extract_id(body: &Value) -> Option<String> {
    let obj = match body {
        Value::Array(rows) => rows.first()?,
        other => other,
    };
    let obj = obj.get("user").unwrap_or(obj);
    match obj.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A filtered PATCH answers 2xx with `[]` when the filter matched nothing.
fn matched_rows(body: &Value) -> bool {
    match body {
        Value::Array(rows) => !rows.is_empty(),
        _ => true,
    }
}

#[async_trait::async_trait]
impl DestinationSink for SupabaseSink {
    async fn insert(&self, table: &str, row: Row) -> Result<String> {
        let failed = |reason: String| MigrateError::SinkWriteFailed {
            table: table.to_string(),
            reason,
        };
        let url = self.url(&format!("rest/v1/{table}")).map_err(failed)?;
        debug!(target: "sink", table, "insert");
        let req = self
            .authed(self.http.post(url))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row));
        let body = Self::send_json(req).await.map_err(failed)?;
        extract_id(&body).ok_or_else(|| failed("insert returned no id".into()))
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<()> {
        let failed = |reason: String| MigrateError::SinkWriteFailed {
            table: table.to_string(),
            reason,
        };
        let mut url = self.url(&format!("rest/v1/{table}")).map_err(failed)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        debug!(target: "sink", table, id, "update");
        let req = self
            .authed(self.http.patch(url))
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch));
        let body = Self::send_json(req).await.map_err(failed)?;
        if !matched_rows(&body) {
            return Err(failed(format!("no row with id {id}")));
        }
        Ok(())
    }

    async fn create_auth_user(&self, user: &NewAuthUser) -> Result<String> {
        let failed = |reason: String| MigrateError::AuthProvisioningFailed {
            email: user.email.clone(),
            reason,
        };
        let url = self.url("auth/v1/admin/users").map_err(failed)?;
        let payload = json!({
            "email": user.email,
            "password": user.password,
            "email_confirm": true,
            "user_metadata": user.metadata,
        });
        let req = self.authed(self.http.post(url)).json(&payload);
        let body = Self::send_json(req).await.map_err(failed)?;
        extract_id(&body).ok_or_else(|| failed("create user returned no id".into()))
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let failed = |reason: String| MigrateError::NotificationFailed {
            email: email.to_string(),
            reason,
        };
        let url = self.url("auth/v1/recover").map_err(failed)?;
        let req = self
            .authed(self.http.post(url))
            .json(&json!({ "email": email }));
        Self::send_json(req).await.map_err(failed)?;
        Ok(())
    }
}
