//! In-memory source and sink used by the pipeline tests.
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{MigrateError, Result};
use crate::model::EntityKind;
use crate::sink::{DestinationSink, NewAuthUser, Row};
use crate::source::LegacySource;

#[derive(Default)]
pub struct MemorySource {
    data: HashMap<EntityKind, Vec<Value>>,
    unavailable: HashSet<EntityKind>,
    pub fetched: Mutex<Vec<EntityKind>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: EntityKind, rows: Vec<Value>) -> Self {
        self.data.insert(kind, rows);
        self
    }

    pub fn failing(mut self, kind: EntityKind) -> Self {
        self.unavailable.insert(kind);
        self
    }
}

#[async_trait::async_trait]
impl LegacySource for MemorySource {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>> {
        self.fetched.lock().unwrap().push(kind);
        if self.unavailable.contains(&kind) {
            return Err(MigrateError::SourceUnavailable {
                entity: kind,
                reason: "HTTP 503 Service Unavailable".into(),
            });
        }
        Ok(self.data.get(&kind).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct SinkState {
    next_id: usize,
    tables: HashMap<String, Vec<Row>>,
    auth_users: Vec<(String, NewAuthUser)>,
    resets: Vec<String>,
    updates: Vec<(String, String, Row)>,
}

/// Destination that assigns `"{table}-{n}"` ids and keeps every row it is given.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<SinkState>,
    reject_emails: HashSet<String>,
    /// `(table, legacy_id)` pairs whose insert is refused.
    reject_rows: HashSet<(String, String)>,
    /// `(table, legacy_id)` pairs whose stored row refuses updates.
    reject_updates: HashSet<(String, String)>,
    reject_resets: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_email(mut self, email: &str) -> Self {
        self.reject_emails.insert(email.to_string());
        self
    }

    pub fn reject_row(mut self, table: &str, legacy_id: &str) -> Self {
        self.reject_rows
            .insert((table.to_string(), legacy_id.to_string()));
        self
    }

    pub fn reject_update(mut self, table: &str, legacy_id: &str) -> Self {
        self.reject_updates
            .insert((table.to_string(), legacy_id.to_string()));
        self
    }

    pub fn reject_resets(mut self) -> Self {
        self.reject_resets = true;
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row_by_legacy(&self, table: &str, legacy_id: &str) -> Option<Row> {
        self.rows(table)
            .into_iter()
            .find(|r| r.get("legacy_id").and_then(Value::as_str) == Some(legacy_id))
    }

    pub fn auth_users(&self) -> Vec<(String, NewAuthUser)> {
        self.state.lock().unwrap().auth_users.clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.state.lock().unwrap().resets.clone()
    }

    pub fn updates(&self) -> Vec<(String, String, Row)> {
        self.state.lock().unwrap().updates.clone()
    }
}

#[async_trait::async_trait]
impl DestinationSink for MemorySink {
    async fn insert(&self, table: &str, mut row: Row) -> Result<String> {
        let legacy_id = row
            .get("legacy_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self
            .reject_rows
            .contains(&(table.to_string(), legacy_id))
        {
            return Err(MigrateError::SinkWriteFailed {
                table: table.to_string(),
                reason: "violates check constraint".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                let id = format!("{table}-{}", state.next_id);
                row.insert("id".into(), Value::String(id.clone()));
                id
            }
        };
        state.tables.entry(table.to_string()).or_default().push(row);
        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .updates
            .push((table.to_string(), id.to_string(), patch.clone()));
        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| MigrateError::SinkWriteFailed {
                table: table.to_string(),
                reason: format!("no row with id {id}"),
            })?;
        let legacy_id = row
            .get("legacy_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self
            .reject_updates
            .contains(&(table.to_string(), legacy_id))
        {
            return Err(MigrateError::SinkWriteFailed {
                table: table.to_string(),
                reason: "row is locked".into(),
            });
        }
        row.extend(patch);
        Ok(())
    }

    async fn create_auth_user(&self, user: &NewAuthUser) -> Result<String> {
        if self.reject_emails.contains(&user.email) {
            return Err(MigrateError::AuthProvisioningFailed {
                email: user.email.clone(),
                reason: "email rejected".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("auth-{}", state.next_id);
        state.auth_users.push((id.clone(), user.clone()));
        Ok(id)
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        if self.reject_resets {
            return Err(MigrateError::NotificationFailed {
                email: email.to_string(),
                reason: "mailer offline".into(),
            });
        }
        self.state.lock().unwrap().resets.push(email.to_string());
        Ok(())
    }
}
