//! Legacy record shapes and the entity kinds they belong to.
//!
//! Legacy ids arrive either as JSON strings or numbers; both are normalised to
//! `String` so identity maps never have to care which backend produced them.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Project,
    Video,
    VideoVersion,
    Note,
    Approval,
}

impl EntityKind {
    /// Migration order: parents strictly before children.
    pub const ORDER: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Project,
        EntityKind::Video,
        EntityKind::VideoVersion,
        EntityKind::Note,
        EntityKind::Approval,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Project => "project",
            EntityKind::Video => "video",
            EntityKind::VideoVersion => "video_version",
            EntityKind::Note => "note",
            EntityKind::Approval => "approval",
        }
    }

    /// Path segment on the legacy read API (`GET {base}/{path}`).
    pub fn source_path(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Project => "projects",
            EntityKind::Video => "videos",
            EntityKind::VideoVersion => "video_versions",
            EntityKind::Note => "notes",
            EntityKind::Approval => "approvals",
        }
    }

    /// Destination table the entity's rows are written to.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::User => "profiles",
            EntityKind::Project => "projects",
            EntityKind::Video => "videos",
            EntityKind::VideoVersion => "video_versions",
            EntityKind::Note => "notes",
            EntityKind::Approval => "approvals",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of every typed legacy record.
pub trait LegacyRecord: serde::de::DeserializeOwned {
    const KIND: EntityKind;
    fn legacy_id(&self) -> &str;
}

fn id_from_value(v: Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(number_id(&n)),
        _ => None,
    }
}

/// `1` and `1.0` name the same row; integral floats print as integers.
fn number_id(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    id_from_value(v).ok_or_else(|| serde::de::Error::custom("expected non-empty string or numeric id"))
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(v.and_then(id_from_value))
}

/// Best-effort legacy id for records that failed to decode, so the report can
/// still name the offending row.
pub fn raw_legacy_id(raw: &Value) -> String {
    raw.get("id")
        .cloned()
        .and_then(id_from_value)
        .unwrap_or_else(|| "<unknown>".to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyUser {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyUser {
    const KIND: EntityKind = EntityKind::User;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyProject {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub share_token: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyProject {
    const KIND: EntityKind = EntityKind::Project;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyVideo {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub project_id: String,
    pub title: String,
    #[serde(default, alias = "order_index")]
    pub position: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub current_version_id: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyVideo {
    const KIND: EntityKind = EntityKind::Video;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyVideoVersion {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub video_id: String,
    pub version_number: i64,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub drive_file_id: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyVideoVersion {
    const KIND: EntityKind = EntityKind::VideoVersion;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyNote {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub video_version_id: String,
    pub timestamp_seconds: f64,
    pub content: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyNote {
    const KIND: EntityKind = EntityKind::Note;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyApproval {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub scope_type: String,
    #[serde(deserialize_with = "de_id")]
    pub scope_id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub video_version_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub approver_name: Option<String>,
    #[serde(default)]
    pub approver_email: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LegacyRecord for LegacyApproval {
    const KIND: EntityKind = EntityKind::Approval;
    fn legacy_id(&self) -> &str {
        &self.id
    }
}

impl LegacyApproval {
    pub fn scope(&self) -> ApprovalScope {
        ApprovalScope::from_parts(&self.scope_type, &self.scope_id)
    }
}

/// What an approval targets. `scope_type` decides how `scope_id` is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalScope {
    Video(String),
    Project(String),
    Other { kind: String, id: String },
}

impl ApprovalScope {
    /// Recognised types match case-insensitively; any other `scope_type` is
    /// kept exactly as the legacy system wrote it.
    pub fn from_parts(scope_type: &str, scope_id: &str) -> Self {
        let id = scope_id.to_string();
        match scope_type.trim().to_ascii_lowercase().as_str() {
            "video" => ApprovalScope::Video(id),
            "project" => ApprovalScope::Project(id),
            _ => ApprovalScope::Other {
                kind: scope_type.to_string(),
                id,
            },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ApprovalScope::Video(_) => "video",
            ApprovalScope::Project(_) => "project",
            ApprovalScope::Other { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ApprovalScope::Video(id) | ApprovalScope::Project(id) => id,
            ApprovalScope::Other { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_string_ids_normalise() {
        let v: LegacyVideo = serde_json::from_value(json!({
            "id": 17,
            "project_id": "p-1",
            "title": "Cut A",
            "order_index": 2,
            "current_version_id": 99
        }))
        .unwrap();
        assert_eq!(v.id, "17");
        assert_eq!(v.position, Some(2));
        assert_eq!(v.current_version_id.as_deref(), Some("99"));
    }

    #[test]
    fn empty_optional_id_reads_as_none() {
        let v: LegacyVideo = serde_json::from_value(json!({
            "id": "v1",
            "project_id": "p1",
            "title": "Teaser",
            "current_version_id": ""
        }))
        .unwrap();
        assert!(v.current_version_id.is_none());
    }

    #[test]
    fn missing_required_id_is_rejected() {
        let res = serde_json::from_value::<LegacyProject>(json!({
            "id": "p1",
            "name": "Orphan"
        }));
        assert!(res.is_err());
        assert_eq!(raw_legacy_id(&json!({"id": 5})), "5");
        assert_eq!(raw_legacy_id(&json!({})), "<unknown>");
    }

    #[test]
    fn scope_type_is_case_insensitive() {
        assert_eq!(
            ApprovalScope::from_parts(" Video ", "v1"),
            ApprovalScope::Video("v1".into())
        );
        assert_eq!(
            ApprovalScope::from_parts("project", "p1"),
            ApprovalScope::Project("p1".into())
        );
        let other = ApprovalScope::from_parts("folder", "f1");
        assert_eq!(other.kind(), "folder");
        assert_eq!(other.id(), "f1");
        assert_eq!(ApprovalScope::from_parts(" Folder ", "f1").kind(), " Folder ");
    }

    #[test]
    fn integral_float_ids_match_integer_ids() {
        let p: LegacyProject = serde_json::from_value(json!({
            "id": 3.0,
            "user_id": 1.0,
            "name": "Float keyed"
        }))
        .unwrap();
        assert_eq!(p.id, "3");
        assert_eq!(p.user_id, "1");
        assert_eq!(raw_legacy_id(&json!({"id": 2.5})), "2.5");
    }

    #[test]
    fn user_accepts_name_alias() {
        let u: LegacyUser =
            serde_json::from_value(json!({"id": "u1", "email": "a@x.com", "name": "Ada"})).unwrap();
        assert_eq!(u.full_name.as_deref(), Some("Ada"));
    }
}
