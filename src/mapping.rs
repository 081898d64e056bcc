//! Field mapping rules: typed legacy record + resolved parent ids -> destination row.
//!
//! Everything here is pure; id resolution failures are reported by the caller
//! before a row is built.
use serde_json::{json, Value};

use crate::config::ScopePolicy;
use crate::error::{MigrateError, Result};
use crate::identity::IdentityRegistry;
use crate::model::{
    ApprovalScope, EntityKind, LegacyApproval, LegacyNote, LegacyProject, LegacyUser,
    LegacyVideo, LegacyVideoVersion,
};
use crate::sink::Row;

const DEFAULT_PROJECT_STATUS: &str = "active";

fn put(row: &mut Row, key: &str, value: impl Into<Value>) {
    row.insert(key.to_string(), value.into());
}

/// Optional values become `null`, keeping every destination column explicit.
fn put_opt<T: Into<Value>>(row: &mut Row, key: &str, value: Option<T>) {
    row.insert(key.to_string(), value.map_or(Value::Null, Into::into));
}

/// Only written when the source had it, so the destination default applies otherwise.
fn put_created_at(row: &mut Row, created_at: Option<&String>) {
    if let Some(ts) = created_at.filter(|s| !s.trim().is_empty()) {
        put(row, "created_at", ts.as_str());
    }
}

fn trimmed(s: Option<&String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn profile_row(user: &LegacyUser, auth_id: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "id", auth_id);
    put(&mut row, "email", user.email.trim().to_ascii_lowercase());
    put_opt(&mut row, "full_name", trimmed(user.full_name.as_ref()));
    put_opt(&mut row, "avatar_url", user.avatar_url.clone());
    put(&mut row, "legacy_id", user.id.as_str());
    put_created_at(&mut row, user.created_at.as_ref());
    row
}

pub fn project_row(project: &LegacyProject, owner_id: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "owner_id", owner_id);
    put(&mut row, "name", project.name.as_str());
    put_opt(&mut row, "description", project.description.clone());
    put(
        &mut row,
        "status",
        trimmed(project.status.as_ref()).unwrap_or_else(|| DEFAULT_PROJECT_STATUS.to_string()),
    );
    put_opt(&mut row, "share_token", project.share_token.clone());
    put(&mut row, "legacy_id", project.id.as_str());
    put_created_at(&mut row, project.created_at.as_ref());
    row
}

/// `current_version_id` stays null here; it is patched in after the version stage.
pub fn video_row(video: &LegacyVideo, project_id: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "project_id", project_id);
    put(&mut row, "title", video.title.as_str());
    put(&mut row, "position", video.position.unwrap_or(0));
    put(&mut row, "current_version_id", Value::Null);
    put_opt(&mut row, "thumbnail_url", video.thumbnail_url.clone());
    put(&mut row, "legacy_id", video.id.as_str());
    put_created_at(&mut row, video.created_at.as_ref());
    row
}

pub fn version_row(version: &LegacyVideoVersion, video_id: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "video_id", video_id);
    put(&mut row, "version_number", version.version_number);
    put_opt(&mut row, "file_url", version.file_url.clone());
    put_opt(&mut row, "storage_path", version.storage_path.clone());
    put_opt(&mut row, "drive_file_id", version.drive_file_id.clone());
    put_opt(&mut row, "duration_seconds", version.duration_seconds);
    put(&mut row, "legacy_id", version.id.as_str());
    put_created_at(&mut row, version.created_at.as_ref());
    row
}

pub fn note_row(note: &LegacyNote, version_id: &str, author_id: Option<&str>) -> Row {
    let mut row = Row::new();
    put(&mut row, "video_version_id", version_id);
    put(&mut row, "timestamp_seconds", note.timestamp_seconds);
    put(&mut row, "content", note.content.as_str());
    put_opt(&mut row, "user_id", author_id);
    put_opt(&mut row, "author_name", note.author_name.clone());
    put_opt(&mut row, "author_email", note.author_email.clone());
    put(&mut row, "resolved", note.resolved);
    put(&mut row, "legacy_id", note.id.as_str());
    put_created_at(&mut row, note.created_at.as_ref());
    row
}

pub fn approval_row(
    approval: &LegacyApproval,
    scope_type: &str,
    scope_id: &str,
    version_id: Option<&str>,
) -> Row {
    let mut row = Row::new();
    put(&mut row, "scope_type", scope_type);
    put(&mut row, "scope_id", scope_id);
    put_opt(&mut row, "video_version_id", version_id);
    put(&mut row, "status", approval.status.as_str());
    put_opt(&mut row, "approver_name", approval.approver_name.clone());
    put_opt(&mut row, "approver_email", approval.approver_email.clone());
    put_opt(&mut row, "comment", approval.comment.clone());
    put(&mut row, "legacy_id", approval.id.as_str());
    put_created_at(&mut row, approval.created_at.as_ref());
    row
}

/// Resolve an approval's scope id under the given policy.
///
/// `Resolve`: video and project scopes go through their maps, anything else is
/// rejected. `Passthrough`: only video scopes are mapped, every other scope id
/// is emitted as-is (legacy id included).
pub fn resolve_scope(
    scope: &ApprovalScope,
    ids: &IdentityRegistry,
    policy: ScopePolicy,
) -> Result<String> {
    match (scope, policy) {
        (ApprovalScope::Video(id), _) => ids.resolve(EntityKind::Video, id).map(str::to_string),
        (ApprovalScope::Project(id), ScopePolicy::Resolve) => {
            ids.resolve(EntityKind::Project, id).map(str::to_string)
        }
        (ApprovalScope::Other { kind, .. }, ScopePolicy::Resolve) => {
            Err(MigrateError::UnsupportedScope {
                scope_type: kind.clone(),
            })
        }
        (other, ScopePolicy::Passthrough) => Ok(other.id().to_string()),
    }
}

/// Patch applied to a migrated video once its current version is known.
pub fn current_version_patch(version_id: &str) -> Row {
    let mut row = Row::new();
    put(&mut row, "current_version_id", json!(version_id));
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approval(scope_type: &str, scope_id: &str) -> LegacyApproval {
        serde_json::from_value(json!({
            "id": "a1",
            "scope_type": scope_type,
            "scope_id": scope_id,
            "status": "approved"
        }))
        .unwrap()
    }

    fn registry() -> IdentityRegistry {
        let mut ids = IdentityRegistry::new();
        ids.record(EntityKind::Video, "v1", "new-v1").unwrap();
        ids.record(EntityKind::Project, "p1", "new-p1").unwrap();
        ids
    }

    #[test]
    fn project_defaults_status_and_keeps_share_token() {
        let p: LegacyProject = serde_json::from_value(json!({
            "id": "p1",
            "user_id": "u1",
            "name": "Launch spot",
            "share_token": "tok-123",
            "status": "  "
        }))
        .unwrap();
        let row = project_row(&p, "owner-1");
        assert_eq!(row["owner_id"], "owner-1");
        assert_eq!(row["status"], "active");
        assert_eq!(row["share_token"], "tok-123");
        assert_eq!(row["legacy_id"], "p1");
        assert!(!row.contains_key("created_at"));
    }

    #[test]
    fn profile_uses_auth_id_and_normalised_email() {
        let u: LegacyUser = serde_json::from_value(json!({
            "id": 7,
            "email": " A@X.com ",
            "full_name": "Ada",
            "created_at": "2024-01-02T03:04:05Z"
        }))
        .unwrap();
        let row = profile_row(&u, "auth-7");
        assert_eq!(row["id"], "auth-7");
        assert_eq!(row["email"], "a@x.com");
        assert_eq!(row["legacy_id"], "7");
        assert_eq!(row["created_at"], "2024-01-02T03:04:05Z");
        assert_eq!(row["avatar_url"], Value::Null);
    }

    #[test]
    fn video_row_defers_current_version() {
        let v: LegacyVideo = serde_json::from_value(json!({
            "id": "v1",
            "project_id": "p1",
            "title": "Cut",
            "current_version_id": "vv3"
        }))
        .unwrap();
        let row = video_row(&v, "new-p1");
        assert_eq!(row["current_version_id"], Value::Null);
        assert_eq!(row["position"], 0);
    }

    #[test]
    fn resolve_policy_maps_video_and_project_scopes() {
        let ids = registry();
        let p = ScopePolicy::Resolve;
        assert_eq!(resolve_scope(&approval("video", "v1").scope(), &ids, p).unwrap(), "new-v1");
        assert_eq!(resolve_scope(&approval("project", "p1").scope(), &ids, p).unwrap(), "new-p1");
        assert!(matches!(
            resolve_scope(&approval("folder", "f1").scope(), &ids, p),
            Err(MigrateError::UnsupportedScope { .. })
        ));
        assert!(matches!(
            resolve_scope(&approval("video", "ghost").scope(), &ids, p),
            Err(MigrateError::MappingNotFound { kind: EntityKind::Video, .. })
        ));
    }

    #[test]
    fn passthrough_policy_only_maps_video_scopes() {
        let ids = registry();
        let p = ScopePolicy::Passthrough;
        assert_eq!(resolve_scope(&approval("video", "v1").scope(), &ids, p).unwrap(), "new-v1");
        assert_eq!(resolve_scope(&approval("project", "p1").scope(), &ids, p).unwrap(), "p1");
        assert_eq!(resolve_scope(&approval("folder", "f1").scope(), &ids, p).unwrap(), "f1");
    }
}
