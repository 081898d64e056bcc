//! Structured outcome of a migration run: one `StageReport` per stage plus the
//! run-level envelope. Logging is derived from these values, never the other
//! way round.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::time::Duration;
use tracing::info;

use crate::error::MigrateError;
use crate::model::EntityKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordIssue {
    pub legacy_id: String,
    pub code: &'static str,
    pub message: String,
}

impl RecordIssue {
    pub fn from_error(legacy_id: &str, err: &MigrateError) -> Self {
        Self {
            legacy_id: legacy_id.to_string(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: EntityKind,
    pub fetched: usize,
    pub migrated: usize,
    /// Records never written: unmapped parent, unsupported scope, undecodable row.
    pub skipped: Vec<RecordIssue>,
    /// Records whose write to the destination failed.
    pub failed: Vec<RecordIssue>,
    /// Records that were written but lost something on the way.
    pub warnings: Vec<RecordIssue>,
    /// Deferred `current_version_id` updates applied (version stage only).
    pub back_refs_resolved: usize,
    #[serde(serialize_with = "ser_ms")]
    pub elapsed: Duration,
}

fn ser_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

impl StageReport {
    pub fn new(stage: EntityKind) -> Self {
        Self {
            stage,
            fetched: 0,
            migrated: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
            back_refs_resolved: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// File a record-level error under the right bucket.
    pub fn record_error(&mut self, legacy_id: &str, err: &MigrateError) {
        let issue = RecordIssue::from_error(legacy_id, err);
        match err {
            MigrateError::SinkWriteFailed { .. } | MigrateError::AuthProvisioningFailed { .. } => {
                self.failed.push(issue)
            }
            MigrateError::NotificationFailed { .. } => self.warnings.push(issue),
            _ => self.skipped.push(issue),
        }
    }

    pub fn warn(&mut self, legacy_id: &str, err: &MigrateError) {
        self.warnings.push(RecordIssue::from_error(legacy_id, err));
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|i| i.legacy_id.as_str()).collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|i| i.legacy_id.as_str()).collect()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub fetched: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
    /// Set when a stage-level failure stopped the run.
    pub aborted: Option<String>,
    pub totals: Totals,
}

impl MigrationReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            aborted: None,
            totals: Totals::default(),
        }
    }

    pub fn push(&mut self, stage: StageReport) {
        self.totals.fetched += stage.fetched;
        self.totals.migrated += stage.migrated;
        self.totals.skipped += stage.skipped.len();
        self.totals.failed += stage.failed.len();
        self.totals.warnings += stage.warnings.len();
        self.stages.push(stage);
    }

    pub fn finish(&mut self, aborted: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.aborted = aborted;
    }

    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.stages.len() == EntityKind::ORDER.len()
    }

    pub fn stage(&self, kind: EntityKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    /// Log per-stage counts, slowest stage first.
    pub fn emit_summary(&self) {
        for stage in &self.stages {
            info!(
                target: "metrics",
                stage = %stage.stage,
                fetched = stage.fetched,
                migrated = stage.migrated,
                skipped = stage.skipped.len(),
                failed = stage.failed.len(),
                warnings = stage.warnings.len(),
                "stage summary"
            );
        }

        let mut timings: Vec<&StageReport> = self.stages.iter().collect();
        timings.sort_by_key(|s| Reverse(s.elapsed));
        let total = timings
            .iter()
            .fold(Duration::ZERO, |acc, s| acc + s.elapsed);
        for stage in timings {
            let pct = if total.is_zero() {
                0.0
            } else {
                (stage.elapsed.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            info!(
                target: "metrics",
                stage = %stage.stage,
                took_ms = format!("{:.2}", stage.elapsed_ms()),
                pct = format!("{:.1}", pct),
                "stage timing detail"
            );
        }

        info!(
            target: "metrics",
            stages = self.stages.len(),
            migrated = self.totals.migrated,
            skipped = self.totals.skipped,
            failed = self.totals.failed,
            aborted = self.aborted.as_deref().unwrap_or("-"),
            "migration summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_land_in_matching_bucket() {
        let mut stage = StageReport::new(EntityKind::Project);
        stage.record_error(
            "p1",
            &MigrateError::MappingNotFound {
                kind: EntityKind::User,
                legacy_id: "u9".into(),
            },
        );
        stage.record_error(
            "p2",
            &MigrateError::SinkWriteFailed {
                table: "projects".into(),
                reason: "check constraint".into(),
            },
        );
        stage.record_error(
            "p3",
            &MigrateError::NotificationFailed {
                email: "a@x.com".into(),
                reason: "smtp".into(),
            },
        );
        assert_eq!(stage.skipped_ids(), vec!["p1"]);
        assert_eq!(stage.failed_ids(), vec!["p2"]);
        assert_eq!(stage.warnings.len(), 1);
        assert_eq!(stage.skipped[0].code, "parent_mapping_not_found");
    }

    #[test]
    fn totals_accumulate_and_serialize() {
        let mut report = MigrationReport::start();
        let mut users = StageReport::new(EntityKind::User);
        users.fetched = 3;
        users.migrated = 2;
        users.record_error(
            "u3",
            &MigrateError::AuthProvisioningFailed {
                email: "c@x.com".into(),
                reason: "exists".into(),
            },
        );
        report.push(users);
        report.finish(None);

        assert_eq!(report.totals.fetched, 3);
        assert_eq!(report.totals.failed, 1);
        assert!(!report.is_complete());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stages"][0]["stage"], "user");
        assert_eq!(json["stages"][0]["failed"][0]["code"], "auth_provisioning_failed");
        assert!(json["stages"][0]["elapsed"].is_number());
    }
}
