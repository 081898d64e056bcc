//! Stage orchestrator: users -> projects -> videos -> video versions -> notes -> approvals.
//!
//! Every stage is run once, forward-only, and records are processed one at a
//! time in source order. A failed bulk fetch stops the run; anything that goes
//! wrong with a single record is logged, filed in the stage report, and the
//! loop moves on.
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::PipelineOptions;
use crate::error::{MigrateError, Result};
use crate::identity::IdentityRegistry;
use crate::mapping;
use crate::model::{
    raw_legacy_id, EntityKind, LegacyApproval, LegacyNote, LegacyProject, LegacyRecord,
    LegacyUser, LegacyVideo, LegacyVideoVersion,
};
use crate::report::{MigrationReport, StageReport};
use crate::sink::{DestinationSink, NewAuthUser, UserMetadata};
use crate::source::LegacySource;

/// A video whose `current_version_id` can only be written once the version
/// stage has assigned new ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBackRef {
    pub video_legacy_id: String,
    pub video_new_id: String,
    pub version_legacy_id: String,
}

pub fn temporary_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub struct Orchestrator {
    source: Arc<dyn LegacySource>,
    sink: Arc<dyn DestinationSink>,
    options: PipelineOptions,
    ids: IdentityRegistry,
    pending: Vec<PendingBackRef>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn LegacySource>,
        sink: Arc<dyn DestinationSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            sink,
            options,
            ids: IdentityRegistry::new(),
            pending: Vec::new(),
        }
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.ids
    }

    /// Run all six stages in dependency order. The returned report has
    /// `aborted` set when a stage's bulk fetch failed.
    pub async fn run(&mut self) -> MigrationReport {
        let mut report = MigrationReport::start();
        for kind in EntityKind::ORDER {
            info!(stage = %kind, "stage starting");
            match self.run_stage(kind).await {
                Ok(stage) => {
                    info!(
                        stage = %kind,
                        fetched = stage.fetched,
                        migrated = stage.migrated,
                        skipped = stage.skipped.len(),
                        failed = stage.failed.len(),
                        "stage finished"
                    );
                    report.push(stage);
                }
                Err(e) => {
                    error!(stage = %kind, error = %e, "stage aborted; stopping migration");
                    report.finish(Some(e.to_string()));
                    return report;
                }
            }
        }
        report.finish(None);
        report
    }

    /// Run a single stage with timing. Only stage-level failures come back as `Err`.
    pub async fn run_stage(&mut self, kind: EntityKind) -> Result<StageReport> {
        let start = Instant::now();
        let mut report = StageReport::new(kind);
        let result = match kind {
            EntityKind::User => self.migrate_users(&mut report).await,
            EntityKind::Project => self.migrate_projects(&mut report).await,
            EntityKind::Video => self.migrate_videos(&mut report).await,
            EntityKind::VideoVersion => self.migrate_versions(&mut report).await,
            EntityKind::Note => self.migrate_notes(&mut report).await,
            EntityKind::Approval => self.migrate_approvals(&mut report).await,
        };
        report.elapsed = start.elapsed();
        info!(
            target: "metrics",
            stage = %kind,
            took_ms = format!("{:.2}", report.elapsed_ms()),
            success = result.is_ok(),
            "stage timing"
        );
        result.map(|()| report)
    }

    /// Bulk fetch plus per-record decode. Undecodable rows are skipped, not fatal.
    async fn fetch<T: LegacyRecord>(&self, report: &mut StageReport) -> Result<Vec<T>> {
        let kind = T::KIND;
        let raw = self.source.fetch_all(kind).await?;
        report.fetched = raw.len();
        let mut out = Vec::with_capacity(raw.len());
        for value in raw {
            let legacy_id = raw_legacy_id(&value);
            match serde_json::from_value::<T>(value) {
                Ok(rec) => out.push(rec),
                Err(e) => {
                    let err = MigrateError::InvalidRecord {
                        kind,
                        reason: e.to_string(),
                    };
                    warn!(entity = %kind, %legacy_id, error = %err, "skipping undecodable record");
                    report.record_error(&legacy_id, &err);
                }
            }
        }
        Ok(out)
    }

    /// Guard against a source returning the same legacy id twice; the first
    /// occurrence wins and later ones never reach the destination.
    fn check_unmapped(&self, kind: EntityKind, legacy_id: &str) -> Result<()> {
        if self.ids.contains(kind, legacy_id) {
            return Err(MigrateError::DuplicateLegacyId {
                kind,
                legacy_id: legacy_id.to_string(),
            });
        }
        Ok(())
    }

    fn skip(report: &mut StageReport, legacy_id: &str, err: MigrateError) {
        warn!(stage = %report.stage, %legacy_id, error = %err, "skipping record");
        report.record_error(legacy_id, &err);
    }

    fn write_failed(report: &mut StageReport, legacy_id: &str, err: MigrateError) {
        error!(stage = %report.stage, %legacy_id, error = %err, "destination write failed");
        report.record_error(legacy_id, &err);
    }

    /// Insert a row and record its mapping. Returns the new id on success.
    async fn insert_mapped(
        &mut self,
        report: &mut StageReport,
        kind: EntityKind,
        legacy_id: &str,
        row: crate::sink::Row,
    ) -> Option<String> {
        let new_id = match self.sink.insert(kind.table(), row).await {
            Ok(id) => id,
            Err(e) => {
                Self::write_failed(report, legacy_id, e);
                return None;
            }
        };
        if let Err(e) = self.ids.record(kind, legacy_id, &new_id) {
            Self::skip(report, legacy_id, e);
            return None;
        }
        report.migrated += 1;
        Some(new_id)
    }

    async fn migrate_users(&mut self, report: &mut StageReport) -> Result<()> {
        let users: Vec<LegacyUser> = self.fetch(report).await?;
        for user in users {
            if let Err(e) = self.check_unmapped(EntityKind::User, &user.id) {
                Self::skip(report, &user.id, e);
                continue;
            }
            let email = user.email.trim().to_ascii_lowercase();
            let new_user = NewAuthUser {
                email: email.clone(),
                password: temporary_password(self.options.temp_password_len),
                metadata: UserMetadata {
                    full_name: user.full_name.clone(),
                    migrated: true,
                    legacy_id: user.id.clone(),
                },
            };
            let auth_id = match self.sink.create_auth_user(&new_user).await {
                Ok(id) => id,
                Err(e) => {
                    Self::write_failed(report, &user.id, e);
                    continue;
                }
            };
            if let Err(e) = self.ids.record(EntityKind::User, &user.id, &auth_id) {
                Self::skip(report, &user.id, e);
                continue;
            }
            report.migrated += 1;

            // The auth identity exists from here on, so the user stays mapped
            // even if the profile row or the notification fails.
            let profile = mapping::profile_row(&user, &auth_id);
            if let Err(e) = self.sink.insert(EntityKind::User.table(), profile).await {
                error!(legacy_id = %user.id, error = %e, "profile insert failed after auth user creation");
                report.warn(&user.id, &e);
            }
            if self.options.notify_users {
                match self.sink.send_password_reset(&email).await {
                    Ok(()) => info!(legacy_id = %user.id, "password reset sent"),
                    Err(e) => {
                        warn!(legacy_id = %user.id, error = %e, "password reset not sent");
                        report.warn(&user.id, &e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn migrate_projects(&mut self, report: &mut StageReport) -> Result<()> {
        let projects: Vec<LegacyProject> = self.fetch(report).await?;
        for project in projects {
            if let Err(e) = self.check_unmapped(EntityKind::Project, &project.id) {
                Self::skip(report, &project.id, e);
                continue;
            }
            let owner_id = match self.ids.resolve(EntityKind::User, &project.user_id) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    Self::skip(report, &project.id, e);
                    continue;
                }
            };
            let row = mapping::project_row(&project, &owner_id);
            self.insert_mapped(report, EntityKind::Project, &project.id, row)
                .await;
        }
        Ok(())
    }

    async fn migrate_videos(&mut self, report: &mut StageReport) -> Result<()> {
        let videos: Vec<LegacyVideo> = self.fetch(report).await?;
        for video in videos {
            if let Err(e) = self.check_unmapped(EntityKind::Video, &video.id) {
                Self::skip(report, &video.id, e);
                continue;
            }
            let project_id = match self.ids.resolve(EntityKind::Project, &video.project_id) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    Self::skip(report, &video.id, e);
                    continue;
                }
            };
            let row = mapping::video_row(&video, &project_id);
            let Some(new_id) = self
                .insert_mapped(report, EntityKind::Video, &video.id, row)
                .await
            else {
                continue;
            };
            if let Some(version_legacy_id) = video.current_version_id {
                self.pending.push(PendingBackRef {
                    video_legacy_id: video.id,
                    video_new_id: new_id,
                    version_legacy_id,
                });
            }
        }
        Ok(())
    }

    async fn migrate_versions(&mut self, report: &mut StageReport) -> Result<()> {
        let versions: Vec<LegacyVideoVersion> = self.fetch(report).await?;
        // Videos that already carry an explicit pointer ignore `is_current` flags.
        let mut has_ref: HashSet<String> = self
            .pending
            .iter()
            .map(|p| p.video_legacy_id.clone())
            .collect();

        for version in versions {
            if let Err(e) = self.check_unmapped(EntityKind::VideoVersion, &version.id) {
                Self::skip(report, &version.id, e);
                continue;
            }
            let video_id = match self.ids.resolve(EntityKind::Video, &version.video_id) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    Self::skip(report, &version.id, e);
                    continue;
                }
            };
            let row = mapping::version_row(&version, &video_id);
            if self
                .insert_mapped(report, EntityKind::VideoVersion, &version.id, row)
                .await
                .is_none()
            {
                continue;
            }
            if version.is_current {
                if has_ref.insert(version.video_id.clone()) {
                    self.pending.push(PendingBackRef {
                        video_legacy_id: version.video_id.clone(),
                        video_new_id: video_id,
                        version_legacy_id: version.id.clone(),
                    });
                } else {
                    warn!(
                        legacy_id = %version.id,
                        video = %version.video_id,
                        "version flagged current but video already has a current version; ignoring flag"
                    );
                }
            }
        }

        self.resolve_back_refs(report).await;
        Ok(())
    }

    /// Second pass of the version stage: point each migrated video at the new
    /// id of its current version. Unresolvable references leave the video
    /// without a current version.
    async fn resolve_back_refs(&mut self, report: &mut StageReport) {
        let pending = std::mem::take(&mut self.pending);
        for back_ref in pending {
            let version_id = match self
                .ids
                .resolve(EntityKind::VideoVersion, &back_ref.version_legacy_id)
            {
                Ok(id) => id.to_string(),
                Err(e) => {
                    warn!(
                        video = %back_ref.video_legacy_id,
                        error = %e,
                        "current version was not migrated; video left without current version"
                    );
                    report.warn(&back_ref.video_legacy_id, &e);
                    continue;
                }
            };
            let patch = mapping::current_version_patch(&version_id);
            match self
                .sink
                .update(EntityKind::Video.table(), &back_ref.video_new_id, patch)
                .await
            {
                Ok(()) => report.back_refs_resolved += 1,
                Err(e) => {
                    error!(video = %back_ref.video_legacy_id, error = %e, "current version update failed");
                    report.warn(&back_ref.video_legacy_id, &e);
                }
            }
        }
    }

    async fn migrate_notes(&mut self, report: &mut StageReport) -> Result<()> {
        let notes: Vec<LegacyNote> = self.fetch(report).await?;
        for note in notes {
            if let Err(e) = self.check_unmapped(EntityKind::Note, &note.id) {
                Self::skip(report, &note.id, e);
                continue;
            }
            let version_id = match self.ids.resolve(EntityKind::VideoVersion, &note.video_version_id) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    Self::skip(report, &note.id, e);
                    continue;
                }
            };
            // Client feedback is often anonymous; a missing author never drops the note.
            let author_id = match self.ids.resolve_opt(EntityKind::User, note.user_id.as_deref()) {
                Ok(id) => id,
                Err(e) => {
                    warn!(legacy_id = %note.id, error = %e, "note author not migrated; keeping note without user_id");
                    report.warn(&note.id, &e);
                    None
                }
            };
            let row = mapping::note_row(&note, &version_id, author_id.as_deref());
            self.insert_mapped(report, EntityKind::Note, &note.id, row)
                .await;
        }
        Ok(())
    }

    async fn migrate_approvals(&mut self, report: &mut StageReport) -> Result<()> {
        let approvals: Vec<LegacyApproval> = self.fetch(report).await?;
        for approval in approvals {
            if let Err(e) = self.check_unmapped(EntityKind::Approval, &approval.id) {
                Self::skip(report, &approval.id, e);
                continue;
            }
            let scope = approval.scope();
            let scope_id = match mapping::resolve_scope(&scope, &self.ids, self.options.scope_policy) {
                Ok(id) => id,
                Err(e) => {
                    Self::skip(report, &approval.id, e);
                    continue;
                }
            };
            let version_id = match self
                .ids
                .resolve_opt(EntityKind::VideoVersion, approval.video_version_id.as_deref())
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(legacy_id = %approval.id, error = %e, "approved version not migrated; keeping approval without version");
                    report.warn(&approval.id, &e);
                    None
                }
            };
            let row = mapping::approval_row(&approval, scope.kind(), &scope_id, version_id.as_deref());
            self.insert_mapped(report, EntityKind::Approval, &approval.id, row)
                .await;
        }
        Ok(())
    }
}
