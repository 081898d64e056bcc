use thiserror::Error;

use crate::model::EntityKind;

/// Failure taxonomy for a migration run.
///
/// Only [`MigrateError::SourceUnavailable`] and [`MigrateError::Config`] abort a
/// run. Every other variant is contained to the record that produced it and
/// ends up in the stage report.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("legacy source unavailable for {entity}: {reason}")]
    SourceUnavailable { entity: EntityKind, reason: String },

    #[error("no {kind} mapping for legacy id {legacy_id}")]
    MappingNotFound { kind: EntityKind, legacy_id: String },

    #[error("write to {table} failed: {reason}")]
    SinkWriteFailed { table: String, reason: String },

    #[error("auth provisioning failed for {email}: {reason}")]
    AuthProvisioningFailed { email: String, reason: String },

    #[error("password reset notification failed for {email}: {reason}")]
    NotificationFailed { email: String, reason: String },

    #[error("invalid {kind} record: {reason}")]
    InvalidRecord { kind: EntityKind, reason: String },

    #[error("unsupported approval scope '{scope_type}'")]
    UnsupportedScope { scope_type: String },

    #[error("{kind} legacy id {legacy_id} already mapped")]
    DuplicateLegacyId { kind: EntityKind, legacy_id: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    /// Stage-level errors terminate the run; everything else is skipped and reported.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Config(_))
    }

    /// Short machine-friendly tag used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::MappingNotFound { .. } => "parent_mapping_not_found",
            Self::SinkWriteFailed { .. } => "sink_write_failed",
            Self::AuthProvisioningFailed { .. } => "auth_provisioning_failed",
            Self::NotificationFailed { .. } => "notification_failed",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::UnsupportedScope { .. } => "unsupported_scope",
            Self::DuplicateLegacyId { .. } => "duplicate_legacy_id",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
