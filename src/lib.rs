//! Migrates a video-review workspace (users, projects, videos, versions,
//! review notes, approvals) from the legacy backend into a Supabase project,
//! re-mapping every foreign key as the destination assigns new ids.
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod sink;
pub mod source;

pub mod util {
    pub mod env;
}

#[cfg(test)]
mod testing;

pub use config::{MigrationConfig, PipelineOptions, ScopePolicy};
pub use error::MigrateError;
pub use model::EntityKind;
pub use orchestrator::Orchestrator;
pub use report::{MigrationReport, StageReport};
