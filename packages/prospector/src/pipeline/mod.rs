//! Pipeline orchestration - job lifecycle and lead export.

pub mod export;
pub mod orchestrator;

pub use export::{export_leads, ExportFormat, LeadFilter};
pub use orchestrator::{JobOrchestrator, JobRequest, OrchestratorConfig, PreparedJob};
