//! Orchestrator façade: registries, templates, audit trail and analytics.

mod analytics;
mod audit;
mod service;
mod template;

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

pub use analytics::{SystemHealth, WorkflowAnalytics};
pub use audit::AuditRecord;
pub use service::Orchestrator;
pub use template::{TemplateParams, TemplateSummary};
