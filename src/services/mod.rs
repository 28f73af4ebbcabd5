pub mod audit;
pub mod catalog;
pub mod issuance;
pub mod reports;
pub mod users;

pub use audit::{AuditPipeline, AuditWorker, AuditWriter};
pub use catalog::EventCatalog;
pub use issuance::IssuanceEngine;
pub use reports::ReportService;
pub use users::UserDirectory;
