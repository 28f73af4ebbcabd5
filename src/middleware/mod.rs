pub mod access_audit;

pub use access_audit::AccessAuditLayer;
