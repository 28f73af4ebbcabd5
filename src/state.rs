use std::sync::Arc;

use crate::services::{AuditPipeline, EventCatalog, IssuanceEngine, ReportService, UserDirectory};
use crate::store::RecordStore;

/// Shared handler state. Every service talks to the same store and audit queue.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<EventCatalog>,
    pub issuance: Arc<IssuanceEngine>,
    pub reports: Arc<ReportService>,
    pub users: Arc<UserDirectory>,
    pub audit: AuditPipeline,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditPipeline) -> Self {
        Self {
            catalog: Arc::new(EventCatalog::new(Arc::clone(&store), audit.clone())),
            issuance: Arc::new(IssuanceEngine::new(Arc::clone(&store), audit.clone())),
            users: Arc::new(UserDirectory::new(Arc::clone(&store), audit.clone())),
            reports: Arc::new(ReportService::new(store)),
            audit,
        }
    }
}
