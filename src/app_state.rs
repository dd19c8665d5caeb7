use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    notify::NotifyClient, payments::PaymentClient, reports::ReportClient, storage::StorageClient,
};

/// Shared application state passed to route handlers and job handlers.
/// Everything flows through here explicitly; there are no ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<StorageClient>,
    pub payments: Arc<PaymentClient>,
    pub notify: Arc<NotifyClient>,
    pub reports: Arc<ReportClient>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: AppConfig,
        storage: StorageClient,
        payments: PaymentClient,
        notify: NotifyClient,
        reports: ReportClient,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            storage: Arc::new(storage),
            payments: Arc::new(payments),
            notify: Arc::new(notify),
            reports: Arc::new(reports),
        }
    }
}
