use std::sync::Arc;

use crate::backend::Backend;
use crate::cache::MeasurementCache;
use crate::chart::GapPolicy;
use crate::config::Settings;
use crate::entry::EntryController;
use crate::errors::ServiceResult;
use crate::security::Authenticator;
use crate::sites::SiteRegistry;
use crate::web::graphql_schema::{create_schema, Schema};

pub mod backend;
pub mod cache;
pub mod chart;
pub mod config;
pub mod entry;
pub mod errors;
pub mod models;
pub mod schema;
pub mod security;
pub mod sites;
pub mod web;

#[derive(Clone)]
pub struct AppData {
    pub backend: Arc<dyn Backend>,
    pub graphql_schema: Arc<Schema>,
    pub auth: Authenticator,
    pub registry: SiteRegistry,
    pub entries: EntryController,
    pub gap_policy: GapPolicy,
}

impl AppData {
    pub fn new(settings: &Settings, backend: Arc<dyn Backend>) -> Self {
        let registry = SiteRegistry::new(backend.clone());
        let entries = EntryController::new(backend.clone(), registry.clone(), MeasurementCache::new());

        let zero_gaps = settings.gap_policy.zero_gap_metrics();
        if !zero_gaps.is_empty() {
            let names: Vec<&str> = zero_gaps.iter().map(|x| x.key()).collect();
            log::warn!("Exact zero readings are drawn as gaps for: {}", names.join(", "));
        }

        AppData {
            graphql_schema: Arc::new(create_schema()),
            auth: Authenticator::new(backend.clone(), settings.bootstrap_admin.clone(), settings.password_hash_cost),
            registry,
            entries,
            gap_policy: settings.gap_policy.clone(),
            backend,
        }
    }

    pub fn setup_bootstrap_admin(&self, password: &str, replace: bool) -> ServiceResult<()> {
        match self.auth.bootstrap_admin() {
            Some(email) => {
                let email = email.to_string();
                self.auth.setup_account(&email, password, replace)
            }
            None => {
                log::warn!("BOOTSTRAP_ADMIN_PASSWORD is set without BOOTSTRAP_ADMIN_EMAIL, ignoring it");
                Ok(())
            }
        }
    }
}
