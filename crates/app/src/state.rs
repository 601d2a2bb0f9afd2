//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::AppConfig;
use crate::db::AccountStore;
use crate::services::{AttributionService, LifecycleService};
use crate::shopify::CommercePlatform;

/// Application state shared across all handlers.
///
/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    store: Arc<dyn AccountStore>,
    lifecycle: LifecycleService,
    attribution: AttributionService,
}

impl AppState {
    /// Wire the services over a store and a commerce platform.
    #[must_use]
    pub fn new(
        config: AppConfig,
        store: Arc<dyn AccountStore>,
        platform: Arc<dyn CommercePlatform>,
    ) -> Self {
        let lifecycle = LifecycleService::new(Arc::clone(&store), Arc::clone(&platform), &config);
        let attribution = AttributionService::new(Arc::clone(&store), platform);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                lifecycle,
                attribution,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AccountStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleService {
        &self.inner.lifecycle
    }

    #[must_use]
    pub fn attribution(&self) -> &AttributionService {
        &self.inner.attribution
    }

    /// Shared secret for OAuth and webhook signatures.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        self.inner.config.shopify.api_secret.expose_secret()
    }
}
