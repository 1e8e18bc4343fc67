use std::sync::Arc;

use crate::{
    access::ClaimantVerifier, auth::TokenVerifier, config::AppConfig, storage::ObjectStorage,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub claimants: Arc<dyn ClaimantVerifier>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        verifier: Arc<dyn TokenVerifier>,
        claimants: Arc<dyn ClaimantVerifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            storage,
            verifier,
            claimants,
        }
    }
}
