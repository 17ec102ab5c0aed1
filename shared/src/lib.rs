pub mod auth;
pub mod blogs;
pub mod catalog;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod ingestion;
pub mod local_storage;
pub mod media;
pub mod progress;
pub mod resources;
pub mod session;
pub mod store;
pub mod types;
pub mod users;
pub mod watch_later;
pub mod youtube;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use auth::IdentityProvider;
use config::Config;
use ingestion::VideoPlatform;
use media::MediaHost;
use std::sync::Arc;
use store::Store;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub media: Arc<dyn MediaHost>,
    pub videos: Arc<dyn VideoPlatform>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        media: Arc<dyn MediaHost>,
        videos: Arc<dyn VideoPlatform>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            identity,
            media,
            videos,
        })
    }
}
