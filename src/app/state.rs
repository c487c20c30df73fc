//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::session::SessionDirectory;
use crate::store::catalog::CatalogError;
use crate::store::{CatalogStore, GameStore};
use crate::ws::hub::BroadcastHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<CatalogStore>,
    pub games: Arc<GameStore>,
    pub directory: Arc<SessionDirectory>,
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    /// Wire up the catalog, game store, session directory, and broadcast
    /// hub. A configured catalog file that fails to load aborts startup;
    /// an unset CATALOG_PATH just means an empty catalog.
    pub fn new(config: Config) -> Result<Self, CatalogError> {
        let config = Arc::new(config);

        let catalog = Arc::new(CatalogStore::new());
        match &config.catalog_path {
            Some(path) => {
                let (categories, prompts) = catalog.load_file(path)?;
                info!(path = %path, categories, prompts, "Catalog loaded");
            }
            None => {
                warn!("CATALOG_PATH not set, starting with an empty catalog");
            }
        }

        let games = Arc::new(GameStore::new());
        let directory = Arc::new(SessionDirectory::new(games.clone(), catalog.clone()));
        let hub = Arc::new(BroadcastHub::new());

        Ok(Self {
            config,
            catalog,
            games,
            directory,
            hub,
        })
    }
}
