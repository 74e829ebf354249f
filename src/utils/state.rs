use std::sync::Arc;

use crate::config::Config;
use crate::storage::{Storage, driver::filesystem::FilesystemStorage};
use crate::uploads::UploadManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub uploads: UploadManager,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(FilesystemStorage::new(&config.root_dir));
        AppState {
            config: Arc::new(config),
            uploads: UploadManager::new(storage.clone()),
            storage,
        }
    }
}
