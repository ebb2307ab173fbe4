//! Application state management.

use anyhow::{bail, Context};
use quarry_core::{
    Config, DataManager, FileSnapshotStore, FsDocumentSource, JiebaSegmenter, Segmenter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Arc<Config>,

    /// Vault root directory
    pub vault: PathBuf,

    /// Vault reader
    pub source: Arc<FsDocumentSource>,

    /// Snapshot persistence
    pub store: Arc<FileSnapshotStore>,

    /// Search pipeline
    pub manager: DataManager,
}

impl App {
    /// Create a new application instance. The index is not loaded yet.
    pub fn new(config: Config, vault: Option<PathBuf>) -> anyhow::Result<Self> {
        let vault = resolve_vault(vault, &config)?;
        let data_dir = config.data_dir()?;
        let config = Arc::new(config);

        let source = Arc::new(FsDocumentSource::new(&vault, Arc::clone(&config)));
        let store = Arc::new(FileSnapshotStore::new(&data_dir));

        let segmenter: Option<Arc<dyn Segmenter>> = if config.index.cjk_patch {
            let jieba = JiebaSegmenter::new();
            jieba.init()?;
            Some(Arc::new(jieba))
        } else {
            None
        };

        let manager = DataManager::new(
            Arc::clone(&config),
            source.clone(),
            store.clone(),
            segmenter,
        );

        info!(
            vault = %vault.display(),
            data_dir = %data_dir.display(),
            "Application initialized"
        );

        Ok(App {
            config,
            vault,
            source,
            store,
            manager,
        })
    }

    /// Load the index from the snapshot, or build it from the vault.
    pub fn open(&self) -> anyhow::Result<usize> {
        Ok(self.manager.initialize()?)
    }
}

/// Pick the vault from the command line, then config, then the working directory.
fn resolve_vault(arg: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    let vault = match arg.or_else(|| config.general.vault_path.clone()) {
        Some(path) => path,
        None => std::env::current_dir().context("resolving the working directory")?,
    };

    if !vault.is_dir() {
        bail!("Vault directory not found: {}", vault.display());
    }
    Ok(vault)
}
