use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::announcements::{AnnouncementError, AnnouncementPool};
use super::catalog::{CatalogError, QuestionCatalog};
use super::directory::{DirectoryError, GroupDirectory};

/// File locations for the static intake configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub questions: PathBuf,
    pub directory: PathBuf,
    pub announcements: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Announcements(#[from] AnnouncementError),
    #[error("group directory {path} lists no recruiting groups")]
    NothingRecruiting { path: PathBuf },
}

/// Loaded static configuration the bot runs on.
#[derive(Debug, Clone)]
pub struct IntakeAssets {
    pub catalog: Arc<QuestionCatalog>,
    pub directory: Arc<GroupDirectory>,
    pub announcements: Arc<AnnouncementPool>,
}

impl IntakeAssets {
    /// Loads and validates every file; any failure aborts startup.
    pub fn load(paths: &AssetPaths) -> Result<Self, AssetError> {
        let catalog = QuestionCatalog::load(&paths.questions)?;
        let directory = GroupDirectory::load(&paths.directory)?;
        ensure_recruiting(&directory, &paths.directory)?;
        let announcements = AnnouncementPool::load(&paths.announcements)?;

        info!(
            questions = catalog.len(),
            groups = directory.entries().len(),
            announcement_bodies = announcements.bodies().len(),
            "intake configuration loaded"
        );

        Ok(Self::new(catalog, directory, announcements))
    }

    pub fn new(
        catalog: QuestionCatalog,
        directory: GroupDirectory,
        announcements: AnnouncementPool,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            directory: Arc::new(directory),
            announcements: Arc::new(announcements),
        }
    }
}

fn ensure_recruiting(directory: &GroupDirectory, path: &Path) -> Result<(), AssetError> {
    if directory.recruiting().next().is_none() {
        return Err(AssetError::NothingRecruiting {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
