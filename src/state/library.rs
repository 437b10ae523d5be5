use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::data::ItemMeta;
use super::tree::FolderNode;
use crate::error::{LibraryError, Result};

/// File name of the catalog inside a library root
pub const CATALOG_FILE: &str = "wallpapers_db.json";

/// The whole persisted catalog: the virtual tree plus per-item metadata.
/// It is always written wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    #[serde(default)]
    pub vfs_tree: FolderNode,
    #[serde(default)]
    pub wallpapers_meta: BTreeMap<String, ItemMeta>,
}

impl LibraryDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The DocumentStore owns the catalog file of one library root.
/// It reads the document once when a session opens and writes it back with
/// write-temp-then-rename so a crash never leaves a truncated catalog.
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    /// Store for the catalog living directly inside `library_root`
    pub fn for_library(library_root: &Path) -> Self {
        Self::new(library_root.join(CATALOG_FILE))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the path to the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Load the catalog.
    ///
    /// A missing or blank file yields an empty document. A file that does not
    /// parse is renamed aside (`<name>.corrupt-<timestamp>`) before starting
    /// empty, so the next write cannot destroy what was there.
    pub async fn load(&self) -> Result<LibraryDocument> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No catalog at {}, starting empty", self.path.display());
                return Ok(LibraryDocument::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(LibraryDocument::new());
        }

        match serde_json::from_str::<LibraryDocument>(&content) {
            Ok(doc) => {
                info!(
                    "Catalog loaded from {} ({} items)",
                    self.path.display(),
                    doc.wallpapers_meta.len()
                );
                Ok(doc)
            }
            Err(e) => {
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                let mut aside = self.path.as_os_str().to_owned();
                aside.push(format!(".corrupt-{stamp}"));
                let aside = PathBuf::from(aside);
                error!(
                    "Catalog {} does not parse ({}), moving it to {} and starting empty",
                    self.path.display(),
                    e,
                    aside.display()
                );
                tokio::fs::rename(&self.path, &aside).await?;
                Ok(LibraryDocument::new())
            }
        }
    }

    /// Write the catalog atomically
    pub async fn save(&self, doc: &LibraryDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let temp = self.temp_path();
        let persistence = |source| LibraryError::PersistenceFailure {
            path: self.path.clone(),
            source,
        };

        if let Err(e) = tokio::fs::write(&temp, json.as_bytes()).await {
            error!("Failed to write catalog {}: {}", temp.display(), e);
            return Err(persistence(e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            error!("Failed to replace catalog {}: {}", self.path.display(), e);
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(persistence(e));
        }

        debug!("Catalog written to {}", self.path.display());
        Ok(())
    }

    /// Create an empty catalog file if none exists yet
    pub async fn ensure_exists(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        warn!("Creating empty catalog at {}", self.path.display());
        self.save(&LibraryDocument::new()).await
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .finish()
    }
}
