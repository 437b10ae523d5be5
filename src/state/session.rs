use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::data::{normalize_tags, ItemDetails, ItemMeta, LiveItem, Tag, WallpaperType};
use super::library::{DocumentStore, LibraryDocument};
use super::tree::{normalize_vpath, FolderNode};
use crate::config::Settings;
use crate::error::{LibraryError, Result};
use crate::scan::descriptor::read_descriptor;

/// The parts of the settings a session needs, captured when it opens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    pub vfs_disabled: bool,
    pub placeholder_preview: PathBuf,
    pub preset_tags: Vec<Tag>,
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            vfs_disabled: settings.vfs_disabled,
            placeholder_preview: settings.placeholder_preview.clone(),
            preset_tags: settings.preset_tags_flat(),
        }
    }
}

/// Something to relocate in the virtual tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveSource {
    /// A virtual folder, addressed by its path
    Folder(String),
    /// An item, addressed by id
    Item(String),
}

impl MoveSource {
    /// Strings starting with `./` are folder paths, anything else is an id
    pub fn parse(value: &str) -> Self {
        if value.starts_with("./") {
            MoveSource::Folder(value.to_string())
        } else {
            MoveSource::Item(value.to_string())
        }
    }
}

/// Outcome of a physical delete
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Everything known about one open library: the catalog, the live item
/// cache built by the last scan, and the options it was opened with.
///
/// A session is owned by exactly one writer. Opening another library means
/// building a new session, never patching this one.
pub struct Session {
    pub(crate) root: PathBuf,
    pub(crate) store: DocumentStore,
    pub(crate) doc: LibraryDocument,
    pub(crate) cache: HashMap<String, LiveItem>,
    pub(crate) options: SessionOptions,
}

impl Session {
    /// Open the library at `root` and load its catalog. The live cache stays
    /// empty until the first reconcile.
    pub async fn open(root: impl Into<PathBuf>, options: SessionOptions) -> Result<Self> {
        let root = root.into();
        let store = DocumentStore::for_library(&root);
        let doc = store.load().await?;
        info!("Opened library {}", root.display());

        Ok(Self {
            root,
            store,
            doc,
            cache: HashMap::new(),
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn document(&self) -> &LibraryDocument {
        &self.doc
    }

    pub fn tree(&self) -> &FolderNode {
        &self.doc.vfs_tree
    }

    pub fn metadata(&self, id: &str) -> Option<&ItemMeta> {
        self.doc.wallpapers_meta.get(id)
    }

    pub fn live_item(&self, id: &str) -> Option<&LiveItem> {
        self.cache.get(id)
    }

    pub fn live_items(&self) -> impl Iterator<Item = &LiveItem> {
        self.cache.values()
    }

    /// Physical folder of an item
    pub fn item_folder(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(LibraryError::UnknownItem(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    /// Re-aggregate folder sizes from the live cache
    pub(crate) fn refresh_sizes(&mut self) -> bool {
        let cache = &self.cache;
        self.doc
            .vfs_tree
            .refresh_sizes(&|id: &str| cache.get(id).map(|item| item.size))
    }

    pub(crate) async fn persist(&self) -> Result<()> {
        self.store.save(&self.doc).await
    }

    /// Create a virtual folder and return its path
    pub async fn create_folder(&mut self, name: &str, parent_vpath: &str) -> Result<String> {
        let vpath = self.doc.vfs_tree.create_folder(parent_vpath, name)?;
        self.refresh_sizes();
        self.persist().await?;
        info!("Created virtual folder {}", vpath);
        Ok(vpath)
    }

    /// Delete an empty virtual folder
    pub async fn delete_folder(&mut self, vpath: &str) -> Result<()> {
        self.doc.vfs_tree.delete_folder(vpath)?;
        self.refresh_sizes();
        self.persist().await?;
        info!("Deleted virtual folder {}", normalize_vpath(vpath));
        Ok(())
    }

    /// Move folders and items into `target_vpath`.
    ///
    /// The whole batch is applied to a copy of the catalog and only swapped in
    /// when every source succeeded, so a refused move changes nothing.
    pub async fn move_items(&mut self, sources: &[MoveSource], target_vpath: &str) -> Result<usize> {
        if self.doc.vfs_tree.resolve(target_vpath).is_none() {
            return Err(LibraryError::TargetNotFound(normalize_vpath(target_vpath)));
        }

        let mut draft = self.doc.clone();
        let mut resolved_kinds: Vec<(String, WallpaperType)> = Vec::new();
        let mut moved = 0;

        for source in sources {
            match source {
                MoveSource::Folder(vpath) => {
                    draft.vfs_tree.move_folder(vpath, target_vpath)?;
                }
                MoveSource::Item(id) => {
                    let kind = match draft.wallpapers_meta.get(id).and_then(|m| m.kind) {
                        Some(kind) => kind,
                        None => self.derive_kind(id).await?,
                    };

                    draft.vfs_tree.remove_item(id);
                    let target = draft
                        .vfs_tree
                        .resolve_mut(target_vpath)
                        .ok_or_else(|| LibraryError::TargetNotFound(normalize_vpath(target_vpath)))?;
                    target.push_item(id.clone(), kind);
                    draft.wallpapers_meta.entry(id.clone()).or_default().kind = Some(kind);
                    resolved_kinds.push((id.clone(), kind));
                }
            }
            moved += 1;
        }

        self.doc = draft;
        for (id, kind) in resolved_kinds {
            if let Some(item) = self.cache.get_mut(&id) {
                item.kind = kind;
            }
        }
        self.refresh_sizes();
        self.persist().await?;
        info!("Moved {} entries to {}", moved, normalize_vpath(target_vpath));
        Ok(moved)
    }

    /// Type for an item that has no metadata type yet: the live cache, then
    /// the descriptor on disk, else unknown. Ids that match nothing at all are
    /// refused.
    async fn derive_kind(&self, id: &str) -> Result<WallpaperType> {
        if let Some(item) = self.cache.get(id) {
            return Ok(item.kind);
        }
        let folder = self.item_folder(id)?;
        if !self.doc.wallpapers_meta.contains_key(id) && !tokio::fs::try_exists(&folder).await? {
            return Err(LibraryError::UnknownItem(id.to_string()));
        }
        match read_descriptor(&folder).await {
            Ok(descriptor) => Ok(descriptor.wallpaper_type()),
            Err(e) => {
                warn!("Could not derive type for {}: {}", id, e);
                Ok(WallpaperType::Unknown)
            }
        }
    }

    /// Store rating, tags, notes and description for an item
    pub async fn save_item_details(&mut self, id: &str, details: ItemDetails) -> Result<()> {
        self.item_folder(id)?;
        let tags = normalize_tags(details.tags, &self.options.preset_tags);

        let meta = self.doc.wallpapers_meta.entry(id.to_string()).or_default();
        meta.rating = Some(details.rating);
        meta.tags = tags.clone();
        meta.notes = details.notes.clone();
        meta.description = Some(details.description.clone());

        if let Some(item) = self.cache.get_mut(id) {
            item.rating = details.rating;
            item.tags = tags;
            item.notes = details.notes;
            item.description = details.description;
        }

        self.persist().await
    }

    /// Record the executable of an application item and its corrected type.
    /// Every leaf gets the new type; an item with no leaf is placed at the
    /// root.
    pub async fn save_app_path(&mut self, id: &str, relative_exe: &str, kind: WallpaperType) -> Result<()> {
        self.item_folder(id)?;

        let meta = self.doc.wallpapers_meta.entry(id.to_string()).or_default();
        meta.app_path = Some(relative_exe.to_string());
        meta.kind = Some(kind);

        if !self.doc.vfs_tree.set_item_kind(id, kind) {
            self.doc.vfs_tree.push_item(id, kind);
        }
        if let Some(item) = self.cache.get_mut(id) {
            item.app_path = Some(relative_exe.to_string());
            item.kind = kind;
        }

        self.refresh_sizes();
        self.persist().await
    }

    /// Drop items from the catalog, the tree and the live cache. Used after
    /// their folders were removed from disk.
    pub async fn forget_items(&mut self, ids: &[String]) -> Result<usize> {
        let mut forgotten = 0;
        for id in ids {
            let had_meta = self.doc.wallpapers_meta.remove(id).is_some();
            let had_refs = self.doc.vfs_tree.remove_item(id) > 0;
            let had_cache = self.cache.remove(id).is_some();
            if had_meta || had_refs || had_cache {
                forgotten += 1;
            }
        }
        self.refresh_sizes();
        self.persist().await?;
        Ok(forgotten)
    }

    /// Remove item folders from disk, then forget the ones that went away
    pub async fn delete_items(&mut self, ids: &[String]) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for id in ids {
            let result = match self.item_folder(id) {
                Ok(folder) => tokio::fs::remove_dir_all(&folder).await.map_err(LibraryError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.deleted.push(id.clone()),
                Err(e) => {
                    warn!("Failed to delete item {}: {}", id, e);
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        if !report.deleted.is_empty() {
            self.forget_items(&report.deleted).await?;
        }
        Ok(report)
    }

    /// Reset the catalog to empty and write it. The caller rescans.
    /// Nothing is dropped from memory unless the empty catalog was written.
    pub async fn clear(&mut self) -> Result<()> {
        let empty = LibraryDocument::new();
        self.store.save(&empty).await?;
        self.doc = empty;
        self.cache.clear();
        warn!("Catalog of {} cleared", self.root.display());
        Ok(())
    }

    /// Every distinct tag in the catalog, first occurrence wins
    pub fn all_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::new();
        for meta in self.doc.wallpapers_meta.values() {
            for tag in &meta.tags {
                if !tags.iter().any(|t| t.name == tag.name) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }
}
