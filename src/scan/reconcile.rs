/// Reconciliation of the library folder against the catalog
///
/// One pass runs these steps strictly in order, each one relying on the
/// corrected state left by the previous:
/// 1. list the item folders (a failure here aborts the pass untouched)
/// 2. drop catalog entries and tree leaves whose folder is gone
/// 3. refresh known items and discover new ones, rebuilding the live cache
/// 4. place every unplaced item at the tree root
/// 5. re-aggregate folder sizes
/// 6. write the catalog, only if something changed
use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::allocator::allocate;
use super::descriptor::read_descriptor;
use super::walk::{directory_size, folder_stats, list_item_folders, FolderStats};
use crate::config::is_numeric_id;
use crate::error::Result;
use crate::state::data::{file_url, ItemMeta, LiveItem, WallpaperType};
use crate::state::session::Session;

/// A folder left out of this pass, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFolder {
    pub folder: String,
    pub reason: String,
}

/// What a reconcile pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    /// Items in the live cache after the pass
    pub items: usize,
    pub discovered: Vec<String>,
    pub removed: Vec<String>,
    pub resized: Vec<String>,
    pub archived: Vec<String>,
    /// Non-numeric folders renamed to their allocated id, as (from, to)
    pub renamed: Vec<(String, String)>,
    pub skipped: Vec<SkippedFolder>,
    pub persisted: bool,
}

impl Session {
    /// Run one reconcile pass. Safe to repeat; a pass over an unchanged
    /// library writes nothing.
    pub async fn reconcile(&mut self) -> Result<ScanReport> {
        let folders = list_item_folders(&self.root).await?;
        let physical: HashSet<String> = folders.iter().cloned().collect();
        let mut report = ScanReport::default();
        let mut changed = false;

        changed |= self.remove_orphans(&physical, &mut report);

        let mut taken: HashSet<String> = self.doc.wallpapers_meta.keys().cloned().collect();
        taken.extend(physical.iter().cloned());

        let mut cache = HashMap::with_capacity(folders.len());
        for name in folders {
            match self.scan_folder(&name, &mut taken, &mut report).await {
                Ok(Some((item, item_changed))) => {
                    changed |= item_changed;
                    cache.insert(item.id.clone(), item);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not process folder {}, skipping it: {}", name, e);
                    report.skipped.push(SkippedFolder {
                        folder: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let placed = self.doc.vfs_tree.item_ids();
        let mut unplaced: Vec<&LiveItem> = cache.values().filter(|item| !placed.contains(&item.id)).collect();
        unplaced.sort_by(|a, b| a.id.cmp(&b.id));
        for item in unplaced {
            debug!("Auto-archiving {} to the root", item.id);
            self.doc.vfs_tree.push_item(item.id.clone(), item.kind);
            report.archived.push(item.id.clone());
            changed = true;
        }

        self.cache = cache;
        changed |= self.refresh_sizes();
        report.items = self.cache.len();

        if changed {
            self.persist().await?;
            report.persisted = true;
        }

        info!(
            "Library scan finished: {} items, {} new, {} removed, {} skipped",
            report.items,
            report.discovered.len(),
            report.removed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Cleanup pass: catalog entries without a folder, and leaves pointing at
    /// ids that have neither
    fn remove_orphans(&mut self, physical: &HashSet<String>, report: &mut ScanReport) -> bool {
        let mut changed = false;

        let orphans: Vec<String> = self
            .doc
            .wallpapers_meta
            .keys()
            .filter(|id| !physical.contains(*id))
            .cloned()
            .collect();
        for id in orphans {
            info!("Removing {} from the catalog, its folder is gone", id);
            self.doc.wallpapers_meta.remove(&id);
            self.doc.vfs_tree.remove_item(&id);
            report.removed.push(id);
            changed = true;
        }

        let mut dangling: Vec<String> = self
            .doc
            .vfs_tree
            .item_ids()
            .into_iter()
            .filter(|id| !physical.contains(id))
            .collect();
        dangling.sort();
        for id in dangling {
            debug!("Removing dangling tree reference {}", id);
            self.doc.vfs_tree.remove_item(&id);
            changed = true;
        }

        changed
    }

    /// Per-folder pass. Returns the live item and whether the catalog
    /// changed, or `None` when the folder was skipped and recorded.
    async fn scan_folder(
        &mut self,
        name: &str,
        taken: &mut HashSet<String>,
        report: &mut ScanReport,
    ) -> Result<Option<(LiveItem, bool)>> {
        let folder = self.root.join(name);
        let stats = folder_stats(&folder).await?;

        if let Some(meta) = self.doc.wallpapers_meta.get_mut(name) {
            let mut changed = false;
            let cached = meta.size.filter(|_| meta.mtime == Some(stats.mtime_ms));
            let size = match cached {
                Some(size) => size,
                None => {
                    let size = directory_size(folder.clone()).await?;
                    meta.mtime = Some(stats.mtime_ms);
                    meta.size = Some(size);
                    report.resized.push(name.to_string());
                    changed = true;
                    size
                }
            };
            let meta = meta.clone();
            let item = build_live_item(name, &folder, &meta, size, stats, &self.options.placeholder_preview).await;
            return Ok(Some((item, changed)));
        }

        // New folder: the descriptor is read once, here
        let descriptor = match read_descriptor(&folder).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("New folder {} needs a readable project.json, skipping: {}", name, e);
                report.skipped.push(SkippedFolder {
                    folder: name.to_string(),
                    reason: e.to_string(),
                });
                return Ok(None);
            }
        };

        // A numeric folder name is already the item's identity and wins over a
        // workshop id; only non-numeric folders are allocated and renamed.
        let (id, folder, stats) = if is_numeric_id(name) {
            (name.to_string(), folder, stats)
        } else {
            let id = allocate(&folder, Some(&descriptor), &*taken);
            let destination = self.root.join(&id);
            tokio::fs::rename(&folder, &destination).await?;
            info!("Renamed folder {} to its id {}", name, id);
            report.renamed.push((name.to_string(), id.clone()));
            let stats = folder_stats(&destination).await?;
            (id, destination, stats)
        };
        taken.insert(id.clone());

        let size = directory_size(folder.clone()).await?;
        let meta = ItemMeta {
            mtime: Some(stats.mtime_ms),
            size: Some(size),
            title: Some(descriptor.title_or_default()),
            kind: Some(descriptor.wallpaper_type()),
            rating: Some(descriptor.rating()),
            preview: descriptor.preview.clone(),
            tags: Vec::new(),
            notes: String::new(),
            description: Some(descriptor.description.clone().unwrap_or_default()),
            file: descriptor.file.clone(),
            app_path: None,
        };
        self.doc.wallpapers_meta.insert(id.clone(), meta.clone());
        report.discovered.push(id.clone());
        info!("Discovered new item {} ({})", id, meta.title_or_default());

        let item = build_live_item(&id, &folder, &meta, size, stats, &self.options.placeholder_preview).await;
        Ok(Some((item, true)))
    }
}

/// Build the live view of an item. A declared preview that is not on disk
/// (or no preview at all) is replaced by the placeholder and flagged.
pub(crate) async fn build_live_item(
    id: &str,
    folder: &Path,
    meta: &ItemMeta,
    size: u64,
    stats: FolderStats,
    placeholder: &Path,
) -> LiveItem {
    let declared = meta.preview.as_deref().filter(|p| !p.is_empty()).map(|p| folder.join(p));
    let preview = match declared {
        Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => Some(path),
        _ => None,
    };
    let preview_missing = preview.is_none();
    if preview_missing {
        debug!("Preview missing for {}, using placeholder", id);
    }

    let kind = meta.kind_or_default();
    let video = match (&meta.file, kind) {
        (Some(file), WallpaperType::Video) => Some(file.map(|f| file_url(&folder.join(f)))),
        _ => None,
    };

    LiveItem {
        id: id.to_string(),
        title: meta.title_or_default().to_string(),
        kind,
        rating: meta.rating.unwrap_or_default(),
        preview: file_url(preview.as_deref().unwrap_or(placeholder)),
        preview_missing,
        folder_path: folder.to_path_buf(),
        app_path: meta.app_path.clone(),
        date_added: stats.created_ms,
        size,
        tags: meta.tags.clone(),
        notes: meta.notes.clone(),
        description: meta.description.clone().unwrap_or_default(),
        video,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use crate::state::data::VideoFile;
    use crate::state::session::{MoveSource, SessionOptions};
    use std::path::PathBuf;

    fn write_item(root: &Path, folder: &str, descriptor: &str, files: &[(&str, usize)]) -> PathBuf {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("project.json"), descriptor).unwrap();
        for (name, len) in files {
            std::fs::write(dir.join(name), vec![0u8; *len]).unwrap();
        }
        dir
    }

    async fn open(root: &Path) -> Session {
        let options = SessionOptions {
            placeholder_preview: PathBuf::from("/assets/missing.webp"),
            ..Default::default()
        };
        Session::open(root, options).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_scan_discovers_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        write_item(
            dir.path(),
            "100",
            r#"{"title": "Forest", "type": "Scene", "preview": "preview.jpg"}"#,
            &[("preview.jpg", 10), ("scene.pkg", 90)],
        );
        write_item(dir.path(), "200", r#"{"title": "Clip", "type": "video", "file": "a.mp4"}"#, &[("a.mp4", 5)]);

        let mut session = open(dir.path()).await;
        let report = session.reconcile().await.unwrap();

        assert_eq!(report.items, 2);
        assert_eq!(report.discovered, vec!["100".to_string(), "200".to_string()]);
        assert_eq!(report.archived, vec!["100".to_string(), "200".to_string()]);
        assert!(report.persisted);

        let forest = session.live_item("100").unwrap();
        assert_eq!(forest.kind, WallpaperType::Scene);
        assert!(!forest.preview_missing);
        assert!(forest.preview.ends_with("/100/preview.jpg"));

        let clip = session.live_item("200").unwrap();
        assert!(clip.preview_missing);
        assert_eq!(clip.preview, "file:///assets/missing.webp");
        assert!(matches!(&clip.video, Some(VideoFile::Single(url)) if url.ends_with("/200/a.mp4")));

        let meta = session.metadata("100").unwrap();
        let descriptor_len = std::fs::metadata(dir.path().join("100/project.json")).unwrap().len();
        assert_eq!(meta.size, Some(100 + descriptor_len));
        assert!(meta.tags.is_empty());
        assert_eq!(session.tree().size, forest.size + clip.size);
    }

    #[tokio::test]
    async fn test_second_scan_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "1", r#"{"title": "A", "type": "web"}"#, &[("index.html", 3)]);
        write_item(dir.path(), "2", r#"{"title": "B", "type": "scene"}"#, &[]);

        let mut session = open(dir.path()).await;
        session.reconcile().await.unwrap();
        let catalog = std::fs::read_to_string(dir.path().join("wallpapers_db.json")).unwrap();
        let first = session.list_children_at("./", 1);

        let report = session.reconcile().await.unwrap();
        assert!(!report.persisted);
        assert!(report.discovered.is_empty() && report.resized.is_empty() && report.archived.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("wallpapers_db.json")).unwrap(),
            catalog
        );
        assert_eq!(session.list_children_at("./", 1), first);
    }

    #[tokio::test]
    async fn test_orphan_cleanup_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "1", r#"{"title": "A"}"#, &[]);
        write_item(dir.path(), "2", r#"{"title": "B"}"#, &[]);

        let mut session = open(dir.path()).await;
        session.reconcile().await.unwrap();
        session.create_folder("keep", "./").await.unwrap();
        session
            .move_items(&[MoveSource::Item("1".into())], "./keep/")
            .await
            .unwrap();

        std::fs::remove_dir_all(dir.path().join("1")).unwrap();
        let report = session.reconcile().await.unwrap();

        assert_eq!(report.removed, vec!["1".to_string()]);
        assert!(session.metadata("1").is_none());
        assert_eq!(session.tree().count_item_refs("1"), 0);
        assert!(session.metadata("2").is_some());
        assert_eq!(session.tree().count_item_refs("2"), 1);
        assert!(session.tree().resolve("./keep/").is_some());
    }

    #[tokio::test]
    async fn test_unreadable_descriptor_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "1", "{ not json", &[]);
        std::fs::create_dir(dir.path().join("2")).unwrap();
        write_item(dir.path(), "3", r#"{"title": "ok"}"#, &[]);

        let mut session = open(dir.path()).await;
        let report = session.reconcile().await.unwrap();

        assert_eq!(report.items, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(session.metadata("1").is_none());
        assert!(session.live_item("3").is_some());

        // fixed descriptor is picked up on the next pass
        std::fs::write(dir.path().join("1/project.json"), r#"{"title": "fixed"}"#).unwrap();
        let report = session.reconcile().await.unwrap();
        assert_eq!(report.discovered, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_unreadable_root_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lib");
        write_item(&root, "1", r#"{"title": "A"}"#, &[]);

        let mut session = open(&root).await;
        session.reconcile().await.unwrap();
        let before = session.document().clone();

        std::fs::remove_dir_all(&root).unwrap();
        let err = session.reconcile().await.unwrap_err();
        assert!(matches!(err, LibraryError::LibraryUnreadable { .. }));
        assert_eq!(session.document(), &before);
        assert!(session.live_item("1").is_some());
    }

    #[tokio::test]
    async fn test_modified_folder_is_resized() {
        let dir = tempfile::tempdir().unwrap();
        let item = write_item(dir.path(), "1", r#"{"title": "A"}"#, &[("a.bin", 10)]);

        let mut session = open(dir.path()).await;
        session.reconcile().await.unwrap();

        // force a stale mtime so the next pass must walk the folder again
        session.doc.wallpapers_meta.get_mut("1").unwrap().mtime = Some(0);
        std::fs::write(item.join("a.bin"), vec![0u8; 500]).unwrap();

        let report = session.reconcile().await.unwrap();
        assert_eq!(report.resized, vec!["1".to_string()]);
        assert!(report.persisted);
        assert!(session.metadata("1").unwrap().size.unwrap() >= 500);
    }

    #[tokio::test]
    async fn test_non_numeric_folder_gets_an_id() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "My Wallpaper", r#"{"title": "Mine", "workshopid": "31337"}"#, &[]);
        write_item(dir.path(), "Other", r#"{"title": "Other"}"#, &[]);

        let mut session = open(dir.path()).await;
        let report = session.reconcile().await.unwrap();

        assert!(dir.path().join("31337").is_dir());
        assert!(dir.path().join("0000000001").is_dir());
        assert!(!dir.path().join("My Wallpaper").exists());
        assert_eq!(report.renamed.len(), 2);
        assert_eq!(session.metadata("31337").unwrap().title.as_deref(), Some("Mine"));

        // and the renamed folders are stable on the next pass
        let report = session.reconcile().await.unwrap();
        assert!(report.removed.is_empty() && report.discovered.is_empty());
    }

    #[tokio::test]
    async fn test_numeric_folder_name_beats_workshop_id() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "500", r#"{"title": "Local", "workshopid": "31337"}"#, &[]);

        let mut session = open(dir.path()).await;
        let report = session.reconcile().await.unwrap();

        assert_eq!(report.discovered, vec!["500".to_string()]);
        assert!(report.renamed.is_empty());
        assert!(dir.path().join("500").is_dir());
        assert!(!dir.path().join("31337").exists());
        assert!(session.metadata("31337").is_none());
    }

    #[tokio::test]
    async fn test_dangling_tree_refs_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write_item(dir.path(), "1", r#"{"title": "A"}"#, &[]);

        let mut session = open(dir.path()).await;
        session.doc.vfs_tree.push_item("ghost", WallpaperType::Scene);
        session.reconcile().await.unwrap();

        assert_eq!(session.tree().count_item_refs("ghost"), 0);
        assert_eq!(session.tree().count_item_refs("1"), 1);
    }
}
