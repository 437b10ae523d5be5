/// Importing an outside folder into the library
///
/// Import is two steps so a caller can show the findings and let the user
/// edit them: `scan_import_folder` only reads, `process_import` moves the
/// folder in and records it.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LibraryError, Result};
use crate::scan::allocator::allocate;
use crate::scan::descriptor::{read_descriptor, ProjectDescriptor, TypeCounts};
use crate::scan::reconcile::build_live_item;
use crate::scan::walk::{directory_size, folder_stats, list_item_folders, move_folder, survey_folder};
use crate::state::data::{normalize_tags, ItemMeta, Rating, TagInput, VideoFile, WallpaperType};
use crate::state::session::Session;

/// Findings about a folder proposed for import
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportScan {
    pub source: PathBuf,
    /// Id the item would get if imported now
    pub id: String,
    pub size: u64,
    pub mtime: i64,
    pub file_count: usize,
    pub type_counts: TypeCounts,
    /// Type from the descriptor, else guessed from the file extensions
    pub inferred_type: WallpaperType,
    pub project_data: Option<ProjectDescriptor>,
}

/// Metadata confirmed by the user for an import
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMetadata {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: WallpaperType,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagInput>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file: Option<VideoFile>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl From<&ImportScan> for ImportMetadata {
    fn from(scan: &ImportScan) -> Self {
        let descriptor = scan.project_data.clone().unwrap_or_default();
        let title = descriptor.title.clone().unwrap_or_else(|| {
            scan.source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "Untitled".to_string())
        });
        Self {
            id: scan.id.clone(),
            title,
            kind: scan.inferred_type,
            rating: descriptor.rating(),
            preview: descriptor.preview,
            tags: Vec::new(),
            notes: String::new(),
            description: descriptor.description.unwrap_or_default(),
            file: descriptor.file,
            size: Some(scan.size),
        }
    }
}

/// Whether `path` is the library root or somewhere below it
async fn is_inside(path: &Path, root: &Path) -> bool {
    let path = tokio::fs::canonicalize(path).await.unwrap_or_else(|_| path.to_path_buf());
    let root = tokio::fs::canonicalize(root).await.unwrap_or_else(|_| root.to_path_buf());
    path.starts_with(&root)
}

impl Session {
    /// Inspect a folder for import without touching it
    pub async fn scan_import_folder(&self, source: &Path) -> Result<ImportScan> {
        if is_inside(source, &self.root).await {
            return Err(LibraryError::ImportSourceInsideLibrary(source.to_path_buf()));
        }

        let mut descriptor = match read_descriptor(source).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                info!("No usable descriptor in {}: {}", source.display(), e);
                None
            }
        };
        if let Some(d) = descriptor.as_mut() {
            if let Some(preview) = d.preview.as_deref() {
                if !tokio::fs::try_exists(source.join(preview)).await.unwrap_or(false) {
                    warn!("Preview {} not found in {}, ignoring it", preview, source.display());
                    d.preview = None;
                }
            }
        }

        let survey = survey_folder(source.to_path_buf()).await?;
        let stats = folder_stats(source).await?;

        let mut existing: HashSet<String> = self.doc.wallpapers_meta.keys().cloned().collect();
        existing.extend(list_item_folders(&self.root).await?);
        let id = allocate(source, descriptor.as_ref(), &existing);

        let inferred_type = match descriptor.as_ref().and_then(|d| d.kind.as_deref()) {
            Some(kind) => WallpaperType::parse(kind),
            None => survey.type_counts.infer_type(),
        };

        Ok(ImportScan {
            source: source.to_path_buf(),
            id,
            size: survey.size,
            mtime: stats.mtime_ms,
            file_count: survey.file_count,
            type_counts: survey.type_counts,
            inferred_type,
            project_data: descriptor,
        })
    }

    /// Move `source` into the library under `metadata.id` and record it.
    /// The new item is placed at the root unless already placed.
    pub async fn process_import(&mut self, source: &Path, metadata: ImportMetadata) -> Result<String> {
        let id = metadata.id.clone();
        let destination = self.item_folder(&id)?;
        if tokio::fs::try_exists(&destination).await? {
            return Err(LibraryError::ImportDestinationExists(destination));
        }
        if is_inside(source, &self.root).await {
            return Err(LibraryError::ImportSourceInsideLibrary(source.to_path_buf()));
        }

        move_folder(source.to_path_buf(), destination.clone()).await?;
        info!("Imported {} as {}", source.display(), id);

        let stats = folder_stats(&destination).await?;
        let size = match metadata.size {
            Some(size) => size,
            None => directory_size(destination.clone()).await?,
        };
        let kind = metadata.kind;
        let meta = ItemMeta {
            mtime: Some(stats.mtime_ms),
            size: Some(size),
            title: Some(metadata.title),
            kind: Some(kind),
            rating: Some(metadata.rating),
            preview: metadata.preview,
            tags: normalize_tags(metadata.tags, &self.options.preset_tags),
            notes: metadata.notes,
            description: Some(metadata.description),
            file: metadata.file,
            app_path: None,
        };

        let item = build_live_item(&id, &destination, &meta, size, stats, &self.options.placeholder_preview).await;
        self.doc.wallpapers_meta.insert(id.clone(), meta);
        if self.doc.vfs_tree.count_item_refs(&id) == 0 {
            self.doc.vfs_tree.push_item(id.clone(), kind);
        }
        self.cache.insert(id.clone(), item);
        self.refresh_sizes();
        self.persist().await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::SessionOptions;
    use crate::state::tree::VfsNode;

    async fn library() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        let session = Session::open(dir.path().join("lib"), SessionOptions::default()).await.unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn test_import_end_to_end() {
        let (dir, mut session) = library().await;
        let source = dir.path().join("incoming");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(
            source.join("project.json"),
            r#"{"title": "X", "type": "Scene", "preview": "gone.jpg"}"#,
        )
        .unwrap();
        std::fs::write(source.join("scene.pkg"), vec![0u8; 64]).unwrap();

        let scan = session.scan_import_folder(&source).await.unwrap();
        assert_eq!(scan.id, "0000000001");
        assert_eq!(scan.inferred_type, WallpaperType::Scene);
        assert_eq!(scan.file_count, 2);
        assert_eq!(scan.type_counts.pkg, 1);
        assert_eq!(scan.project_data.as_ref().unwrap().preview, None);

        let id = session
            .process_import(&source, ImportMetadata::from(&scan))
            .await
            .unwrap();

        assert!(!source.exists());
        assert!(session.root().join(&id).join("scene.pkg").is_file());
        let meta = session.metadata(&id).unwrap();
        assert_eq!(meta.title.as_deref(), Some("X"));
        assert_eq!(meta.kind, Some(WallpaperType::Scene));

        let leaves: Vec<_> = session
            .tree()
            .children
            .iter()
            .filter(|n| matches!(n, VfsNode::Item(i) if i.id == id))
            .collect();
        assert_eq!(leaves.len(), 1);
        assert!(session.live_item(&id).unwrap().preview_missing);

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(session.root().join("wallpapers_db.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["wallpapers_meta"][&id]["type"], "scene");

        // a scan right after the import finds nothing to do
        let report = session.reconcile().await.unwrap();
        assert!(report.discovered.is_empty() && report.archived.is_empty());
    }

    #[tokio::test]
    async fn test_import_without_descriptor_guesses_type() {
        let (dir, session) = library().await;
        let source = dir.path().join("clip");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("a.mp4"), b"x").unwrap();
        std::fs::write(source.join("index.html"), b"x").unwrap();

        let scan = session.scan_import_folder(&source).await.unwrap();
        assert_eq!(scan.inferred_type, WallpaperType::Video);
        assert!(scan.project_data.is_none());
        assert_eq!(ImportMetadata::from(&scan).title, "clip");
    }

    #[tokio::test]
    async fn test_import_refuses_library_sources_and_existing_ids() {
        let (dir, mut session) = library().await;
        let inside = session.root().join("123");
        std::fs::create_dir(&inside).unwrap();
        assert!(matches!(
            session.scan_import_folder(&inside).await,
            Err(LibraryError::ImportSourceInsideLibrary(_))
        ));

        let source = dir.path().join("other");
        std::fs::create_dir(&source).unwrap();
        let metadata = ImportMetadata {
            id: "123".into(),
            title: "dup".into(),
            kind: WallpaperType::Web,
            rating: Rating::Everyone,
            preview: None,
            tags: Vec::new(),
            notes: String::new(),
            description: String::new(),
            file: None,
            size: None,
        };
        assert!(matches!(
            session.process_import(&source, metadata).await,
            Err(LibraryError::ImportDestinationExists(_))
        ));
        assert!(source.exists());
    }
}
