/// The library service: owns the active session and serializes access to it
///
/// Every operation locks the session for its whole duration. A reconcile pass
/// therefore queues behind another pass, and mutations queue behind a scan in
/// flight.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info};

use crate::config::{validate_library_root, Settings};
use crate::error::{LibraryError, Result};
use crate::import::{ImportMetadata, ImportScan};
use crate::scan::{HealthReport, ScanReport};
use crate::state::data::{ItemDetails, ItemMeta, Listing, LiveItem, Tag, WallpaperType};
use crate::state::library::DocumentStore;
use crate::state::session::{DeleteReport, MoveSource, Session, SessionOptions};
use crate::state::tree::FolderNode;

const EVENT_CAPACITY: usize = 16;

/// Out-of-band notifications for listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ScanEvent {
    /// Sent once at the end of every reconcile pass
    ScanFinished { success: bool },
}

pub struct LibraryService {
    settings: RwLock<Settings>,
    /// Where settings are written back on library switch; `None` keeps them
    /// in memory only
    settings_path: Option<PathBuf>,
    session: Mutex<Session>,
    events: broadcast::Sender<ScanEvent>,
    scanning: AtomicBool,
}

impl LibraryService {
    /// Open the library configured in `settings`. No scan is run; call
    /// `reconcile` to populate the live cache.
    pub async fn open(settings: Settings, settings_path: Option<PathBuf>) -> Result<Self> {
        let root = settings
            .library_path
            .clone()
            .ok_or_else(|| LibraryError::Settings("no library path configured".to_string()))?;
        let session = Session::open(root, SessionOptions::from(&settings)).await?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            settings: RwLock::new(settings),
            settings_path,
            session: Mutex::new(session),
            events,
            scanning: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn library_root(&self) -> PathBuf {
        self.session.lock().await.root().to_path_buf()
    }

    /// Run a reconcile pass and announce its outcome
    pub async fn reconcile(&self) -> Result<ScanReport> {
        let mut session = self.session.lock().await;
        self.run_reconcile(&mut session).await
    }

    async fn run_reconcile(&self, session: &mut Session) -> Result<ScanReport> {
        self.scanning.store(true, Ordering::SeqCst);
        let result = session.reconcile().await;
        self.scanning.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            error!("Library scan failed: {}", e);
        }
        // nobody listening is fine
        let _ = self.events.send(ScanEvent::ScanFinished {
            success: result.is_ok(),
        });
        result
    }

    /// Point the service at another library root.
    ///
    /// The root is validated first. Any pass in flight finishes before the old
    /// session is dropped, and the new one is reconciled before returning.
    pub async fn switch_library(&self, root: &Path) -> Result<ScanReport> {
        validate_library_root(root).await?;
        DocumentStore::for_library(root).ensure_exists().await?;

        let mut session = self.session.lock().await;
        let mut settings = self.settings.write().await;
        let mut updated = settings.clone();
        updated.library_path = Some(root.to_path_buf());

        // settings are committed only once the new session is open
        let next = Session::open(root, SessionOptions::from(&updated)).await?;
        if let Some(path) = &self.settings_path {
            updated.save_to_file(path)?;
        }
        *settings = updated;
        *session = next;
        drop(settings);
        info!("Switched library to {}", root.display());
        self.run_reconcile(&mut session).await
    }

    pub async fn list_children(&self, vpath: &str) -> Vec<Listing> {
        self.session.lock().await.list_children(vpath)
    }

    pub async fn tree(&self) -> FolderNode {
        self.session.lock().await.tree().clone()
    }

    pub async fn all_metadata(&self) -> Vec<(String, ItemMeta)> {
        let session = self.session.lock().await;
        session
            .document()
            .wallpapers_meta
            .iter()
            .map(|(id, meta)| (id.clone(), meta.clone()))
            .collect()
    }

    pub async fn create_folder(&self, name: &str, parent_vpath: &str) -> Result<String> {
        self.session.lock().await.create_folder(name, parent_vpath).await
    }

    pub async fn delete_folder(&self, vpath: &str) -> Result<()> {
        self.session.lock().await.delete_folder(vpath).await
    }

    pub async fn move_items(&self, sources: &[MoveSource], target_vpath: &str) -> Result<usize> {
        self.session.lock().await.move_items(sources, target_vpath).await
    }

    pub async fn save_item_details(&self, id: &str, details: ItemDetails) -> Result<()> {
        self.session.lock().await.save_item_details(id, details).await
    }

    pub async fn save_app_path(&self, id: &str, relative_exe: &str, kind: WallpaperType) -> Result<()> {
        self.session.lock().await.save_app_path(id, relative_exe, kind).await
    }

    pub async fn delete_items(&self, ids: &[String]) -> Result<DeleteReport> {
        self.session.lock().await.delete_items(ids).await
    }

    pub async fn forget_items(&self, ids: &[String]) -> Result<usize> {
        self.session.lock().await.forget_items(ids).await
    }

    /// Empty the catalog and rebuild it from disk
    pub async fn clear_all(&self) -> Result<ScanReport> {
        let mut session = self.session.lock().await;
        if let Err(e) = session.clear().await {
            error!("Clearing the catalog failed: {}", e);
            let _ = self.events.send(ScanEvent::ScanFinished { success: false });
            return Err(e);
        }
        self.run_reconcile(&mut session).await
    }

    pub async fn all_tags(&self) -> Vec<Tag> {
        self.session.lock().await.all_tags()
    }

    pub async fn search(&self, query: &str) -> Vec<LiveItem> {
        self.session.lock().await.search(query)
    }

    pub async fn check_health(&self) -> Result<HealthReport> {
        self.session.lock().await.check_health().await
    }

    pub async fn scan_import_folder(&self, source: &Path) -> Result<ImportScan> {
        self.session.lock().await.scan_import_folder(source).await
    }

    pub async fn process_import(&self, source: &Path, metadata: ImportMetadata) -> Result<String> {
        self.session.lock().await.process_import(source, metadata).await
    }
}
