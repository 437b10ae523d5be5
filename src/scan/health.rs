/// Catalog health check: repair incomplete metadata from descriptors
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use super::descriptor::read_descriptor;
use super::walk::list_item_folders;
use crate::error::Result;
use crate::state::data::WallpaperType;
use crate::state::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEntry {
    pub id: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub fixed: Vec<HealthEntry>,
    pub missing: Vec<HealthEntry>,
}

impl Session {
    /// Walk the item folders and fill in missing title, type and description
    /// from each folder's descriptor. Items that cannot be repaired are
    /// reported, never removed.
    pub async fn check_health(&mut self) -> Result<HealthReport> {
        let mut report = HealthReport::default();
        let mut changed = false;

        for id in list_item_folders(&self.root).await? {
            let folder = self.root.join(&id);
            let meta = self.doc.wallpapers_meta.get(&id);
            let incomplete = meta.map_or(true, |m| m.title.is_none() || m.kind.is_none());
            let needs_description = meta.is_some_and(|m| m.description.is_none());

            if incomplete {
                match read_descriptor(&folder).await {
                    Ok(descriptor) => {
                        let kind = descriptor.wallpaper_type();
                        let meta = self.doc.wallpapers_meta.entry(id.clone()).or_default();
                        meta.title = Some(descriptor.title_or_default());
                        meta.kind = Some(kind);
                        meta.rating = Some(descriptor.rating());
                        meta.preview = descriptor.preview.clone();
                        if kind == WallpaperType::Video && descriptor.file.is_some() {
                            meta.file = descriptor.file.clone();
                        }
                        if let Some(description) = descriptor.description.filter(|d| !d.is_empty()) {
                            meta.description = Some(description);
                        } else if meta.description.is_none() {
                            meta.description = Some(String::new());
                        }

                        let (title, rating) = (meta.title_or_default().to_string(), meta.rating.unwrap_or_default());
                        if let Some(item) = self.cache.get_mut(&id) {
                            item.title = title;
                            item.kind = kind;
                            item.rating = rating;
                        }
                        self.doc.vfs_tree.set_item_kind(&id, kind);

                        info!("Repaired metadata of {} from its descriptor", id);
                        report.fixed.push(HealthEntry {
                            id,
                            path: folder,
                            reason: "metadata restored from project.json".to_string(),
                        });
                        changed = true;
                    }
                    Err(e) => {
                        warn!("Metadata of {} is incomplete and cannot be repaired: {}", id, e);
                        report.missing.push(HealthEntry {
                            id,
                            path: folder,
                            reason: e.to_string(),
                        });
                    }
                }
            } else if needs_description {
                // Settle on an empty string when the descriptor has nothing, so
                // the item is not checked again
                let description = match read_descriptor(&folder).await {
                    Ok(descriptor) => descriptor.description.unwrap_or_default(),
                    Err(e) => {
                        warn!("Could not read description for {}: {}", id, e);
                        String::new()
                    }
                };
                if !description.is_empty() {
                    report.fixed.push(HealthEntry {
                        id: id.clone(),
                        path: folder,
                        reason: "description restored from project.json".to_string(),
                    });
                }
                if let Some(item) = self.cache.get_mut(&id) {
                    item.description = description.clone();
                }
                if let Some(meta) = self.doc.wallpapers_meta.get_mut(&id) {
                    meta.description = Some(description);
                }
                changed = true;
            }
        }

        if changed {
            self.persist().await?;
        }
        Ok(report)
    }
}
