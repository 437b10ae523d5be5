/// Reading the `project.json` shipped inside every wallpaper folder
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::state::data::{Rating, VideoFile, WallpaperType};

pub const DESCRIPTOR_FILE: &str = "project.json";

/// The subset of a project descriptor the library cares about.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub contentrating: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub file: Option<VideoFile>,
    #[serde(default)]
    pub description: Option<String>,
    /// Either a string or a number depending on the tool that wrote it
    #[serde(default)]
    pub workshopid: Option<serde_json::Value>,
}

impl ProjectDescriptor {
    pub fn title_or_default(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn wallpaper_type(&self) -> WallpaperType {
        self.kind.as_deref().map(WallpaperType::parse).unwrap_or_default()
    }

    pub fn rating(&self) -> Rating {
        self.contentrating.as_deref().map(Rating::parse).unwrap_or_default()
    }

    /// Workshop id as trimmed text, if present
    pub fn workshop_id(&self) -> Option<String> {
        let id = match self.workshopid.as_ref()? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

pub fn descriptor_path(folder: &Path) -> PathBuf {
    folder.join(DESCRIPTOR_FILE)
}

/// Read and parse `folder/project.json`
pub async fn read_descriptor(folder: &Path) -> Result<ProjectDescriptor> {
    let path = descriptor_path(folder);
    let unreadable = |reason: String| LibraryError::DescriptorUnreadable {
        path: path.clone(),
        reason,
    };

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))
}

/// Per-extension file counts used to guess the type of a folder that ships
/// without a descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub mp4: usize,
    pub pkg: usize,
    pub exe: usize,
    pub html: usize,
}

impl TypeCounts {
    pub fn record(&mut self, file_name: &Path) {
        let ext = file_name
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" => self.mp4 += 1,
            "pkg" => self.pkg += 1,
            "exe" => self.exe += 1,
            "html" => self.html += 1,
            _ => {}
        }
    }

    /// Guess a type. Priority is fixed: video, then scene, then application,
    /// then web.
    pub fn infer_type(&self) -> WallpaperType {
        if self.mp4 > 0 {
            WallpaperType::Video
        } else if self.pkg > 0 {
            WallpaperType::Scene
        } else if self.exe > 0 {
            WallpaperType::Application
        } else if self.html > 0 {
            WallpaperType::Web
        } else {
            WallpaperType::Unknown
        }
    }
}
