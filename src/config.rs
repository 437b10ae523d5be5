use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LibraryError, Result};
use crate::state::data::Tag;
use crate::state::library::CATALOG_FILE;

const APP_DIR: &str = "wallpaper-vault";

/// A named group of preset tags offered by the tag editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagGroup {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Application settings, stored as TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Active library root. Every immediate subfolder is one item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,

    /// Browse the library as a flat list instead of the virtual tree
    #[serde(default)]
    pub vfs_disabled: bool,

    /// Image shown for items whose preview file is missing
    #[serde(default = "default_placeholder_preview")]
    pub placeholder_preview: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub preset_tags: Vec<TagGroup>,
}

fn default_placeholder_preview() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("assets")
        .join("missing-preview.webp")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            library_path: None,
            vfs_disabled: false,
            placeholder_preview: default_placeholder_preview(),
            log_level: default_log_level(),
            preset_tags: Vec::new(),
        }
    }
}

impl Settings {
    /// Where the settings file lives by default:
    /// - Linux: ~/.config/wallpaper-vault/settings.toml
    /// - macOS: ~/Library/Application Support/wallpaper-vault/settings.toml
    /// - Windows: %APPDATA%\wallpaper-vault\settings.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.toml")
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LibraryError::Settings(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LibraryError::Settings(format!("cannot serialize settings: {e}")))?;
        std::fs::write(path, content)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// All preset tags, flattened across groups
    pub fn preset_tags_flat(&self) -> Vec<Tag> {
        self.preset_tags
            .iter()
            .flat_map(|group| group.tags.iter().cloned())
            .collect()
    }
}

/// Check that `path` looks like a library root: it exists and holds nothing
/// but numerically named item folders and the catalog file.
pub async fn validate_library_root(path: &Path) -> Result<()> {
    let invalid = |reason: String| LibraryError::InvalidLibraryRoot {
        path: path.to_path_buf(),
        reason,
    };

    if !tokio::fs::try_exists(path).await? {
        return Err(invalid("path does not exist".to_string()));
    }

    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().await?.is_dir() {
            if !is_numeric_id(&name) {
                return Err(invalid(format!("folder '{name}' is not a numeric id")));
            }
        } else if !name.starts_with(CATALOG_FILE) {
            return Err(invalid(format!("unexpected file '{name}'")));
        }
    }
    Ok(())
}

/// Non-empty and ASCII digits only
pub fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
