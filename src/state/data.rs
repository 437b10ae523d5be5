/// Shared data structures for the library state
///
/// These structs represent the data model that flows between the catalog
/// document, the scanner and the caller. Everything that arrives from outside
/// (catalog on disk, project descriptors, user edits) is normalized here so the
/// rest of the crate only ever sees canonical values.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Kind of wallpaper project. Stored lower-cased; anything unrecognised
/// becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WallpaperType {
    Scene,
    Video,
    Application,
    Web,
    #[default]
    Unknown,
}

impl WallpaperType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "scene" => Self::Scene,
            "video" => Self::Video,
            "application" => Self::Application,
            "web" => Self::Web,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Video => "video",
            Self::Application => "application",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for WallpaperType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<WallpaperType> for String {
    fn from(value: WallpaperType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for WallpaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content rating. Unrecognised values fall back to `Everyone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rating {
    #[default]
    Everyone,
    Questionable,
    Mature,
}

impl Rating {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "questionable" => Self::Questionable,
            "mature" => Self::Mature,
            _ => Self::Everyone,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Questionable => "questionable",
            Self::Mature => "mature",
        }
    }
}

impl From<String> for Rating {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Rating> for String {
    fn from(value: Rating) -> Self {
        value.as_str().to_string()
    }
}

/// A colored tag attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub color: String,
}

/// A tag as it may arrive from older catalogs or from the caller: either a
/// bare name or an object whose color may be missing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    Name(String),
    Object {
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl TagInput {
    pub fn name(&self) -> &str {
        match self {
            TagInput::Name(name) => name,
            TagInput::Object { name, .. } => name,
        }
    }

    /// Resolve to a canonical tag. An explicit color wins, then a preset with
    /// the same name, then a color derived from the name.
    pub fn into_tag(self, presets: &[Tag]) -> Tag {
        let (name, color) = match self {
            TagInput::Name(name) => (name, None),
            TagInput::Object { name, color } => (name, color.filter(|c| !c.trim().is_empty())),
        };
        let color = color
            .or_else(|| presets.iter().find(|p| p.name == name).map(|p| p.color.clone()))
            .unwrap_or_else(|| tag_color(&name));
        Tag { name, color }
    }
}

impl From<&str> for TagInput {
    fn from(value: &str) -> Self {
        TagInput::Name(value.to_string())
    }
}

/// Normalize a tag list: canonical records, names unique, first occurrence
/// kept.
pub fn normalize_tags(tags: Vec<TagInput>, presets: &[Tag]) -> Vec<Tag> {
    let mut out: Vec<Tag> = Vec::with_capacity(tags.len());
    for input in tags {
        let name = input.name().trim();
        if name.is_empty() || out.iter().any(|t| t.name == name) {
            continue;
        }
        out.push(input.into_tag(presets));
    }
    out
}

/// Stable hex color for a tag name (FNV-1a over the UTF-8 bytes)
pub fn tag_color(name: &str) -> String {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("#{:06X}", hash & 0x00FF_FFFF)
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<TagInput>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(normalize_tags(raw, &[]))
}

/// Accepts integer or fractional milliseconds (older catalogs store floats)
fn deserialize_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|ms| ms as i64))
}

/// One file or an ordered playlist. Used for the `file` entry of video
/// projects and for the resolved video URLs handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoFile {
    Single(String),
    Playlist(Vec<String>),
}

impl VideoFile {
    pub fn map(&self, mut f: impl FnMut(&str) -> String) -> VideoFile {
        match self {
            VideoFile::Single(file) => VideoFile::Single(f(file)),
            VideoFile::Playlist(files) => VideoFile::Playlist(files.iter().map(|s| f(s)).collect()),
        }
    }
}

/// Persisted metadata for one item, keyed by id in the catalog.
///
/// Most fields are optional because partial entries exist: a move or an
/// app-path update can record a type for an item that was never scanned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    #[serde(default, deserialize_with = "deserialize_millis", skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<WallpaperType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<VideoFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_path: Option<String>,
}

impl ItemMeta {
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }

    pub fn kind_or_default(&self) -> WallpaperType {
        self.kind.unwrap_or_default()
    }
}

/// User-editable details submitted for one item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemDetails {
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub tags: Vec<TagInput>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: String,
}

/// An item as served to the caller, rebuilt on every scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: WallpaperType,
    pub rating: Rating,
    /// `file://` URL of the preview, or of the placeholder when missing
    pub preview: String,
    pub preview_missing: bool,
    pub folder_path: PathBuf,
    pub app_path: Option<String>,
    /// Folder creation time in epoch milliseconds, when the platform has it
    pub date_added: Option<i64>,
    pub size: u64,
    pub tags: Vec<Tag>,
    pub notes: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoFile>,
}

impl LiveItem {
    /// Copy with a cache-busting token appended to every media URL
    pub fn with_cache_token(&self, token: i64) -> LiveItem {
        let mut item = self.clone();
        item.preview = format!("{}?t={}", item.preview, token);
        item.video = item.video.map(|v| v.map(|url| format!("{url}?t={token}")));
        item
    }
}

/// A virtual folder as served to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderSummary {
    pub id: String,
    pub title: String,
    pub vpath: String,
    pub size: u64,
}

/// One entry of a browse result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "itemType", rename_all = "lowercase")]
pub enum Listing {
    Folder(FolderSummary),
    Wallpaper(LiveItem),
}

impl Listing {
    pub fn id(&self) -> &str {
        match self {
            Listing::Folder(folder) => &folder.id,
            Listing::Wallpaper(item) => &item.id,
        }
    }
}

/// `file://` URL for a local path, always with forward slashes
pub fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}
