/// Filesystem walking for the scanner
///
/// Recursive walks run on the blocking pool through walkdir; the caller awaits
/// each one before moving on, so a scan never has two walks of its own in
/// flight.
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::task;
use tracing::debug;
use walkdir::WalkDir;

use super::descriptor::TypeCounts;
use crate::error::{LibraryError, Result};

/// Timestamps of an item folder, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderStats {
    pub mtime_ms: i64,
    pub created_ms: Option<i64>,
}

/// Totals gathered from one full walk of a folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderSurvey {
    pub size: u64,
    pub file_count: usize,
    pub type_counts: TypeCounts,
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Names of the immediate subdirectories of the library root.
///
/// This is the ground truth of which items exist. Failing to list the root
/// is fatal for the caller's pass.
pub async fn list_item_folders(root: &Path) -> Result<Vec<String>> {
    let unreadable = |source: io::Error| LibraryError::LibraryUnreadable {
        path: root.to_path_buf(),
        kind: source.kind(),
        source,
    };

    let mut entries = tokio::fs::read_dir(root).await.map_err(unreadable)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        // an entry whose type cannot be read is skipped, not fatal
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub async fn folder_stats(path: &Path) -> Result<FolderStats> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(FolderStats {
        mtime_ms: epoch_millis(metadata.modified()?),
        created_ms: metadata.created().ok().map(epoch_millis),
    })
}

/// Recursive size of all regular files below `path`
pub async fn directory_size(path: PathBuf) -> Result<u64> {
    Ok(survey_folder(path).await?.size)
}

/// Walk `path` once and collect size, file count and extension counts
pub async fn survey_folder(path: PathBuf) -> Result<FolderSurvey> {
    // Spawn blocking because walkdir does synchronous IO
    let survey = task::spawn_blocking(move || survey_folder_blocking(&path)).await?;
    Ok(survey)
}

/// Blocking implementation of the folder walk. Unreadable entries are
/// skipped so one bad file does not hide the rest of the folder.
fn survey_folder_blocking(path: &Path) -> FolderSurvey {
    let mut survey = FolderSurvey::default();

    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        survey.size = survey.size.saturating_add(metadata.len());
        survey.file_count += 1;
        survey.type_counts.record(Path::new(entry.file_name()));
    }

    survey
}

/// Move a folder, falling back to copy-then-delete when a rename is not
/// possible (different devices).
pub async fn move_folder(source: PathBuf, destination: PathBuf) -> Result<()> {
    match tokio::fs::rename(&source, &destination).await {
        Ok(()) => return Ok(()),
        Err(e) => debug!(
            "Rename {} -> {} failed ({}), copying instead",
            source.display(),
            destination.display(),
            e
        ),
    }

    task::spawn_blocking(move || -> Result<()> {
        copy_tree_blocking(&source, &destination)?;
        std::fs::remove_dir_all(&source)?;
        Ok(())
    })
    .await?
}

fn copy_tree_blocking(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
