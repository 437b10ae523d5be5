/// Read-only projections of a session for the caller
use tracing::warn;

use crate::state::data::{FolderSummary, Listing, LiveItem};
use crate::state::session::Session;
use crate::state::tree::{join_vpath, normalize_vpath, vpath_segments, VfsNode};

/// Case-insensitive ordered-subsequence match: every character of `query`
/// appears in `text` in the same order, not necessarily adjacent.
pub fn sparse_match(query: &str, text: &str) -> bool {
    let mut haystack = text.chars().flat_map(char::to_lowercase);
    query
        .chars()
        .flat_map(char::to_lowercase)
        .all(|needle| haystack.any(|c| c == needle))
}

impl Session {
    /// Children of the folder at `vpath`, with media URLs tagged by the
    /// current time so a client reloads changed files
    pub fn list_children(&self, vpath: &str) -> Vec<Listing> {
        self.list_children_at(vpath, chrono::Utc::now().timestamp_millis())
    }

    /// `list_children` with an explicit cache-busting token
    pub fn list_children_at(&self, vpath: &str, token: i64) -> Vec<Listing> {
        if self.options.vfs_disabled {
            let mut items: Vec<&LiveItem> = self.cache.values().collect();
            items.sort_by(|a, b| a.id.cmp(&b.id));
            return items
                .into_iter()
                .map(|item| Listing::Wallpaper(item.with_cache_token(token)))
                .collect();
        }

        let Some(folder) = self.doc.vfs_tree.resolve(vpath) else {
            warn!("No virtual folder at {}", vpath);
            return Vec::new();
        };

        let current = normalize_vpath(vpath);
        let segments = vpath_segments(&current);
        let mut listings = Vec::with_capacity(folder.children.len());

        for child in &folder.children {
            match child {
                VfsNode::Folder(node) => {
                    let mut path: Vec<&str> = segments.clone();
                    path.push(&node.name);
                    listings.push(Listing::Folder(FolderSummary {
                        id: format!("vfolder_{}_{}", current, node.name),
                        title: node.name.clone(),
                        vpath: join_vpath(&path),
                        size: node.size,
                    }));
                }
                VfsNode::Item(leaf) => match self.cache.get(&leaf.id) {
                    Some(item) => listings.push(Listing::Wallpaper(item.with_cache_token(token))),
                    None => warn!("Item {} is in the tree but not in the live cache", leaf.id),
                },
            }
        }
        listings
    }

    /// Live items whose title matches `query`, ordered by id. An empty query
    /// matches nothing.
    pub fn search(&self, query: &str) -> Vec<LiveItem> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<LiveItem> = self
            .cache
            .values()
            .filter(|item| sparse_match(query, &item.title))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{MoveSource, SessionOptions};

    #[test]
    fn test_sparse_match() {
        assert!(sparse_match("ngt", "Night City"));
        assert!(sparse_match("NIGHT", "night city"));
        assert!(!sparse_match("tn", "Night"));
        assert!(sparse_match("", "anything"));
        assert!(!sparse_match("x", ""));
    }

    async fn scanned_library(vfs_disabled: bool) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        for (id, title) in [("1", "Night City"), ("2", "Forest")] {
            let folder = dir.path().join(id);
            std::fs::create_dir(&folder).unwrap();
            std::fs::write(
                folder.join("project.json"),
                format!(r#"{{"title": "{title}", "type": "video", "file": "v.mp4"}}"#),
            )
            .unwrap();
            std::fs::write(folder.join("v.mp4"), vec![0u8; 10]).unwrap();
        }
        let options = SessionOptions {
            vfs_disabled,
            ..Default::default()
        };
        let mut session = Session::open(dir.path(), options).await.unwrap();
        session.reconcile().await.unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn test_list_children_projects_folders_and_items() {
        let (_dir, mut session) = scanned_library(false).await;
        session.create_folder("Dark", "./").await.unwrap();
        session
            .move_items(&[MoveSource::Item("1".into())], "./Dark/")
            .await
            .unwrap();

        let root = session.list_children_at("./", 7);
        assert_eq!(root.len(), 2);
        let folder = root
            .iter()
            .find_map(|l| match l {
                Listing::Folder(f) => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(folder.id, "vfolder_./_Dark");
        assert_eq!(folder.vpath, "./Dark/");
        assert_eq!(folder.size, session.live_item("1").unwrap().size);

        let inside = session.list_children_at("./Dark/", 7);
        match &inside[..] {
            [Listing::Wallpaper(item)] => {
                assert_eq!(item.id, "1");
                assert!(item.preview.ends_with("?t=7"));
                assert!(matches!(&item.video, Some(crate::state::data::VideoFile::Single(v)) if v.ends_with("v.mp4?t=7")));
            }
            other => panic!("unexpected listing: {other:?}"),
        }

        assert!(session.list_children_at("./missing/", 7).is_empty());
    }

    #[tokio::test]
    async fn test_flat_listing_when_vfs_disabled() {
        let (_dir, session) = scanned_library(true).await;
        let ids: Vec<String> = session
            .list_children("./anything/")
            .iter()
            .map(|l| l.id().to_string())
            .collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_search() {
        let (_dir, session) = scanned_library(false).await;
        let hits = session.search("nc");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Night City");
        assert!(session.search("  ").is_empty());
        assert_eq!(session.search("t").len(), 2);
    }
}
