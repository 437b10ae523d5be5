/// The virtual folder tree
///
/// Folders own their children outright, so the tree cannot contain cycles.
/// Leaves only reference items by id; their `type` is a cached copy used for
/// filtering and has to be refreshed when an item's type changes.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::data::WallpaperType;
use crate::error::{LibraryError, Result};

/// Canonical spelling of the root path
pub const ROOT_VPATH: &str = "./";

/// Split a virtual path into folder names. `./`, `/`, `.` and the empty
/// string all address the root.
pub fn vpath_segments(vpath: &str) -> Vec<&str> {
    vpath
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

/// Build the canonical `./a/b/` form from folder names
pub fn join_vpath<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::from(ROOT_VPATH);
    for segment in segments {
        out.push_str(segment.as_ref());
        out.push('/');
    }
    out
}

/// Canonical form of any accepted spelling
pub fn normalize_vpath(vpath: &str) -> String {
    join_vpath(&vpath_segments(vpath))
}

pub fn validate_folder_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || name.contains('/') || name.contains('\\') {
        return Err(LibraryError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FolderMarker {
    #[default]
    Folder,
}

/// A node of the virtual tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VfsNode {
    Folder(FolderNode),
    Item(ItemRef),
}

/// Reference to an item by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: WallpaperType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    #[serde(rename = "type", default)]
    marker: FolderMarker,
    #[serde(default)]
    pub children: Vec<VfsNode>,
    /// Derived by `recompute_sizes`, never authoritative
    #[serde(default)]
    pub size: u64,
}

impl Default for FolderNode {
    fn default() -> Self {
        Self::root()
    }
}

impl FolderNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marker: FolderMarker::Folder,
            children: Vec::new(),
            size: 0,
        }
    }

    pub fn root() -> Self {
        Self::new("root")
    }

    fn child_folder(&self, name: &str) -> Option<&FolderNode> {
        self.children.iter().find_map(|child| match child {
            VfsNode::Folder(folder) if folder.name == name => Some(folder),
            _ => None,
        })
    }

    fn child_folder_mut(&mut self, name: &str) -> Option<&mut FolderNode> {
        self.children.iter_mut().find_map(|child| match child {
            VfsNode::Folder(folder) if folder.name == name => Some(folder),
            _ => None,
        })
    }

    fn child_folder_index(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|child| matches!(child, VfsNode::Folder(folder) if folder.name == name))
    }

    /// Case-insensitive sibling check used for name collisions
    pub fn has_folder_named(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.children
            .iter()
            .any(|child| matches!(child, VfsNode::Folder(folder) if folder.name.to_lowercase() == wanted))
    }

    pub fn resolve(&self, vpath: &str) -> Option<&FolderNode> {
        vpath_segments(vpath)
            .into_iter()
            .try_fold(self, |node, part| node.child_folder(part))
    }

    pub fn resolve_mut(&mut self, vpath: &str) -> Option<&mut FolderNode> {
        let mut node = self;
        for part in vpath_segments(vpath) {
            node = node.child_folder_mut(part)?;
        }
        Some(node)
    }

    pub fn push_item(&mut self, id: impl Into<String>, kind: WallpaperType) {
        self.children.push(VfsNode::Item(ItemRef { id: id.into(), kind }));
    }

    /// Add a new empty folder under `parent_vpath`, returning its path
    pub fn create_folder(&mut self, parent_vpath: &str, name: &str) -> Result<String> {
        validate_folder_name(name)?;
        let parent = self
            .resolve_mut(parent_vpath)
            .ok_or_else(|| LibraryError::NotFound(normalize_vpath(parent_vpath)))?;
        if parent.has_folder_named(name) {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }
        parent.children.push(VfsNode::Folder(FolderNode::new(name)));

        let mut segments = vpath_segments(parent_vpath);
        segments.push(name);
        Ok(join_vpath(&segments))
    }

    /// Remove an empty folder
    pub fn delete_folder(&mut self, vpath: &str) -> Result<()> {
        let segments = vpath_segments(vpath);
        let Some((name, parent_segments)) = segments.split_last() else {
            return Err(LibraryError::InvalidName(ROOT_VPATH.to_string()));
        };

        let canonical = join_vpath(&segments);
        let parent = self
            .resolve_mut(&join_vpath(parent_segments))
            .ok_or_else(|| LibraryError::NotFound(canonical.clone()))?;
        let index = parent
            .child_folder_index(name)
            .ok_or_else(|| LibraryError::NotFound(canonical.clone()))?;

        if let VfsNode::Folder(folder) = &parent.children[index] {
            if !folder.children.is_empty() {
                return Err(LibraryError::FolderNotEmpty(canonical));
            }
        }
        parent.children.remove(index);
        Ok(())
    }

    /// Relocate the folder at `source_vpath` into `target_vpath`
    pub fn move_folder(&mut self, source_vpath: &str, target_vpath: &str) -> Result<()> {
        let source = vpath_segments(source_vpath);
        let target = vpath_segments(target_vpath);

        if target.starts_with(&source) {
            return Err(LibraryError::IllegalMove {
                folder: join_vpath(&source),
                target: join_vpath(&target),
            });
        }
        if self.resolve(target_vpath).is_none() {
            return Err(LibraryError::TargetNotFound(join_vpath(&target)));
        }

        // the root is a prefix of every target, so source is non-empty here
        let Some((name, parent_segments)) = source.split_last() else {
            return Err(LibraryError::IllegalMove {
                folder: ROOT_VPATH.to_string(),
                target: join_vpath(&target),
            });
        };
        let missing = || LibraryError::NotFound(join_vpath(&source));
        let parent_vpath = join_vpath(parent_segments);
        if self.resolve(&parent_vpath).and_then(|p| p.child_folder(name)).is_none() {
            return Err(missing());
        }

        let same_parent = parent_segments == target.as_slice();
        if !same_parent && self.resolve(target_vpath).is_some_and(|t| t.has_folder_named(name)) {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }

        let parent = self.resolve_mut(&parent_vpath).ok_or_else(missing)?;
        let index = parent.child_folder_index(name).ok_or_else(missing)?;
        let node = parent.children.remove(index);
        // detaching a non-ancestor leaves the target path intact
        let destination = self
            .resolve_mut(target_vpath)
            .ok_or_else(|| LibraryError::TargetNotFound(join_vpath(&target)))?;
        destination.children.push(node);
        Ok(())
    }

    /// Drop every leaf referencing `id`, at any depth. Returns how many were
    /// removed.
    pub fn remove_item(&mut self, id: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|child| !matches!(child, VfsNode::Item(item) if item.id == id));
        let mut removed = before - self.children.len();

        for child in &mut self.children {
            if let VfsNode::Folder(folder) = child {
                removed += folder.remove_item(id);
            }
        }
        removed
    }

    /// Set the cached type on every leaf referencing `id`. Returns whether a
    /// leaf was found.
    pub fn set_item_kind(&mut self, id: &str, kind: WallpaperType) -> bool {
        let mut found = false;
        for child in &mut self.children {
            match child {
                VfsNode::Item(item) if item.id == id => {
                    item.kind = kind;
                    found = true;
                }
                VfsNode::Folder(folder) => found |= folder.set_item_kind(id, kind),
                _ => {}
            }
        }
        found
    }

    pub fn count_item_refs(&self, id: &str) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                VfsNode::Item(item) => usize::from(item.id == id),
                VfsNode::Folder(folder) => folder.count_item_refs(id),
            })
            .sum()
    }

    /// Every item id referenced anywhere below this folder
    pub fn item_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        self.collect_item_ids(&mut ids);
        ids
    }

    fn collect_item_ids(&self, ids: &mut HashSet<String>) {
        for child in &self.children {
            match child {
                VfsNode::Item(item) => {
                    ids.insert(item.id.clone());
                }
                VfsNode::Folder(folder) => folder.collect_item_ids(ids),
            }
        }
    }

    /// Post-order size aggregation. Leaf sizes come from `lookup`; ids it
    /// does not know count as zero.
    pub fn recompute_sizes<F>(&mut self, lookup: &F) -> u64
    where
        F: Fn(&str) -> Option<u64>,
    {
        let mut changed = false;
        self.aggregate(lookup, &mut changed)
    }

    /// Like `recompute_sizes` but reports whether any folder size moved
    pub fn refresh_sizes<F>(&mut self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<u64>,
    {
        let mut changed = false;
        self.aggregate(lookup, &mut changed);
        changed
    }

    fn aggregate<F>(&mut self, lookup: &F, changed: &mut bool) -> u64
    where
        F: Fn(&str) -> Option<u64>,
    {
        let mut total = 0u64;
        for child in &mut self.children {
            total = total.saturating_add(match child {
                VfsNode::Folder(folder) => folder.aggregate(lookup, changed),
                VfsNode::Item(item) => lookup(&item.id).unwrap_or(0),
            });
        }
        if self.size != total {
            self.size = total;
            *changed = true;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_tree() -> FolderNode {
        let mut root = FolderNode::root();
        root.create_folder("./", "a").unwrap();
        root.create_folder("./a/", "b").unwrap();
        root.create_folder("./", "c").unwrap();
        root
    }

    #[test]
    fn test_vpath_spellings_resolve_to_root() {
        let root = sample_tree();
        for spelling in ["./", "/", "", "."] {
            assert_eq!(root.resolve(spelling).unwrap().name, "root");
        }
        assert_eq!(root.resolve("./a/b/").unwrap().name, "b");
        assert_eq!(root.resolve("a/b").unwrap().name, "b");
        assert!(root.resolve("./missing/").is_none());
        assert_eq!(normalize_vpath("a//b/"), "./a/b/");
    }

    #[test]
    fn test_create_folder_rejects_bad_names() {
        let mut root = sample_tree();
        assert!(matches!(root.create_folder("./", "A"), Err(LibraryError::DuplicateName(_))));
        assert!(matches!(root.create_folder("./", "x/y"), Err(LibraryError::InvalidName(_))));
        assert!(matches!(root.create_folder("./", "x\\y"), Err(LibraryError::InvalidName(_))));
        assert!(matches!(root.create_folder("./", " . "), Err(LibraryError::InvalidName(_))));
        assert!(matches!(root.create_folder("./", ""), Err(LibraryError::InvalidName(_))));
        assert!(matches!(root.create_folder("./nope/", "x"), Err(LibraryError::NotFound(_))));

        assert_eq!(root.create_folder("./a/", "B2").unwrap(), "./a/B2/");
    }

    #[test]
    fn test_delete_folder_guards_non_empty() {
        let mut root = sample_tree();
        root.resolve_mut("./c/").unwrap().push_item("1", WallpaperType::Scene);

        assert!(matches!(root.delete_folder("./c/"), Err(LibraryError::FolderNotEmpty(_))));
        assert_eq!(root.remove_item("1"), 1);
        root.delete_folder("./c/").unwrap();
        assert!(root.resolve("./c/").is_none());

        assert!(matches!(root.delete_folder("./c/"), Err(LibraryError::NotFound(_))));
        assert!(matches!(root.delete_folder("./"), Err(LibraryError::InvalidName(_))));
    }

    #[test]
    fn test_move_folder_into_descendant_is_illegal() {
        let mut root = sample_tree();
        let before = root.clone();

        assert!(matches!(
            root.move_folder("./a/", "./a/b/"),
            Err(LibraryError::IllegalMove { .. })
        ));
        assert!(matches!(
            root.move_folder("./a/", "./a/"),
            Err(LibraryError::IllegalMove { .. })
        ));
        assert_eq!(root, before);
    }

    #[test]
    fn test_move_folder_prefix_names_are_not_descendants() {
        let mut root = FolderNode::root();
        root.create_folder("./", "a").unwrap();
        root.create_folder("./", "ab").unwrap();

        root.move_folder("./a/", "./ab/").unwrap();
        assert!(root.resolve("./ab/a/").is_some());
        assert!(root.resolve("./a/").is_none());
    }

    #[test]
    fn test_move_folder_checks_target_and_collisions() {
        let mut root = sample_tree();
        root.create_folder("./c/", "B").unwrap();

        assert!(matches!(root.move_folder("./c/", "./zzz/"), Err(LibraryError::TargetNotFound(_))));
        assert!(matches!(root.move_folder("./a/b/", "./c/"), Err(LibraryError::DuplicateName(_))));
        assert!(matches!(root.move_folder("./nope/", "./c/"), Err(LibraryError::NotFound(_))));

        // re-appending into the current parent is fine
        root.move_folder("./a/", "./").unwrap();
        assert!(matches!(root.children.last(), Some(VfsNode::Folder(f)) if f.name == "a"));
    }

    #[test]
    fn test_remove_item_finds_nested_duplicates() {
        let mut root = sample_tree();
        root.push_item("7", WallpaperType::Video);
        root.resolve_mut("./a/b/").unwrap().push_item("7", WallpaperType::Video);
        root.resolve_mut("./c/").unwrap().push_item("8", WallpaperType::Web);

        assert_eq!(root.count_item_refs("7"), 2);
        assert_eq!(root.remove_item("7"), 2);
        assert_eq!(root.count_item_refs("7"), 0);
        assert_eq!(root.count_item_refs("8"), 1);
    }

    #[test]
    fn test_aggregation_propagates_to_ancestors() {
        let mut root = FolderNode::root();
        root.create_folder("./", "outer").unwrap();
        root.create_folder("./outer/", "folderA").unwrap();
        let folder_a = root.resolve_mut("./outer/folderA/").unwrap();
        folder_a.push_item("item1", WallpaperType::Scene);
        folder_a.push_item("item2", WallpaperType::Scene);
        root.push_item("ghost", WallpaperType::Scene);

        let sizes: HashMap<&str, u64> = [("item1", 100), ("item2", 200)].into_iter().collect();
        let lookup = |id: &str| sizes.get(id).copied();

        assert_eq!(root.recompute_sizes(&lookup), 300);
        assert_eq!(root.resolve("./outer/folderA/").unwrap().size, 300);
        assert_eq!(root.resolve("./outer/").unwrap().size, 300);
        assert_eq!(root.size, 300);

        assert!(!root.refresh_sizes(&lookup));
    }

    #[test]
    fn test_document_shape_round_trips() {
        let json = r#"{
            "name": "root", "type": "folder", "children": [
                {"id": "123", "type": "Scene"},
                {"name": "f", "type": "folder", "children": [], "size": 0}
            ]
        }"#;
        let root: FolderNode = serde_json::from_str(json).unwrap();
        assert!(matches!(&root.children[0], VfsNode::Item(i) if i.kind == WallpaperType::Scene));
        assert!(matches!(&root.children[1], VfsNode::Folder(f) if f.name == "f"));

        let value = serde_json::to_value(&root).unwrap();
        assert_eq!(value["children"][0]["type"], "scene");
        assert_eq!(value["children"][1]["type"], "folder");
    }
}
