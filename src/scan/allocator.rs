/// Identifier allocation for newly discovered items
use std::collections::HashSet;
use std::path::Path;

use super::descriptor::ProjectDescriptor;
use crate::config::is_numeric_id;

/// Width of locally generated ids. Workshop ids are far larger, so a
/// zero-padded id of this width never collides with one.
pub const LOCAL_ID_WIDTH: usize = 10;

/// Pick an id for an item, first match wins:
/// 1. the descriptor's numeric workshop id, if unused
/// 2. the folder name, if numeric and unused
/// 3. the lowest free local id (`0000000001`, ...), reusing holes left by
///    deleted items
pub fn allocate<S>(folder: &Path, descriptor: Option<&ProjectDescriptor>, existing: &HashSet<S>) -> String
where
    S: std::borrow::Borrow<str> + std::hash::Hash + Eq,
{
    if let Some(workshop_id) = descriptor.and_then(|d| d.workshop_id()) {
        if is_numeric_id(&workshop_id) && !existing.contains(workshop_id.as_str()) {
            return workshop_id;
        }
    }

    if let Some(name) = folder.file_name().and_then(|n| n.to_str()) {
        if is_numeric_id(name) && !existing.contains(name) {
            return name.to_string();
        }
    }

    next_local_id(existing.iter().map(|id| id.borrow()))
}

/// Lowest positive number not already taken by a local id, zero-padded
pub fn next_local_id<'a>(existing: impl Iterator<Item = &'a str>) -> String {
    let mut taken: Vec<u64> = existing
        .filter(|id| id.len() == LOCAL_ID_WIDTH && id.starts_with('0') && is_numeric_id(id))
        .filter_map(|id| id.parse().ok())
        .collect();
    taken.sort_unstable();
    taken.dedup();

    let mut candidate = 1u64;
    for id in taken {
        if id == candidate {
            candidate += 1;
        } else if id > candidate {
            break;
        }
    }
    format!("{:0width$}", candidate, width = LOCAL_ID_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn descriptor(workshop: &str) -> ProjectDescriptor {
        serde_json::from_value(serde_json::json!({ "workshopid": workshop })).unwrap()
    }

    #[test]
    fn test_first_local_id() {
        let id = allocate(Path::new("/src/My Wallpaper"), None, &ids(&[]));
        assert_eq!(id, "0000000001");
    }

    #[test]
    fn test_fills_the_first_hole() {
        let existing = ids(&["0000000001", "0000000003", "0000000004"]);
        assert_eq!(allocate(Path::new("/src/name"), None, &existing), "0000000002");

        let contiguous = ids(&["0000000001", "0000000002", "123456789"]);
        assert_eq!(allocate(Path::new("/src/name"), None, &contiguous), "0000000003");
    }

    #[test]
    fn test_workshop_id_has_precedence() {
        let d = descriptor("12345");
        assert_eq!(allocate(Path::new("/src/not-numeric"), Some(&d), &ids(&[])), "12345");
        assert_eq!(allocate(Path::new("/src/999"), Some(&d), &ids(&[])), "12345");
    }

    #[test]
    fn test_taken_workshop_id_falls_through() {
        let d = descriptor("12345");
        assert_eq!(allocate(Path::new("/src/999"), Some(&d), &ids(&["12345"])), "999");
        assert_eq!(
            allocate(Path::new("/src/999"), Some(&d), &ids(&["12345", "999"])),
            "0000000001"
        );
    }

    #[test]
    fn test_numeric_workshop_id_from_json_number() {
        let d: ProjectDescriptor =
            serde_json::from_value(serde_json::json!({ "workshopid": 777 })).unwrap();
        assert_eq!(allocate(Path::new("/src/x"), Some(&d), &ids(&[])), "777");
    }
}
