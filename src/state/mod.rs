/// State management module
///
/// This module holds everything a session knows about a library:
/// - Catalog document and its persistence (library.rs)
/// - Shared data structures (data.rs)
/// - The virtual folder tree (tree.rs)
/// - The open session and its mutations (session.rs)

pub mod data;
pub mod library;
pub mod session;
pub mod tree;
