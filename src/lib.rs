//! Wallpaper library engine
//!
//! Keeps a folder of wallpaper projects, a user-curated virtual folder tree
//! and a JSON metadata catalog consistent with each other across scans,
//! moves, deletions and imports.

pub mod config;
pub mod error;
pub mod import;
pub mod query;
pub mod scan;
pub mod service;
pub mod state;

pub use config::Settings;
pub use error::{LibraryError, Result};
pub use service::{LibraryService, ScanEvent};
pub use state::session::{MoveSource, Session, SessionOptions};
