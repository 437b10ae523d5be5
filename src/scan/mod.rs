pub mod allocator;
pub mod descriptor;
pub mod health;
pub mod reconcile;
pub mod walk;

pub use health::{HealthEntry, HealthReport};
pub use reconcile::{ScanReport, SkippedFolder};
