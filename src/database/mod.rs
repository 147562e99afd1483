pub mod manager;
pub mod models;
pub mod repository;

pub use manager::{DatabaseError, DatabaseManager};
pub use models::Hotspot;
pub use repository::{HotspotStore, MemoryHotspotStore, PgHotspotStore};
