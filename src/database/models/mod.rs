pub mod hotspot;

pub use hotspot::{Hotspot, HotspotValidationError, MAX_SUBNET_HOTSPOT_ID};
