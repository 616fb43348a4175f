//! Core data model definitions shared across Spool crates.
#![allow(missing_docs)]

pub mod events;
pub mod ids;

// Intentionally curated re-exports for downstream consumers.
pub use events::{BufferedEvent, EventCategory, EventType, IngestionEvent};
pub use ids::{EntityId, ProjectId};
