//! Domain model types (pure).
//!
//! All types in this module are pure data with smart constructors.

pub mod error;
pub mod geometry;
pub mod identifiers;
pub mod wire;

// Re-export for convenience
pub use error::{AuthError, EngineError, RequestError, SchemaError, ServiceError};
pub use geometry::{DisplayElement, Row, RowLayout, SubRow};
pub use identifiers::{
    BatchId, InvalidIsolationId, InvalidSnapshotId, IsolationId, ItemIndex, RowIndex, SnapshotId,
};
pub use wire::{Item, Marker, RawItem, RawRow, TokenReply};
